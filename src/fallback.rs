//! Last-resort synthetic content and the shared fallback-notice slot.
//!
//! Mock records have the same shape as real ones but every one of them
//! carries the notice text, so a fragment shown on its own still reads as
//! synthetic.

use std::sync::Mutex;

use crate::errors::AIError;
use crate::models::{ContentType, Flashcard, GeneratedContent, QuizQuestion, TopicSuggestion};

pub const RETRY_INSTRUCTION: &str = "Please retry.";

/// Notice text for a failure: machine code, cause, and a retry instruction
pub fn fallback_notice(error: &AIError) -> String {
    format!("[{}] {}. Showing sample content. {}", error.code(), error, RETRY_INSTRUCTION)
}

pub fn mock_questions(error: &AIError, count: usize) -> Vec<QuizQuestion> {
    let notice = fallback_notice(error);
    (1..=count)
        .map(|n| QuizQuestion {
            question: format!("Sample question {}: which option is the correct one?", n),
            answer: "Option A".to_string(),
            options: vec![
                "Option A".to_string(),
                "Option B".to_string(),
                "Option C".to_string(),
                "Option D".to_string(),
            ],
            explanation: Some(notice.clone()),
        })
        .collect()
}

pub fn mock_flashcards(error: &AIError, count: usize) -> Vec<Flashcard> {
    let notice = fallback_notice(error);
    (1..=count)
        .map(|n| Flashcard {
            front: format!("Sample card {}", n),
            back: notice.clone(),
        })
        .collect()
}

pub fn mock_suggestions(error: &AIError, count: usize) -> Vec<TopicSuggestion> {
    let notice = fallback_notice(error);
    (1..=count)
        .map(|n| TopicSuggestion {
            title: format!("Sample topic {}", n),
            description: notice.clone(),
            category: "General".to_string(),
            difficulty: "Beginner".to_string(),
            estimated_time: "15 min".to_string(),
            icon: "exclamationmark.triangle".to_string(),
        })
        .collect()
}

/// Banner-prefixed text block for summaries, guides and tutor replies
pub fn mock_text(error: &AIError, content_type: ContentType, source: &str) -> String {
    let banner = fallback_notice(error);
    let body = match content_type {
        ContentType::ChatTurn => {
            "I couldn't reach the tutor just now, so this is a placeholder reply.".to_string()
        }
        ContentType::TopicGuide => {
            let topic = source.trim();
            if topic.is_empty() {
                "Sample study guide. The real guide could not be generated.".to_string()
            } else {
                format!("Sample study guide for \"{}\". The real guide could not be generated.", topic)
            }
        }
        _ => "Sample summary. The real summary could not be generated.".to_string(),
    };
    format!("{}\n\n{}\n\n{}", banner, body, banner)
}

/// Synthetic content of the right shape for `content_type`. Never fails.
pub fn mock_content(content_type: ContentType, error: &AIError, count: usize, source: &str) -> GeneratedContent {
    match content_type {
        ContentType::Summary | ContentType::TopicGuide | ContentType::ChatTurn => {
            GeneratedContent::Text(mock_text(error, content_type, source))
        }
        ContentType::Quiz | ContentType::TopicQuiz => GeneratedContent::Questions(mock_questions(error, count)),
        ContentType::Flashcards | ContentType::TopicFlashcards | ContentType::ChatToFlashcards => {
            GeneratedContent::Flashcards(mock_flashcards(error, count))
        }
        ContentType::TopicSuggestions => GeneratedContent::Suggestions(mock_suggestions(error, count)),
    }
}

/// Process-wide degradation notice with first-write-wins / read-clears semantics
#[derive(Debug, Default)]
pub struct NoticeSlot {
    notice: Mutex<Option<String>>,
}

impl NoticeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `notice` unless one is already pending. Returns whether it was stored.
    pub fn set_if_absent(&self, notice: impl Into<String>) -> bool {
        let mut slot = self.notice.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(notice.into());
        true
    }

    /// Pop the pending notice
    pub fn take(&self) -> Option<String> {
        self.notice
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn clear(&self) {
        self.take();
    }
}

/// Task-confined notice for a single call; the first degradation reason sticks
#[derive(Debug, Default)]
pub struct CallNotice {
    degradation: Option<String>,
}

impl CallNotice {
    pub fn record(&mut self, notice: impl Into<String>) {
        if self.degradation.is_none() {
            self.degradation = Some(notice.into());
        }
    }

    pub fn degradation(&self) -> Option<&str> {
        self.degradation.as_deref()
    }

    /// The single notice to publish at the end of the call
    pub fn finish(self, failure: Option<&AIError>) -> Option<String> {
        match (failure, self.degradation) {
            (Some(error), Some(degradation)) => Some(format!("{} ({})", fallback_notice(error), degradation)),
            (Some(error), None) => Some(fallback_notice(error)),
            (None, degradation) => degradation,
        }
    }
}

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Kind of content a single generation call produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Summary,
    Quiz,
    Flashcards,
    TopicGuide,
    TopicQuiz,
    TopicFlashcards,
    TopicSuggestions,
    ChatTurn,
    ChatToFlashcards,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Summary => "summary",
            ContentType::Quiz => "quiz",
            ContentType::Flashcards => "flashcards",
            ContentType::TopicGuide => "topicGuide",
            ContentType::TopicQuiz => "topicQuiz",
            ContentType::TopicFlashcards => "topicFlashcards",
            ContentType::TopicSuggestions => "topicSuggestions",
            ContentType::ChatTurn => "chatTurn",
            ContentType::ChatToFlashcards => "chatToFlashcards",
        }
    }

    pub fn is_conversation(&self) -> bool {
        matches!(self, ContentType::ChatTurn | ContentType::ChatToFlashcards)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SummaryStyle {
    #[default]
    Paragraph,
    Bullets,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// How the tutor should shape a chat reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseFormat {
    #[default]
    Conversational,
    StepByStep,
    Concise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One turn of a tutor conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// User-supplied knobs for a generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub style: SummaryStyle,
    pub word_count: u32,
    pub difficulty: Difficulty,
    pub count: usize,
    pub response_format: ResponseFormat,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            style: SummaryStyle::Paragraph,
            word_count: 200,
            difficulty: Difficulty::Intermediate,
            count: 5,
            response_format: ResponseFormat::Conversational,
        }
    }
}

/// Immutable description of one call into the generation pipeline
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub content_type: ContentType,
    pub source: String,
    pub conversation: Vec<ChatMessage>,
    pub options: GenerationOptions,
    pub cancellation: Option<CancellationToken>,
}

impl GenerationRequest {
    pub fn new(content_type: ContentType, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type,
            source: source.into(),
            conversation: Vec::new(),
            options: GenerationOptions::default(),
            cancellation: None,
        }
    }

    pub fn summary(text: impl Into<String>, style: SummaryStyle, word_count: u32) -> Self {
        Self::new(ContentType::Summary, text)
            .with_style(style)
            .with_word_count(word_count)
    }

    pub fn quiz(text: impl Into<String>, count: usize, difficulty: Difficulty) -> Self {
        Self::new(ContentType::Quiz, text)
            .with_count(count)
            .with_difficulty(difficulty)
    }

    pub fn flashcards(text: impl Into<String>, count: usize) -> Self {
        Self::new(ContentType::Flashcards, text).with_count(count)
    }

    pub fn topic_guide(topic: impl Into<String>, difficulty: Difficulty) -> Self {
        Self::new(ContentType::TopicGuide, topic).with_difficulty(difficulty)
    }

    pub fn topic_quiz(topic: impl Into<String>, count: usize, difficulty: Difficulty) -> Self {
        Self::new(ContentType::TopicQuiz, topic)
            .with_count(count)
            .with_difficulty(difficulty)
    }

    pub fn topic_flashcards(topic: impl Into<String>, count: usize, difficulty: Difficulty) -> Self {
        Self::new(ContentType::TopicFlashcards, topic)
            .with_count(count)
            .with_difficulty(difficulty)
    }

    /// `interests` may be empty, in which case suggestions are general
    pub fn topic_suggestions(interests: impl Into<String>, count: usize) -> Self {
        Self::new(ContentType::TopicSuggestions, interests).with_count(count)
    }

    pub fn chat_turn(
        context: impl Into<String>,
        conversation: Vec<ChatMessage>,
        format: ResponseFormat,
    ) -> Self {
        let mut request = Self::new(ContentType::ChatTurn, context).with_response_format(format);
        request.conversation = conversation;
        request
    }

    pub fn chat_to_flashcards(conversation: Vec<ChatMessage>, count: usize) -> Self {
        let mut request = Self::new(ContentType::ChatToFlashcards, "").with_count(count);
        request.conversation = conversation;
        request
    }

    pub fn with_style(mut self, style: SummaryStyle) -> Self {
        self.options.style = style;
        self
    }

    pub fn with_word_count(mut self, word_count: u32) -> Self {
        self.options.word_count = word_count;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.options.difficulty = difficulty;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.options.count = count;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.options.response_format = format;
        self
    }

    /// Cancelling the token skips a pending pacing delay; it never aborts the call
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Latest user turn, sent alone to a local session
    pub fn latest_user_message(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub answer: String,
    pub options: Vec<String>, // exactly four after repair
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSuggestion {
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: String,
    pub estimated_time: String,
    pub icon: String,
}

/// Typed output of a generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum GeneratedContent {
    Text(String),
    Questions(Vec<QuizQuestion>),
    Flashcards(Vec<Flashcard>),
    Suggestions(Vec<TopicSuggestion>),
}

impl GeneratedContent {
    pub fn len(&self) -> usize {
        match self {
            GeneratedContent::Text(_) => 1,
            GeneratedContent::Questions(items) => items.len(),
            GeneratedContent::Flashcards(items) => items.len(),
            GeneratedContent::Suggestions(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            GeneratedContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_questions(self) -> Option<Vec<QuizQuestion>> {
        match self {
            GeneratedContent::Questions(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_flashcards(self) -> Option<Vec<Flashcard>> {
        match self {
            GeneratedContent::Flashcards(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_suggestions(self) -> Option<Vec<TopicSuggestion>> {
        match self {
            GeneratedContent::Suggestions(items) => Some(items),
            _ => None,
        }
    }
}

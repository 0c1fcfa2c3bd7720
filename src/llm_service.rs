use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::{Config, LLMConfig, SettingsStore, StaticSettings};
use crate::errors::{AIError, GenerationError};
use crate::fallback::{mock_content, CallNotice, NoticeSlot};
use crate::llm_providers::{
    HostedProvider, LocalModelProvider, OllamaLocalModel, PacingPolicy, RequestExecutor,
    UnavailableLocalModel,
};
use crate::models::{
    ChatMessage, ContentType, Difficulty, Flashcard, GeneratedContent, GenerationRequest,
    QuizQuestion, ResponseFormat, SummaryStyle, TopicSuggestion,
};
use crate::prompts::{build_prompt, Prompt};
use crate::provider_selector::{select_provider, ProviderKind};
use crate::record_repair::{repair_text, to_flashcard, to_quiz_question, to_topic_suggestion};
use crate::tagged_parser::{parse, FLASHCARD_SCHEMA, QUIZ_SCHEMA, SUGGESTION_SCHEMA};
use crate::{
    log_pipeline_fault, log_service_start, log_service_success, log_service_warn, log_system_event,
};

const SERVICE: &str = "generation_service";

/// Pipeline stages that can fault. `Idle` and `Done` carry no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Selecting,
    Executing,
    Parsing,
    Repairing,
}

/// A failed pass: where it stopped and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub stage: Stage,
    pub error: AIError,
}

impl Fault {
    fn new(stage: Stage, error: AIError) -> Self {
        Self { stage, error }
    }
}

/// Public façade: one operation per content type.
///
/// Provider and parsing failures never escape; they become synthetic content
/// plus a fallback notice readable once via [`GenerationService::pop_fallback_notice`].
/// A missing hosted credential is the only error returned.
#[derive(Clone)]
pub struct GenerationService {
    settings: Arc<dyn SettingsStore>,
    executor: RequestExecutor,
    notice: Arc<NoticeSlot>,
    rng_seed: Option<u64>,
}

impl GenerationService {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        local: Arc<dyn LocalModelProvider>,
        config: &LLMConfig,
    ) -> Self {
        let hosted = HostedProvider::new(config);
        let pacing = PacingPolicy::new(config.pacing_min_ms, config.pacing_max_ms);
        let executor = RequestExecutor::new(settings.clone(), hosted, local, pacing);

        Self {
            settings,
            executor,
            notice: Arc::new(NoticeSlot::new()),
            rng_seed: config.rng_seed,
        }
    }

    /// Wire the service from environment configuration
    pub fn from_config(config: &Config) -> Self {
        let settings = Arc::new(StaticSettings::from_config(config));
        let local: Arc<dyn LocalModelProvider> = match config.local_model.url {
            Some(_) => Arc::new(OllamaLocalModel::new(&config.local_model)),
            None => Arc::new(UnavailableLocalModel),
        };
        log_system_event!(
            startup,
            component = SERVICE,
            format!("generation service ready (local backend: {})", local.provider_name())
        );
        Self::new(settings, local, &config.llm)
    }

    /// Read and clear the pending degradation notice
    pub fn pop_fallback_notice(&self) -> Option<String> {
        self.notice.take()
    }

    pub fn clear_fallback_notice(&self) {
        self.notice.clear();
    }

    /// Run one request through the pipeline
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError> {
        let operation = request.content_type.as_str();
        log_service_start!(SERVICE, operation, request_id = request.id);
        let started = Instant::now();

        let mut call_notice = CallNotice::default();
        let (content, failure) = match self.run_pipeline(request, &mut call_notice).await {
            Ok(content) => (content, None),
            Err(fault) => {
                if let Some(terminal) = fault.error.terminal() {
                    log_service_warn!(SERVICE, operation, request_id = request.id, terminal);
                    return Err(terminal);
                }

                log_pipeline_fault!(operation, request_id = request.id, stage = fault.stage, error = fault.error);
                let content = mock_content(
                    request.content_type,
                    &fault.error,
                    request.options.count,
                    &request.source,
                );
                (content, Some(fault.error))
            }
        };

        if let Some(notice) = call_notice.finish(failure.as_ref()) {
            if !self.notice.set_if_absent(notice) {
                debug!(request_id = %request.id, "Fallback notice already pending, keeping the earlier one");
            }
        }

        log_service_success!(
            SERVICE,
            operation,
            request_id = request.id,
            count = content.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(content)
    }

    async fn run_pipeline(
        &self,
        request: &GenerationRequest,
        notice: &mut CallNotice,
    ) -> Result<GeneratedContent, Fault> {
        // Selecting
        if request.content_type.is_conversation() && request.latest_user_message().is_none() {
            return Err(Fault::new(
                Stage::Selecting,
                AIError::ApiError("conversation has no user message".to_string()),
            ));
        }

        let local_available =
            self.settings.is_local_model_available() && self.executor.local_model().is_available();
        let choice = select_provider(self.settings.preference(), local_available);
        if let Some(degradation) = &choice.fallback_notice {
            notice.record(degradation.clone());
        }

        // Executing
        let prompt = build_prompt(request);
        let raw = self
            .execute(request, &prompt, choice.provider, notice)
            .await
            .map_err(|e| Fault::new(Stage::Executing, e))?;

        debug!(request_id = %request.id, response = %raw, "Raw model output");

        // Parsing and Repairing
        self.interpret(request, &raw)
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        prompt: &Prompt,
        provider: ProviderKind,
        notice: &mut CallNotice,
    ) -> Result<String, AIError> {
        if provider == ProviderKind::Local {
            match self.dispatch(request, prompt, ProviderKind::Local).await {
                Ok(raw) => return Ok(raw),
                Err(e) => {
                    log_service_warn!(
                        SERVICE,
                        request.content_type.as_str(),
                        request_id = request.id,
                        format!("local model failed, retrying on hosted model: {}", e)
                    );
                    notice.record(format!(
                        "On-device model failed ({}); used the hosted model instead.",
                        e
                    ));
                }
            }
        }

        self.dispatch(request, prompt, ProviderKind::Hosted).await
    }

    async fn dispatch(
        &self,
        request: &GenerationRequest,
        prompt: &Prompt,
        provider: ProviderKind,
    ) -> Result<String, AIError> {
        let cancel = request.cancellation.as_ref();
        match request.content_type {
            ContentType::ChatTurn => {
                self.executor
                    .execute_conversation(provider, &prompt.system, &request.conversation, cancel)
                    .await
            }
            _ => {
                self.executor
                    .execute(provider, &prompt.system, &prompt.user, cancel)
                    .await
            }
        }
    }

    fn interpret(&self, request: &GenerationRequest, raw: &str) -> Result<GeneratedContent, Fault> {
        let cap = match request.options.count {
            0 => usize::MAX,
            count => count,
        };

        match request.content_type {
            ContentType::Summary | ContentType::TopicGuide | ContentType::ChatTurn => repair_text(raw)
                .map(GeneratedContent::Text)
                .ok_or(Fault::new(Stage::Repairing, AIError::ParsingFailed)),

            ContentType::Quiz | ContentType::TopicQuiz => {
                let records = parse(raw, &QUIZ_SCHEMA).map_err(|e| Fault::new(Stage::Parsing, e))?;
                let mut rng = self.rng();
                let questions: Vec<QuizQuestion> = records
                    .iter()
                    .filter_map(|record| to_quiz_question(record, &mut rng))
                    .take(cap)
                    .collect();
                non_empty(questions).map(GeneratedContent::Questions)
            }

            ContentType::Flashcards | ContentType::TopicFlashcards | ContentType::ChatToFlashcards => {
                let records = parse(raw, &FLASHCARD_SCHEMA).map_err(|e| Fault::new(Stage::Parsing, e))?;
                let cards: Vec<Flashcard> = records.iter().filter_map(to_flashcard).take(cap).collect();
                non_empty(cards).map(GeneratedContent::Flashcards)
            }

            ContentType::TopicSuggestions => {
                let records = parse(raw, &SUGGESTION_SCHEMA).map_err(|e| Fault::new(Stage::Parsing, e))?;
                let suggestions: Vec<TopicSuggestion> =
                    records.iter().filter_map(to_topic_suggestion).take(cap).collect();
                non_empty(suggestions).map(GeneratedContent::Suggestions)
            }
        }
    }

    /// Per-call RNG for option shuffling; seeded when configured
    fn rng(&self) -> StdRng {
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    // ------------------------------------------------------------------------
    // Typed operations
    // ------------------------------------------------------------------------

    pub async fn generate_summary(
        &self,
        text: &str,
        style: SummaryStyle,
        word_count: u32,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest::summary(text, style, word_count);
        Ok(self.generate(&request).await?.into_text().unwrap_or_default())
    }

    pub async fn generate_quiz_questions(
        &self,
        text: &str,
        count: usize,
        difficulty: Difficulty,
    ) -> Result<Vec<QuizQuestion>, GenerationError> {
        let request = GenerationRequest::quiz(text, count, difficulty);
        Ok(self.generate(&request).await?.into_questions().unwrap_or_default())
    }

    pub async fn generate_flashcards(&self, text: &str, count: usize) -> Result<Vec<Flashcard>, GenerationError> {
        let request = GenerationRequest::flashcards(text, count);
        Ok(self.generate(&request).await?.into_flashcards().unwrap_or_default())
    }

    pub async fn generate_topic_guide(
        &self,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest::topic_guide(topic, difficulty);
        Ok(self.generate(&request).await?.into_text().unwrap_or_default())
    }

    pub async fn generate_topic_questions(
        &self,
        topic: &str,
        count: usize,
        difficulty: Difficulty,
    ) -> Result<Vec<QuizQuestion>, GenerationError> {
        let request = GenerationRequest::topic_quiz(topic, count, difficulty);
        Ok(self.generate(&request).await?.into_questions().unwrap_or_default())
    }

    pub async fn generate_topic_flashcards(
        &self,
        topic: &str,
        count: usize,
        difficulty: Difficulty,
    ) -> Result<Vec<Flashcard>, GenerationError> {
        let request = GenerationRequest::topic_flashcards(topic, count, difficulty);
        Ok(self.generate(&request).await?.into_flashcards().unwrap_or_default())
    }

    pub async fn generate_topic_suggestions(
        &self,
        interests: &str,
        count: usize,
    ) -> Result<Vec<TopicSuggestion>, GenerationError> {
        let request = GenerationRequest::topic_suggestions(interests, count);
        Ok(self.generate(&request).await?.into_suggestions().unwrap_or_default())
    }

    /// One tutor reply for the conversation so far
    pub async fn chat_turn(
        &self,
        context: &str,
        conversation: &[ChatMessage],
        format: ResponseFormat,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest::chat_turn(context, conversation.to_vec(), format);
        Ok(self.generate(&request).await?.into_text().unwrap_or_default())
    }

    pub async fn chat_to_flashcards(
        &self,
        conversation: &[ChatMessage],
        count: usize,
    ) -> Result<Vec<Flashcard>, GenerationError> {
        let request = GenerationRequest::chat_to_flashcards(conversation.to_vec(), count);
        Ok(self.generate(&request).await?.into_flashcards().unwrap_or_default())
    }
}

fn non_empty<T>(items: Vec<T>) -> Result<Vec<T>, Fault> {
    if items.is_empty() {
        Err(Fault::new(Stage::Repairing, AIError::ParsingFailed))
    } else {
        Ok(items)
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::error::NutritionError;
use crate::extraction::parse_extraction_response;
use crate::models::{
    AnalysisResult, ChatHistory, ChatResult, ChatTurn, FoodEntry, FoodLogSnapshot, ImageUpload,
    ValidatedImage, validate_chat_message, validate_image,
};
use crate::store::{ChatHistoryStore, FoodLogStore, InMemoryChatHistory, InMemoryFoodLog};

pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Image → free-text nutrition analysis.
///
/// The server implements this with the Gemini REST API; tests use canned text.
#[async_trait]
pub trait NutritionExtractor: Send + Sync {
    async fn analyze_image(&self, image: &ValidatedImage) -> Result<String>;
}

/// Chat message plus the current food log → reply.
#[async_trait]
pub trait ConversationAgent: Send + Sync {
    async fn reply(&self, message: &str, food_log: &[FoodEntry]) -> Result<String>;
}

pub struct NutritionService {
    food_log: Arc<dyn FoodLogStore>,
    chat_history: Arc<dyn ChatHistoryStore>,
    extractor: Arc<dyn NutritionExtractor>,
    agent: Arc<dyn ConversationAgent>,
    timeout: Duration,
}

impl NutritionService {
    /// Service with empty in-memory stores.
    pub fn new(extractor: Arc<dyn NutritionExtractor>, agent: Arc<dyn ConversationAgent>) -> Self {
        Self {
            food_log: Arc::new(InMemoryFoodLog::new()),
            chat_history: Arc::new(InMemoryChatHistory::new()),
            extractor,
            agent,
            timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_stores(
        mut self,
        food_log: Arc<dyn FoodLogStore>,
        chat_history: Arc<dyn ChatHistoryStore>,
    ) -> Self {
        self.food_log = food_log;
        self.chat_history = chat_history;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // --- Operations ---

    /// Validate the upload, ask the extractor about it, and log every item it names.
    ///
    /// An analysis that names no items is a success with nothing logged.
    pub async fn analyze_image(
        &self,
        upload: ImageUpload,
    ) -> Result<AnalysisResult, NutritionError> {
        let file_name = upload.file_name.clone().unwrap_or_default();
        let image = tokio::task::spawn_blocking(move || validate_image(upload))
            .await
            .unwrap_or_else(|e| {
                Err(NutritionError::validation(format!(
                    "Image could not be decoded: {e}"
                )))
            })
            .inspect_err(|e| {
                warn!(file = %file_name, "rejected upload: {e}");
            })?;
        info!(
            file = %file_name,
            mime = image.mime_type,
            width = image.width,
            height = image.height,
            "analyzing image"
        );

        let analysis = self
            .call("nutrition extractor", self.extractor.analyze_image(&image))
            .await?;
        if analysis.trim().is_empty() {
            error!("empty analysis from nutrition extractor");
            return Err(NutritionError::collaborator(
                "No response from the model. Please try again.",
            ));
        }

        let now = Local::now().naive_local();
        let food_items: Vec<FoodEntry> = parse_extraction_response(&analysis)
            .into_iter()
            .map(|item| FoodEntry::new(item, now))
            .collect();
        if food_items.is_empty() {
            info!("no food items recognized in analysis");
        }
        self.food_log.extend(food_items.clone());

        let FoodLogSnapshot { food_log, summary } = self.food_log.snapshot();
        info!(
            added = food_items.len(),
            total = food_log.len(),
            "food analysis logged"
        );
        Ok(AnalysisResult {
            analysis,
            food_items,
            food_log,
            summary,
        })
    }

    /// Ask the agent, grounding it in the current food log, and record the turn.
    pub async fn chat(&self, message: &str) -> Result<ChatResult, NutritionError> {
        validate_chat_message(message).inspect_err(|_| warn!("empty chat message received"))?;

        let food_log = self.food_log.all();
        debug!(
            message = %message.chars().take(100).collect::<String>(),
            log_entries = food_log.len(),
            "sending chat message"
        );
        let reply = self
            .call("conversation agent", self.agent.reply(message, &food_log))
            .await?;
        if reply.trim().is_empty() {
            error!("empty reply from conversation agent");
            return Err(NutritionError::collaborator("No response from the model."));
        }

        self.chat_history.append(ChatTurn {
            user_message: message.to_string(),
            bot_reply: reply.clone(),
        });
        info!("chat response recorded");
        Ok(ChatResult { response: reply })
    }

    #[must_use]
    pub fn food_log(&self) -> FoodLogSnapshot {
        self.food_log.snapshot()
    }

    #[must_use]
    pub fn chat_history(&self) -> ChatHistory {
        ChatHistory {
            chat_history: self.chat_history.all(),
        }
    }

    /// Await a collaborator call under the timeout. No retries.
    async fn call<F>(&self, what: &str, fut: F) -> Result<String, NutritionError>
    where
        F: Future<Output = Result<String>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                error!("{what} failed: {e:#}");
                Err(NutritionError::collaborator(format!("{what} failed: {e:#}")))
            }
            Err(_) => {
                error!("{what} timed out after {:?}", self.timeout);
                Err(NutritionError::Timeout(self.timeout))
            }
        }
    }
}

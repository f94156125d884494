use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use nutrisnap_core::gemini::{
    ANALYSIS_PROMPT, GenerateContentRequest, GenerateContentResponse, chat_prompt,
};
use nutrisnap_core::models::{FoodEntry, ValidatedImage};
use nutrisnap_core::service::{ConversationAgent, NutritionExtractor};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini `generateContent` client; serves as both the extractor and the chat agent.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("nutrisnap/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<String> {
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to reach Gemini API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, "Gemini API error: {body}");
            bail!("Gemini API returned {status}: {}", summarize_error_body(&body));
        }

        let data: GenerateContentResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        if let Some(text) = data.response_text() {
            return Ok(text);
        }
        match data.block_reason() {
            Some(reason) => bail!("Gemini blocked the request ({reason})"),
            None => bail!("No response from Gemini API"),
        }
    }
}

/// Gemini error bodies are JSON with `error.message`; fall back to the raw text.
fn summarize_error_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl NutritionExtractor for GeminiClient {
    async fn analyze_image(&self, image: &ValidatedImage) -> Result<String> {
        self.generate(&GenerateContentRequest::with_image(ANALYSIS_PROMPT, image))
            .await
    }
}

#[async_trait]
impl ConversationAgent for GeminiClient {
    async fn reply(&self, message: &str, food_log: &[FoodEntry]) -> Result<String> {
        self.generate(&GenerateContentRequest::text(chat_prompt(message, food_log)))
            .await
    }
}

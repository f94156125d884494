use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use nutrisnap_core::models::{AnalysisResult, ChatHistory, ChatResult, FoodLogSnapshot};

/// HTTP client for a running `nutrisnap serve`.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("nutrisnap-cli/{}", env!("CARGO_PKG_VERSION")))
            // Analysis waits on the model, so allow more than the server's own timeout.
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn analyze(&self, image: &Path) -> Result<AnalysisResult> {
        let bytes = std::fs::read(image)
            .with_context(|| format!("Failed to read image: {}", image.display()))?;
        let file_name = image
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

        let mut part = Part::bytes(bytes).file_name(file_name);
        if let Some(mime) = mime_for_path(image) {
            part = part.mime_str(mime)?;
        }

        let resp = self
            .client
            .post(self.url("/analyze-food"))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;
        decode(resp).await
    }

    pub async fn chat(&self, message: &str) -> Result<ChatResult> {
        let resp = self
            .client
            .post(self.url("/chat"))
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;
        decode(resp).await
    }

    pub async fn food_log(&self) -> Result<FoodLogSnapshot> {
        self.get("/food-log").await
    }

    pub async fn chat_history(&self) -> Result<ChatHistory> {
        self.get("/chat-history").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{status}: {}", error_detail(&body));
    }
    resp.json().await.context("Failed to parse server response")
}

/// The server reports errors as `{"detail": "..."}`.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["detail"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

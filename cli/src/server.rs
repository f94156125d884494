use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::gemini::GeminiClient;
use nutrisnap_core::error::NutritionError;
use nutrisnap_core::models::{
    AnalysisResult, ChatHistory, ChatResult, FoodLogSnapshot, ImageUpload, MAX_IMAGE_BYTES,
};
use nutrisnap_core::service::NutritionService;

// Room for the multipart framing around a maximum-size image.
const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

const GEMINI_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct AppState {
    service: Arc<NutritionService>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    BadGateway(String),
    GatewayTimeout(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<NutritionError> for ApiError {
    fn from(err: NutritionError) -> Self {
        match err {
            NutritionError::Validation(msg) => Self::BadRequest(msg),
            NutritionError::Collaborator(msg) => Self::BadGateway(msg),
            NutritionError::Timeout(_) => Self::GatewayTimeout(err.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge("Image size exceeds 5MB limit.".to_string())
        } else {
            Self::BadRequest(format!("Invalid upload: {}", err.body_text()))
        }
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    response
}

fn cors_layer(allowed_origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true)
}

// --- Handlers ---

async fn analyze_food(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("analyze-food without a multipart body: {e}");
        ApiError::BadRequest(e.body_text())
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some(ImageUpload {
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        });
    }

    let upload = upload.ok_or_else(|| {
        warn!("analyze-food request without a file field");
        ApiError::BadRequest("Missing image upload in form field 'file'.".to_string())
    })?;

    let result = state.service.analyze_image(upload).await?;
    Ok(Json(result))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResult>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let result = state.service.chat(&req.message).await?;
    Ok(Json(result))
}

async fn get_food_log(State(state): State<AppState>) -> Json<FoodLogSnapshot> {
    let snapshot = state.service.food_log();
    info!(entries = snapshot.food_log.len(), "food log retrieved");
    Json(snapshot)
}

async fn get_chat_history(State(state): State<AppState>) -> Json<ChatHistory> {
    let history = state.service.chat_history();
    info!(turns = history.chat_history.len(), "chat history retrieved");
    Json(history)
}

// --- Router builder ---

fn build_router(state: AppState, allowed_origins: Vec<HeaderValue>) -> Router {
    Router::new()
        .route("/analyze-food", post(analyze_food))
        .route("/chat", post(chat))
        .route("/food-log", get(get_food_log))
        .route("/chat-history", get(get_chat_history))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

fn build_service(config: &Config) -> anyhow::Result<NutritionService> {
    // The service timeout must fire before reqwest's so a slow model maps to 504.
    let http_timeout = config.timeout + GEMINI_TIMEOUT_MARGIN;
    let gemini = Arc::new(GeminiClient::new(
        &config.gemini_url,
        &config.model,
        &config.api_key,
        http_timeout,
    )?);
    Ok(NutritionService::new(gemini.clone(), gemini).with_timeout(config.timeout))
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(build_service(&config)?),
    };
    let app = build_router(state, config.allowed_origins.clone());

    if config.bind != "127.0.0.1" && config.bind != "localhost" {
        warn!(
            "Listening on {} with no authentication. Any device on your network can use this API and your Gemini quota.",
            config.bind
        );
    }

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(model = %config.model, "Listening on http://{addr}");

    axum::serve(listener, app).await.inspect_err(|e| {
        error!("server error: {e}");
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use nutrisnap_core::models::{FoodEntry, ValidatedImage};
    use nutrisnap_core::service::{ConversationAgent, NutritionExtractor};
    use tower::ServiceExt;

    const BOUNDARY: &str = "nutrisnap-test-boundary";
    const ORIGIN: &str = "http://localhost:5173";

    const TWO_ITEMS: &str = "\
1. Items:
   - Item: Apple - Calories: 95 kcal, Carbs: 25 g, Proteins: 0.5 g, Fats: 0.3 g
   - Item: Banana - Calories: 105 kcal, Carbs: 27 g, Proteins: 1.3 g, Fats: 0.4 g
2. Total: 200 kcal
3. A light, fruit-heavy snack.";

    struct StubModel {
        analysis: Result<String, String>,
        reply: Result<String, String>,
        delay: Duration,
    }

    impl StubModel {
        fn new(analysis: &str, reply: &str) -> Self {
            Self {
                analysis: Ok(analysis.to_string()),
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
            }
        }

        fn down() -> Self {
            Self {
                analysis: Err("model unreachable".to_string()),
                reply: Err("model unreachable".to_string()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl NutritionExtractor for StubModel {
        async fn analyze_image(&self, _image: &ValidatedImage) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            self.analysis.clone().map_err(anyhow::Error::msg)
        }
    }

    #[async_trait]
    impl ConversationAgent for StubModel {
        async fn reply(&self, _message: &str, _food_log: &[FoodEntry]) -> Result<String> {
            self.reply.clone().map_err(anyhow::Error::msg)
        }
    }

    fn test_app_with(model: StubModel, timeout: Duration) -> Router {
        let model = Arc::new(model);
        let service = NutritionService::new(model.clone(), model).with_timeout(timeout);
        let state = AppState {
            service: Arc::new(service),
        };
        build_router(state, vec![HeaderValue::from_static(ORIGIN)])
    }

    fn test_app(model: StubModel) -> Router {
        test_app_with(model, Duration::from_secs(5))
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_request(field: &str, content_type: &str, data: &[u8]) -> Request {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"meal.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        axum::http::Request::post("/analyze-food")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn chat_request(body: &str) -> Request {
        axum::http::Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(path: &str) -> Request {
        axum::http::Request::get(path).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn analyze_food_logs_items_and_returns_summary() {
        let app = test_app(StubModel::new(TWO_ITEMS, "ok"));

        let (status, json) = send(&app, multipart_request("file", "image/png", &png_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["analysis"], TWO_ITEMS);
        assert_eq!(json["food_items"].as_array().unwrap().len(), 2);
        assert_eq!(json["food_log"].as_array().unwrap().len(), 2);
        assert_eq!(json["food_log"][0]["name"], "Apple");
        assert_eq!(json["food_log"][1]["name"], "Banana");
        assert!(json["food_log"][0]["timestamp"].is_string());
        let total = json["summary"]["total_calories"].as_f64().unwrap();
        assert!((total - 200.0).abs() < 1e-9);

        let (status, json) = send(&app, get_request("/food-log")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["food_log"].as_array().unwrap().len(), 2);
        let carbs = json["summary"]["total_carbs"].as_f64().unwrap();
        assert!((carbs - 52.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn analyze_food_with_no_recognized_items_succeeds() {
        let text = "I could not find any food in this photo.";
        let app = test_app(StubModel::new(text, "ok"));

        let (status, json) = send(&app, multipart_request("file", "image/png", &png_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["analysis"], text);
        assert!(json["food_log"].as_array().unwrap().is_empty());
        assert_eq!(json["summary"]["total_calories"], 0.0);
    }

    #[tokio::test]
    async fn analyze_food_rejects_undecodable_image() {
        let app = test_app(StubModel::new(TWO_ITEMS, "ok"));

        let (status, json) = send(
            &app,
            multipart_request("file", "image/jpeg", b"not really a jpeg"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].is_string());

        let (_, json) = send(&app, get_request("/food-log")).await;
        assert!(json["food_log"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyze_food_rejects_non_image_content_type() {
        let app = test_app(StubModel::new(TWO_ITEMS, "ok"));

        let (status, json) =
            send(&app, multipart_request("file", "application/pdf", &png_bytes())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["detail"]
                .as_str()
                .unwrap()
                .contains("Invalid file type")
        );
    }

    #[tokio::test]
    async fn analyze_food_requires_file_field() {
        let app = test_app(StubModel::new(TWO_ITEMS, "ok"));

        let (status, json) = send(&app, multipart_request("photo", "image/png", &png_bytes())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("'file'"));
    }

    #[tokio::test]
    async fn analyze_food_rejects_non_multipart_body() {
        let app = test_app(StubModel::new(TWO_ITEMS, "ok"));

        let request = axum::http::Request::post("/analyze-food")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn analyze_food_model_failure_returns_502() {
        let app = test_app(StubModel::down());

        let (status, json) = send(&app, multipart_request("file", "image/png", &png_bytes())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(
            json["detail"]
                .as_str()
                .unwrap()
                .contains("model unreachable")
        );

        let (_, json) = send(&app, get_request("/food-log")).await;
        assert!(json["food_log"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyze_food_timeout_returns_504() {
        let mut model = StubModel::new(TWO_ITEMS, "ok");
        model.delay = Duration::from_millis(200);
        let app = test_app_with(model, Duration::from_millis(10));

        let (status, _) = send(&app, multipart_request("file", "image/png", &png_bytes())).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn slow_gemini_maps_to_gateway_timeout() {
        // Stand-in Gemini endpoint that answers only after the service gave up.
        let slow = Router::new().route(
            "/models/{model}",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(serde_json::json!({
                    "candidates": [{"content": {"parts": [{"text": "late"}]}}]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, slow).await });

        let config = Config {
            port: 0,
            bind: "127.0.0.1".to_string(),
            api_key: "test-key".to_string(),
            model: "gemini-test".to_string(),
            gemini_url: format!("http://{addr}"),
            allowed_origins: vec![HeaderValue::from_static(ORIGIN)],
            timeout: Duration::from_millis(100),
        };
        let state = AppState {
            service: Arc::new(build_service(&config).unwrap()),
        };
        let app = build_router(state, config.allowed_origins.clone());

        let (status, json) = send(&app, chat_request(r#"{"message": "hello"}"#)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(json["detail"].as_str().unwrap().contains("did not respond"));
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(StubModel::new(TWO_ITEMS, "ok"));

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/analyze-food")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .header("content-length", big_body.len())
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn chat_returns_reply_and_records_history() {
        let app = test_app(StubModel::new(TWO_ITEMS, "Try adding some protein."));

        let (status, json) = send(&app, chat_request(r#"{"message": "What should I eat?"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"response": "Try adding some protein."}));

        let (status, json) = send(&app, get_request("/chat-history")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({"chat_history": [
                {"user": "What should I eat?", "bot": "Try adding some protein."}
            ]})
        );
    }

    #[tokio::test]
    async fn chat_rejects_blank_message() {
        let app = test_app(StubModel::new(TWO_ITEMS, "reply"));

        let (status, json) = send(&app, chat_request(r#"{"message": "   "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Message cannot be empty");

        let (_, json) = send(&app, get_request("/chat-history")).await;
        assert!(json["chat_history"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_rejects_malformed_json() {
        let app = test_app(StubModel::new(TWO_ITEMS, "reply"));

        let (status, json) = send(&app, chat_request(r#"{"msg": "hi"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn chat_model_failure_returns_502_and_records_nothing() {
        let app = test_app(StubModel::down());

        let (status, _) = send(&app, chat_request(r#"{"message": "hello"}"#)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, json) = send(&app, get_request("/chat-history")).await;
        assert!(json["chat_history"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_food_log_is_empty_and_reads_are_stable() {
        let app = test_app(StubModel::new(TWO_ITEMS, "reply"));

        let (status, first) = send(&app, get_request("/food-log")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            first,
            serde_json::json!({
                "food_log": [],
                "summary": {
                    "total_calories": 0.0,
                    "total_carbs": 0.0,
                    "total_proteins": 0.0,
                    "total_fats": 0.0
                }
            })
        );
        let (_, second) = send(&app, get_request("/food-log")).await;
        assert_eq!(first, second);

        let (status, history) = send(&app, get_request("/chat-history")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history, serde_json::json!({"chat_history": []}));
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(StubModel::new(TWO_ITEMS, "reply"));

        let response = app.oneshot(get_request("/food-log")).await.unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = test_app(StubModel::new(TWO_ITEMS, "reply"));

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::options("/chat")
                    .header("origin", ORIGIN)
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            ORIGIN
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .unwrap(),
            "true"
        );

        let response = app
            .oneshot(
                axum::http::Request::get("/food-log")
                    .header("origin", "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(
            response
                .headers()
                .get("access-control-allow-origin")
                .is_none()
        );
    }
}

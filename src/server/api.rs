use crate::agent::{ ChatAgent, Delivery, FrameStream, GenerationTicket };
use crate::models::chat::{ ChatRequest, ConversationHistoryEntry };
use super::error::RelayError;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::Bytes,
    extract::{ DefaultBodyLimit, State },
    http::{ header, HeaderMap, Method, StatusCode },
    response::{ sse::{ Event, Sse }, IntoResponse, Response },
    routing::{ get, post, MethodRouter },
    Json,
    Router,
};
use futures::StreamExt;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use serde::Deserialize;
use serde_json::{ json, Value };
use tower_http::cors::{ Any, CorsLayer };
use tower_http::services::ServeDir;
use log::{ debug, error, info, warn };

pub const MAX_BODY_BYTES: usize = 64 * 1024;
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const SERVICE_NAME: &str = "OptiServe AI Chatbot";

pub type ChatRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct AppState {
    agent: Option<Arc<ChatAgent>>,
    limiter: Option<Arc<ChatRateLimiter>>,
}

impl AppState {
    /// `agent` is `None` when no provider could be configured; chat requests
    /// are then answered with a configuration error.
    pub fn new(agent: Option<Arc<ChatAgent>>) -> Self {
        Self { agent, limiter: None }
    }

    /// Global chat request quota. Zero disables limiting.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second).map(|quota|
            Arc::new(RateLimiter::direct(Quota::per_second(quota)))
        );
        self
    }
}

#[derive(Deserialize)]
struct RawChatRequest {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default, rename = "conversationHistory")]
    conversation_history: Option<Vec<ConversationHistoryEntry>>,
}

pub fn router(state: AppState, static_dir: Option<&str>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(PREFLIGHT_MAX_AGE);

    let chat: MethodRouter<AppState> = post(chat_handler).fallback(method_not_allowed);

    let app = Router::new()
        .route("/chat", chat.clone())
        .route("/api/chat", chat)
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state);

    match static_dir {
        Some(dir) => {
            info!("Serving static front-end files from '{}'", dir);
            app.fallback_service(ServeDir::new(dir))
        }
        None => app,
    }
}

fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, RelayError> {
    let raw: RawChatRequest = serde_json::from_slice(body).map_err(|e| {
        debug!("Rejecting chat body: {}", e);
        RelayError::InvalidBody
    })?;

    let message = match raw.message {
        Some(Value::String(message)) if !message.trim().is_empty() => message,
        _ => {
            return Err(RelayError::MissingMessage);
        }
    };

    Ok(ChatRequest::new(message, raw.conversation_history.unwrap_or_default()))
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match relay_chat(&state, &headers, &body).await {
        Ok(response) => response,
        Err(e) => {
            debug!("Chat request failed: {}", e);
            e.into_response()
        }
    }
}

async fn relay_chat(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, RelayError> {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Chat request rate limit exceeded. Rejecting request.");
            return Err(RelayError::RateLimited);
        }
    }

    let agent = state.agent.as_ref().ok_or_else(|| {
        error!("Chat request received but no chat provider is configured (is the API key set?)");
        RelayError::Configuration
    })?;

    let request = parse_chat_request(body)?;
    let delivery = Delivery::from_accept(
        headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())
    );
    let exchange = agent.prepare(request);
    let ticket = GenerationTicket::issue();

    let ticket = match delivery {
        Delivery::Streaming =>
            match agent.open_stream(exchange.clone(), ticket).await {
                Ok(frames) => {
                    return Ok(sse_response(frames));
                }
                Err(failure) => {
                    warn!("Streaming setup failed, answering with a buffered reply: {}", failure.source);
                    failure.ticket
                }
            }
        Delivery::Buffered => ticket,
    };

    let reply = agent.reply(&exchange, ticket).await.map_err(RelayError::Provider)?;
    Ok(Json(reply).into_response())
}

fn sse_response(frames: FrameStream) -> Response {
    let events = frames.map(|frame| Event::default().json_data(&frame));
    Sse::new(events).into_response()
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST, OPTIONS")],
        Json(json!({ "error": "Method not allowed. Use POST to send chat messages." })),
    ).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "OK", "service": SERVICE_NAME }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::APOLOGY_REPLY;
    use crate::config::prompt::PromptConfig;
    use crate::llm::chat::mock::{ MockChatClient, PROVIDER_SECRET_ERROR };
    use crate::models::stream::StreamFrame;
    use axum::body::{ to_bytes, Body };
    use axum::http::Request;
    use tower::ServiceExt;

    const SSE: &str = "text/event-stream";

    fn app_with(client: Arc<MockChatClient>) -> Router {
        let agent = ChatAgent::new(client, Arc::new(PromptConfig { system_prompt: "PERSONA".into() }));
        router(AppState::new(Some(Arc::new(agent))), None)
    }

    fn chat_request(body: impl Into<String>, accept: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        builder.body(Body::from(body.into())).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn parse_frames(body: &str) -> Vec<StreamFrame> {
        body.split("\n\n")
            .filter_map(|block| {
                block.lines().find_map(|line| line.strip_prefix("data:").map(str::trim_start))
            })
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    fn content_type(response: &Response) -> String {
        response.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn empty_or_missing_message_is_rejected_without_provider_call() {
        let client = Arc::new(MockChatClient::replying(&["unused"]));

        for body in [
            r#"{"message": ""}"#,
            r#"{"message": "   "}"#,
            r#"{}"#,
            r#"{"message": 42}"#,
            r#"{"conversationHistory": []}"#,
        ] {
            let response = app_with(client.clone()).oneshot(chat_request(body, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            let json = body_json(response).await;
            assert_eq!(json["error"], "Message is required and must be a string");
        }

        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_body_is_a_client_error() {
        let client = Arc::new(MockChatClient::replying(&["unused"]));

        for body in ["not json", r#"{"message":"hi","conversationHistory":[{"role":"system","content":"x"}]}"#] {
            let response = app_with(client.clone()).oneshot(chat_request(body, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["error"], "Invalid request body");
        }
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn missing_provider_is_a_configuration_error() {
        let app = router(AppState::new(None), None);

        let response = app.oneshot(chat_request(r#"{"message":"hi"}"#, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Server configuration error");
        assert_eq!(json["showDemoButton"], false);
        assert!(json["reply"].as_str().unwrap().contains("technical difficulties"));
        assert!(!json.to_string().to_lowercase().contains("api key"));
    }

    #[tokio::test]
    async fn buffered_reply_carries_text_flag_and_timestamp() {
        let client = Arc::new(MockChatClient::replying(&["Pricing depends on your fleet size."]));
        let body = json!({
            "message": "How much does this cost?",
            "conversationHistory": [
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "Hello! How can I help?" }
            ]
        });

        let response = app_with(client.clone())
            .oneshot(chat_request(body.to_string(), None)).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(content_type(&response).starts_with("application/json"));
        let json = body_json(response).await;
        assert_eq!(json["reply"], "Pricing depends on your fleet size.");
        assert_eq!(json["showDemoButton"], true);
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));

        assert_eq!(client.complete_calls(), 1);
        let prompt = &client.prompts()[0];
        assert!(prompt.starts_with("PERSONA"));
        let hi = prompt.find("User: Hi\n").unwrap();
        let hello = prompt.find("Assistant: Hello! How can I help?\n").unwrap();
        let question = prompt.find("User: How much does this cost?\nAssistant:").unwrap();
        assert!(hi < hello && hello < question);
    }

    #[tokio::test]
    async fn api_prefix_serves_the_same_endpoint() {
        let client = Arc::new(MockChatClient::replying(&["Hi!"]));
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"hello"}"#))
            .unwrap();

        let response = app_with(client).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn streaming_chunks_concatenate_to_complete_frame() {
        let client = Arc::new(MockChatClient::replying(&["We ", "route ", "technicians ", "fast."]));

        let response = app_with(client.clone())
            .oneshot(chat_request(r#"{"message":"hello"}"#, Some(SSE))).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(content_type(&response).starts_with(SSE));
        let frames = parse_frames(&body_text(response).await);

        let mut streamed = String::new();
        for frame in &frames[..frames.len() - 1] {
            match frame {
                StreamFrame::Chunk { chunk } => streamed.push_str(chunk),
                other => panic!("unexpected frame {:?}", other),
            }
        }
        match frames.last().unwrap() {
            StreamFrame::Complete { full_response, show_demo_button, .. } => {
                assert_eq!(&streamed, full_response);
                assert!(!show_demo_button);
            }
            other => panic!("expected complete frame, got {:?}", other),
        }
        assert_eq!(client.stream_calls(), 1);
        assert_eq!(client.complete_calls(), 0);
    }

    #[tokio::test]
    async fn streaming_setup_failure_falls_back_to_buffered() {
        let client = Arc::new(MockChatClient::replying(&["Buffered instead."]).failing_stream_setup());

        let response = app_with(client.clone())
            .oneshot(chat_request(r#"{"message":"hello"}"#, Some(SSE))).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(content_type(&response).starts_with("application/json"));
        assert_eq!(body_json(response).await["reply"], "Buffered instead.");
        assert_eq!(client.stream_calls(), 1);
        assert_eq!(client.complete_calls(), 1);
    }

    #[tokio::test]
    async fn failure_after_stream_accepted_is_not_retried_buffered() {
        let client = Arc::new(MockChatClient::replying(&["unused"]).failing_after(0));

        let response = app_with(client.clone())
            .oneshot(chat_request(r#"{"message":"hello"}"#, Some(SSE))).await
            .unwrap();

        assert!(content_type(&response).starts_with(SSE));
        let body = body_text(response).await;
        assert!(!body.contains(PROVIDER_SECRET_ERROR));
        assert_eq!(parse_frames(&body), vec![StreamFrame::Error { error: APOLOGY_REPLY.into() }]);
        assert_eq!(client.total_calls(), 1);
    }

    #[tokio::test]
    async fn midstream_failure_emits_error_frame_without_provider_detail() {
        let client = Arc::new(MockChatClient::replying(&["Partial ", "answer"]).failing_after(1));

        let response = app_with(client)
            .oneshot(chat_request(r#"{"message":"hello"}"#, Some(SSE))).await
            .unwrap();

        let body = body_text(response).await;
        assert!(!body.contains(PROVIDER_SECRET_ERROR));
        let frames = parse_frames(&body);
        assert_eq!(
            frames,
            vec![
                StreamFrame::Chunk { chunk: "Partial ".into() },
                StreamFrame::Error { error: APOLOGY_REPLY.into() }
            ]
        );
    }

    #[tokio::test]
    async fn provider_failure_returns_generic_apology() {
        let client = Arc::new(MockChatClient::replying(&["unused"]).failing_complete());

        let response = app_with(client)
            .oneshot(chat_request(r#"{"message":"Can I book a demo?"}"#, None)).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert!(!body.contains(PROVIDER_SECRET_ERROR));
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Sorry, I encountered an issue. Please try again.");
        assert_eq!(json["reply"], APOLOGY_REPLY);
        assert_eq!(json["showDemoButton"], false);
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let client = Arc::new(MockChatClient::replying(&["unused"]));

        for method in ["GET", "PUT", "DELETE"] {
            let request = Request::builder().method(method).uri("/chat").body(Body::empty()).unwrap();
            let response = app_with(client.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "method: {method}");
            assert_eq!(
                body_json(response).await["error"],
                "Method not allowed. Use POST to send chat messages."
            );
        }
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn preflight_allows_post_and_is_cacheable_for_a_day() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/chat")
            .header(header::ORIGIN, "https://optiserve.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app_with(Arc::new(MockChatClient::default())).oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        let headers = response.headers();
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(allowed.contains("POST"));
        let allowed_headers = headers[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap().to_lowercase();
        assert!(allowed_headers.contains("content-type") && allowed_headers.contains("accept"));
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn rate_limit_rejects_bursts_before_provider_call() {
        let client = Arc::new(MockChatClient::replying(&["ok"]));
        let agent = ChatAgent::new(client.clone(), Arc::new(PromptConfig::default()));
        let app = router(AppState::new(Some(Arc::new(agent))).with_rate_limit(1), None);

        let first = app.clone().oneshot(chat_request(r#"{"message":"hi"}"#, None)).await.unwrap();
        let second = app.oneshot(chat_request(r#"{"message":"hi"}"#, None)).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(client.complete_calls(), 1);
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router(AppState::new(None), None).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "OK");
        assert_eq!(json["service"], SERVICE_NAME);
    }
}

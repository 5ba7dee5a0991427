use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{ Stream, StreamExt };
use log::debug;
use reqwest::header::{ ACCEPT, CONTENT_TYPE };
use std::pin::Pin;
use thiserror::Error;

use crate::models::chat::{ ChatReply, ChatRequest };
use crate::models::stream::StreamFrame;

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("relay answered with HTTP status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed relay response: {0}")]
    Malformed(String),
}

pub type RelayFrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, TransportError>> + Send>>;

/// Connection from the widget to the chat relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, TransportError>;

    /// Requests a streamed reply. A relay that answers with a buffered reply
    /// yields it as a single `complete` frame.
    async fn stream(&self, request: &ChatRequest) -> Result<RelayFrameStream, TransportError>;
}

pub struct HttpRelayTransport {
    http: reqwest::Client,
    relay_url: String,
}

impl HttpRelayTransport {
    pub fn new(relay_url: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            relay_url: relay_url.into(),
        })
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    async fn post(&self, request: &ChatRequest, accept: &str) -> Result<reqwest::Response, TransportError> {
        let resp = self.http
            .post(&self.relay_url)
            .header(ACCEPT, accept)
            .json(request)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(resp)
    }
}

async fn read_reply(resp: reqwest::Response) -> Result<ChatReply, TransportError> {
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))
}

fn is_event_stream(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with(EVENT_STREAM))
        .unwrap_or(false)
}

#[async_trait]
impl RelayTransport for HttpRelayTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        let resp = self.post(request, "application/json").await?;
        read_reply(resp).await
    }

    async fn stream(&self, request: &ChatRequest) -> Result<RelayFrameStream, TransportError> {
        let resp = self.post(request, EVENT_STREAM).await?;

        if !is_event_stream(&resp) {
            debug!("Relay answered a stream request with a buffered reply");
            let reply = read_reply(resp).await?;
            let frame = StreamFrame::Complete {
                full_response: reply.reply,
                show_demo_button: reply.show_demo_button,
                timestamp: reply.timestamp,
            };
            return Ok(Box::pin(futures::stream::iter([Ok::<_, TransportError>(frame)])));
        }

        let frames = resp
            .bytes_stream()
            .eventsource()
            .map(|event| {
                let event = event.map_err(|e| TransportError::Malformed(e.to_string()))?;
                serde_json::from_str::<StreamFrame>(&event.data)
                    .map_err(|e| TransportError::Malformed(format!("{}: {}", e, event.data)))
            });
        Ok(Box::pin(frames))
    }
}

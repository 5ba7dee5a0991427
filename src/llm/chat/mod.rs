pub mod gemini;
pub mod openai;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{ Stream, StreamExt, Future };
use log::debug;
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::gemini::GeminiChatClient;
use self::openai::OpenAIChatClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Fragments of generated text in provider emission order.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<CompletionResponse, BoxError>;

    /// Opens an incremental generation. An `Err` here means the provider
    /// refused the request; failures after that arrive as stream items.
    ///
    /// Clients without native streaming deliver the whole completion, or its
    /// error, as a single item.
    async fn stream_completion(&self, prompt: &str) -> Result<CompletionStream, BoxError> {
        let result = self.complete(prompt).await.map(|r| r.response);
        Ok(Box::pin(futures::stream::once(async move { result })))
    }

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
    fn supports_native_streaming(&self) -> bool {
        false
    }
}

pub fn create_streaming_response<T, F, Fut>(
    response_fn: F
) -> Pin<Box<dyn Stream<Item = T> + Send>>
where
    T: Send + 'static,
    F: FnOnce(mpsc::Sender<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

#[derive(Deserialize)]
struct StreamErrorEvent {
    error: serde_json::Value,
}

/// A `{"error": ...}` payload sent inside an otherwise successful stream.
pub(crate) fn stream_error(data: &str) -> Option<BoxError> {
    let event: StreamErrorEvent = serde_json::from_str(data).ok()?;
    let message = event.error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| event.error.as_str())
        .unwrap_or("unknown provider error");
    Some(format!("Provider stream error: {}", message).into())
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// Sends a provider request whose answer is a server-sent-event stream and
/// forwards the text each event yields.
///
/// The request is sent and its status checked before returning, so transport
/// and HTTP failures surface as `Err` without any fragment produced. The body
/// is then read by a background task that stops as soon as the consumer drops
/// the returned stream.
pub async fn http_stream_generate(
    request: reqwest::RequestBuilder,
    event_parser: fn(&str) -> Result<Option<String>, BoxError>
) -> Result<CompletionStream, BoxError> {
    let resp = request.send().await?.error_for_status()?;

    Ok(
        create_streaming_response(move |tx: mpsc::Sender<Result<String, BoxError>>| async move {
            let mut events = resp.bytes_stream().eventsource();
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Stream consumer went away, closing provider stream");
                        return;
                    }
                    next = events.next() => next,
                };

                match next {
                    Some(Ok(event)) =>
                        match event_parser(&event.data) {
                            Ok(Some(token)) => {
                                if token.is_empty() {
                                    continue;
                                }
                                if tx.send(Ok(token)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e.to_string().into())).await;
                        return;
                    }
                    None => {
                        return;
                    }
                }
            }
        })
    )
}

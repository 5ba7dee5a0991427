use crate::config::prompt::{ build_prompt, PromptConfig };
use crate::intent::should_show_demo_button;
use crate::llm::chat::{ create_streaming_response, BoxError, ChatClient };
use crate::models::chat::{ timestamp_now, ChatReply, ChatRequest, ConversationHistoryEntry };
use crate::models::stream::StreamFrame;

use futures::{ Stream, StreamExt };
use log::{ error, info, warn };
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

const LOG_PREVIEW_CHARS: usize = 50;

pub const APOLOGY_REPLY: &str =
    "I apologize, but I'm experiencing technical difficulties. Please refresh the page and try again, or contact us directly for assistance.";

pub type FrameStream = Pin<Box<dyn Stream<Item = StreamFrame> + Send>>;

/// How the reply is delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Buffered,
    Streaming,
}

impl Delivery {
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(value) if value.to_ascii_lowercase().contains("text/event-stream") =>
                Delivery::Streaming,
            _ => Delivery::Buffered,
        }
    }
}

/// Permission for the one billable generation of an inbound request.
///
/// Generating consumes the ticket. Only a streaming attempt the provider
/// refused outright hands it back, through [`StreamSetupFailure`].
#[must_use]
#[derive(Debug)]
pub struct GenerationTicket {
    _private: (),
}

impl GenerationTicket {
    pub(crate) fn issue() -> Self {
        Self { _private: () }
    }
}

pub struct StreamSetupFailure {
    pub ticket: GenerationTicket,
    pub source: BoxError,
}

impl fmt::Debug for StreamSetupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSetupFailure").field("source", &self.source.to_string()).finish()
    }
}

/// A validated request with its assembled prompt.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub message: String,
    pub history: Vec<ConversationHistoryEntry>,
    pub prompt: String,
}

#[derive(Clone)]
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
}

impl ChatAgent {
    pub fn new(chat_client: Arc<dyn ChatClient>, prompt_config: Arc<PromptConfig>) -> Self {
        Self { chat_client, prompt_config }
    }

    pub fn prepare(&self, request: ChatRequest) -> Exchange {
        let prompt = build_prompt(&self.prompt_config, &request.conversation_history, &request.message);
        Exchange {
            message: request.message,
            history: request.conversation_history,
            prompt,
        }
    }

    pub async fn reply(
        &self,
        exchange: &Exchange,
        ticket: GenerationTicket
    ) -> Result<ChatReply, BoxError> {
        drop(ticket);
        let response = self.chat_client.complete(&exchange.prompt).await.map_err(|e| {
            error!("Error processing chat message: {}", e);
            e
        })?;
        let reply = response.response;

        let show_demo_button = should_show_demo_button(&exchange.message, &reply, &exchange.history);
        log_interaction(&exchange.message, &reply);

        Ok(ChatReply {
            reply,
            show_demo_button,
            timestamp: timestamp_now(),
        })
    }

    /// Starts a streaming generation.
    ///
    /// The ticket comes back only when the provider refused to start; any
    /// failure after that ends the stream with a single `error` frame.
    pub async fn open_stream(
        &self,
        exchange: Exchange,
        ticket: GenerationTicket
    ) -> Result<FrameStream, StreamSetupFailure> {
        let mut tokens = match self.chat_client.stream_completion(&exchange.prompt).await {
            Ok(tokens) => tokens,
            Err(source) => {
                return Err(StreamSetupFailure { ticket, source });
            }
        };
        drop(ticket);

        Ok(
            create_streaming_response(move |tx: mpsc::Sender<StreamFrame>| async move {
                let mut full_response = String::new();

                while let Some(item) = tokens.next().await {
                    let token = match item {
                        Ok(token) => token,
                        Err(e) => {
                            error!("Provider stream failed after {} bytes: {}", full_response.len(), e);
                            let _ = tx.send(StreamFrame::Error {
                                error: APOLOGY_REPLY.to_string(),
                            }).await;
                            return;
                        }
                    };

                    full_response.push_str(&token);
                    if tx.send(StreamFrame::Chunk { chunk: token }).await.is_err() {
                        warn!("Client disconnected mid-stream, abandoning generation");
                        return;
                    }
                }

                let show_demo_button = should_show_demo_button(
                    &exchange.message,
                    &full_response,
                    &exchange.history
                );
                log_interaction(&exchange.message, &full_response);

                let _ = tx.send(StreamFrame::Complete {
                    full_response,
                    show_demo_button,
                    timestamp: timestamp_now(),
                }).await;
            })
        )
    }
}

fn log_interaction(message: &str, reply: &str) {
    info!(
        "Chat interaction: {}... -> {}...",
        preview(message, LOG_PREVIEW_CHARS),
        preview(reply, LOG_PREVIEW_CHARS)
    );
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

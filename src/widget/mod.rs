pub mod render;
pub mod state;
pub mod transport;

use futures::StreamExt;
use log::{ debug, warn };
use std::time::Duration;

use crate::agent::Delivery;
use crate::models::chat::ChatRequest;
use crate::models::stream::StreamFrame;
use self::state::{ Action, Effect, WidgetState };
use self::transport::RelayTransport;

pub const DEFAULT_CTA_DELAY: Duration = Duration::from_millis(500);

/// Runs the widget state machine against a relay.
pub struct ChatWidget<T: RelayTransport> {
    state: WidgetState,
    transport: T,
    cta_delay: Duration,
}

impl<T: RelayTransport> ChatWidget<T> {
    pub fn new(transport: T, delivery: Delivery) -> Self {
        Self {
            state: WidgetState::new(delivery),
            transport,
            cta_delay: DEFAULT_CTA_DELAY,
        }
    }

    pub fn with_booking_url(mut self, booking_url: impl Into<String>) -> Self {
        self.state = self.state.with_booking_url(booking_url);
        self
    }

    pub fn with_cta_delay(mut self, cta_delay: Duration) -> Self {
        self.cta_delay = cta_delay;
        self
    }

    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn open(&mut self) {
        self.state.dispatch(Action::Open);
    }

    pub fn close(&mut self) {
        self.state.dispatch(Action::Close);
    }

    pub fn toggle(&mut self) {
        self.state.dispatch(Action::Toggle);
    }

    pub fn escape(&mut self) {
        self.state.dispatch(Action::Escape);
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.dispatch(Action::InputChanged(text.into()));
    }

    pub fn clear_conversation(&mut self) {
        self.state.dispatch(Action::Clear);
    }

    pub async fn submit_input(&mut self) -> bool {
        self.submit_input_with(|_| {}).await
    }

    pub async fn submit_input_with<F>(&mut self, on_chunk: F) -> bool
        where F: FnMut(&str) + Send
    {
        let text = self.state.input().to_string();
        self.send_message_with(&text, on_chunk).await
    }

    /// Returns `false` when nothing was sent (blank text or a request already
    /// in flight).
    pub async fn send_message(&mut self, text: &str) -> bool {
        self.send_message_with(text, |_| {}).await
    }

    /// Like [`send_message`](Self::send_message), reporting each streamed
    /// fragment to `on_chunk` as it arrives.
    pub async fn send_message_with<F>(&mut self, text: &str, on_chunk: F) -> bool
        where F: FnMut(&str) + Send
    {
        let request = match self.state.dispatch(Action::Send(text.to_string())) {
            Some(Effect::Dispatch(request)) => request,
            _ => {
                return false;
            }
        };

        let effect = match self.state.delivery() {
            Delivery::Buffered => self.exchange_buffered(&request).await,
            Delivery::Streaming => self.exchange_streaming(&request, on_chunk).await,
        };

        if let Some(Effect::ScheduleCallToAction) = effect {
            tokio::time::sleep(self.cta_delay).await;
            self.state.dispatch(Action::ShowCallToAction);
        }
        true
    }

    async fn exchange_buffered(&mut self, request: &ChatRequest) -> Option<Effect> {
        match self.transport.send(request).await {
            Ok(reply) =>
                self.state.dispatch(Action::ReplyReceived {
                    reply: reply.reply,
                    show_demo_button: reply.show_demo_button,
                }),
            Err(e) => {
                warn!("Chat relay request failed: {}", e);
                self.state.dispatch(Action::TransportFailed)
            }
        }
    }

    async fn exchange_streaming<F>(&mut self, request: &ChatRequest, mut on_chunk: F) -> Option<Effect>
        where F: FnMut(&str) + Send
    {
        let mut frames = match self.transport.stream(request).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Chat relay stream could not be opened: {}", e);
                return self.state.dispatch(Action::TransportFailed);
            }
        };

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(StreamFrame::Chunk { chunk }) => {
                    on_chunk(&chunk);
                    self.state.dispatch(Action::ChunkReceived(chunk));
                }
                Ok(StreamFrame::Complete { full_response, show_demo_button, .. }) => {
                    return self.state.dispatch(Action::StreamCompleted { full_response, show_demo_button });
                }
                Ok(StreamFrame::Error { error }) => {
                    debug!("Relay reported a failed generation: {}", error);
                    return self.state.dispatch(Action::StreamFailed);
                }
                Err(e) => {
                    warn!("Chat relay stream broke: {}", e);
                    return self.state.dispatch(Action::TransportFailed);
                }
            }
        }

        warn!("Chat relay stream ended without a final frame");
        self.state.dispatch(Action::TransportFailed)
    }
}

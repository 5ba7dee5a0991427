use chrono::{ DateTime, Utc };
use uuid::Uuid;

use crate::agent::{ Delivery, APOLOGY_REPLY };
use crate::models::chat::{ ChatRequest, ConversationHistoryEntry, Role };

pub const MAX_INPUT_CHARS: usize = 500;
pub const HISTORY_WINDOW: usize = 12;
pub const DEFAULT_BOOKING_URL: &str = "https://cal.com/kawacu-kent-vnfqcr/30min";
pub const WELCOME_MESSAGE: &str =
    "👋 Hello! I'm Kenneth, your AI receptionist at OptiServe AI. I'm here to help you discover how our AI-powered dispatch solutions can transform your home service business operations.\n\nWhat would you like to know about our services?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    CallToAction {
        booking_url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub body: MessageBody,
    /// Pinned messages survive `Clear` and never enter the history payload.
    pub pinned: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            body,
            pinned: false,
            timestamp: Utc::now(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::CallToAction { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Buffered request in flight; the typing indicator is shown.
    Waiting,
    /// Streaming request sent, no fragment received yet.
    Sending {
        message_id: Uuid,
    },
    Streaming {
        message_id: Uuid,
    },
}

impl Phase {
    pub fn in_flight(&self) -> bool {
        !matches!(self, Phase::Idle)
    }

    fn placeholder(&self) -> Option<Uuid> {
        match self {
            Phase::Sending { message_id } | Phase::Streaming { message_id } => Some(*message_id),
            Phase::Idle | Phase::Waiting => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Open,
    Close,
    Toggle,
    Escape,
    InputChanged(String),
    Send(String),
    ReplyReceived {
        reply: String,
        show_demo_button: bool,
    },
    ChunkReceived(String),
    StreamCompleted {
        full_response: String,
        show_demo_button: bool,
    },
    StreamFailed,
    TransportFailed,
    ShowCallToAction,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Dispatch(ChatRequest),
    ScheduleCallToAction,
}

#[derive(Debug, Clone)]
pub struct WidgetState {
    open: bool,
    input_focused: bool,
    transcript: Vec<ChatMessage>,
    input: String,
    phase: Phase,
    delivery: Delivery,
    booking_url: String,
}

impl WidgetState {
    pub fn new(delivery: Delivery) -> Self {
        let mut welcome = ChatMessage::new(Role::Assistant, MessageBody::Text(WELCOME_MESSAGE.to_string()));
        welcome.pinned = true;

        Self {
            open: false,
            input_focused: false,
            transcript: vec![welcome],
            input: String::new(),
            phase: Phase::Idle,
            delivery,
            booking_url: DEFAULT_BOOKING_URL.to_string(),
        }
    }

    pub fn with_booking_url(mut self, booking_url: impl Into<String>) -> Self {
        self.booking_url = booking_url.into();
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn input_focused(&self) -> bool {
        self.input_focused
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn in_flight(&self) -> bool {
        self.phase.in_flight()
    }

    pub fn typing_indicator(&self) -> bool {
        self.phase == Phase::Waiting
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    pub fn booking_url(&self) -> &str {
        &self.booking_url
    }

    /// Prior exchange sent along with the next message: unpinned text
    /// messages only, most recent `HISTORY_WINDOW` of them, oldest first.
    pub fn history(&self) -> Vec<ConversationHistoryEntry> {
        let entries: Vec<ConversationHistoryEntry> = self.transcript
            .iter()
            .filter(|m| !m.pinned)
            .filter_map(|m| m.text().map(|text| ConversationHistoryEntry::new(m.role, text)))
            .collect();
        let skip = entries.len().saturating_sub(HISTORY_WINDOW);
        entries.into_iter().skip(skip).collect()
    }

    pub fn dispatch(&mut self, action: Action) -> Option<Effect> {
        match action {
            Action::Open => {
                self.open = true;
                self.input_focused = true;
                None
            }
            Action::Close | Action::Escape => {
                self.open = false;
                self.input_focused = false;
                None
            }
            Action::Toggle => {
                let action = if self.open { Action::Close } else { Action::Open };
                self.dispatch(action)
            }
            Action::InputChanged(text) => {
                self.input = text.chars().take(MAX_INPUT_CHARS).collect();
                None
            }
            Action::Send(text) => self.send(&text),
            Action::ReplyReceived { reply, show_demo_button } |
            Action::StreamCompleted { full_response: reply, show_demo_button } => {
                if !self.in_flight() {
                    return None;
                }
                self.finish(reply);
                show_demo_button.then_some(Effect::ScheduleCallToAction)
            }
            Action::ChunkReceived(fragment) => {
                if let Some(message_id) = self.phase.placeholder() {
                    if let Some(MessageBody::Text(text)) = self.body_mut(message_id) {
                        text.push_str(&fragment);
                    }
                    self.phase = Phase::Streaming { message_id };
                }
                None
            }
            Action::StreamFailed | Action::TransportFailed => {
                if self.in_flight() {
                    self.finish(APOLOGY_REPLY.to_string());
                }
                None
            }
            Action::ShowCallToAction => {
                let booking_url = self.booking_url.clone();
                self.transcript.push(
                    ChatMessage::new(Role::Assistant, MessageBody::CallToAction { booking_url })
                );
                None
            }
            Action::Clear => {
                self.transcript.retain(|m| m.pinned);
                None
            }
        }
    }

    fn send(&mut self, text: &str) -> Option<Effect> {
        let message = text.trim();
        if message.is_empty() || self.in_flight() {
            return None;
        }

        let history = self.history();
        self.transcript.push(ChatMessage::new(Role::User, MessageBody::Text(message.to_string())));
        self.input.clear();

        self.phase = match self.delivery {
            Delivery::Buffered => Phase::Waiting,
            Delivery::Streaming => {
                let placeholder = ChatMessage::new(Role::Assistant, MessageBody::Text(String::new()));
                let message_id = placeholder.id;
                self.transcript.push(placeholder);
                Phase::Sending { message_id }
            }
        };

        Some(Effect::Dispatch(ChatRequest::new(message, history)))
    }

    fn finish(&mut self, text: String) {
        match self.phase.placeholder().and_then(|id| self.body_mut(id)) {
            Some(body) => {
                *body = MessageBody::Text(text);
            }
            None => {
                self.transcript.push(ChatMessage::new(Role::Assistant, MessageBody::Text(text)));
            }
        }
        self.phase = Phase::Idle;
    }

    fn body_mut(&mut self, id: Uuid) -> Option<&mut MessageBody> {
        self.transcript
            .iter_mut()
            .find(|m| m.id == id)
            .map(|m| &mut m.body)
    }
}

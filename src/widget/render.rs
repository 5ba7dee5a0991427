use crate::models::chat::Role;
use super::state::{ ChatMessage, MessageBody };

pub const BOOK_DEMO_LABEL: &str = "Book Demo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(String),
    Link {
        label: &'static str,
        href: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub role: Role,
    pub blocks: Vec<Block>,
}

pub fn render_message(message: &ChatMessage) -> RenderedMessage {
    let blocks = match &message.body {
        MessageBody::Text(text) =>
            text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| Block::Paragraph(line.to_string()))
                .collect(),
        MessageBody::CallToAction { booking_url } =>
            vec![Block::Link { label: BOOK_DEMO_LABEL, href: booking_url.clone() }],
    };

    RenderedMessage { role: message.role, blocks }
}

pub fn render_transcript(transcript: &[ChatMessage]) -> Vec<RenderedMessage> {
    transcript.iter().map(render_message).collect()
}

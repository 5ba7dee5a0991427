use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

use crate::models::chat::ConversationHistoryEntry;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the AI receptionist for OptiServe AI, a company building AI-powered dispatch systems for home service professionals (HVAC, plumbing, electrical).

What OptiServe AI does:
- Answers customer calls, qualifies leads, books appointments and dispatches technicians 24/7
- Helps HVAC, plumbing and electrical companies win more jobs and keep customers happy
- Cuts operational costs and grows revenue through automation
- Offers personalized consultations and demos tailored to each business

Personality:
- Professional, warm and approachable
- Knowledgeable about AI automation and home service operations
- Enthusiastic about showing owners what automation can do for them

Guidelines:
- Keep answers short (2-3 sentences) unless a topic needs more detail
- Stay in character as OptiServe AI's receptionist
- When visitors show interest or ask about demos, offer to book one
- If asked about pricing, explain that it is tailored to business size and needs and suggest a demo
- Focus on how AI dispatch helps home service businesses grow

Your goal is to make a great first impression and guide qualified prospects toward booking a demo consultation.";

const HISTORY_HEADER: &str = "\n\nConversation history:\n";

#[derive(Debug)]
pub enum PromptError {
    EmptyPrompt(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyPrompt(path) => write!(f, "Prompt file '{}' has an empty system_prompt", path),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    pub system_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { system_prompt: DEFAULT_SYSTEM_PROMPT.to_string() }
    }
}

pub fn load_prompts(path: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    if config.system_prompt.trim().is_empty() {
        return Err(PromptError::EmptyPrompt(path.to_string()));
    }
    info!("Loaded persona prompt from '{}'", path);
    Ok(Arc::new(config))
}

pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(path) if !path.trim().is_empty() => load_prompts(path),
        _ => {
            info!("No prompts file configured, using the built-in persona");
            Ok(Arc::new(PromptConfig::default()))
        }
    }
}

/// Persona block, then every history turn in its original order, then the new
/// message and the generation cue.
pub fn build_prompt(
    config: &PromptConfig,
    history: &[ConversationHistoryEntry],
    message: &str
) -> String {
    let mut prompt = String::with_capacity(config.system_prompt.len() + message.len() + 64);
    prompt.push_str(&config.system_prompt);
    prompt.push_str(HISTORY_HEADER);
    for entry in history {
        prompt.push_str(&format!("{}: {}\n", entry.role.label(), entry.content));
    }
    prompt.push_str(&format!("User: {}\nAssistant:", message));
    prompt
}

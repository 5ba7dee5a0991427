use clap::Parser;

use crate::llm::{ LlmConfig, LlmType };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, openai)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: LlmType,

    /// Base URL for the Chat LLM provider API
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Falls back to GEMINI_API_KEY or OPENAI_API_KEY.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-1.5-flash, gpt-4o-mini)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- General App Args ---
    /// Path to the prompt configuration file. The built-in persona is used when unset.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3001")]
    pub server_addr: String,

    /// Directory of static front-end files served for paths outside the API.
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<String>,

    /// Chat requests accepted per second across all clients. 0 disables limiting.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "10")]
    pub rate_limit_per_second: u32,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// Explicit chat key first, then the provider's own variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(&self.chat_api_key, std::env::var(self.chat_llm_type.credential_env()).ok())
    }

    pub fn chat_llm_config(&self) -> LlmConfig {
        LlmConfig {
            llm_type: self.chat_llm_type,
            api_key: self.resolved_api_key(),
            completion_model: self.chat_model.clone(),
            base_url: self.chat_base_url.clone(),
        }
    }
}

fn resolve_api_key(explicit: &str, provider_env: Option<String>) -> Option<String> {
    Some(explicit.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| provider_env.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()))
}

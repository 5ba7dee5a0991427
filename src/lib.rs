pub mod agent;
pub mod models;
pub mod server;
pub mod config;
pub mod llm;
pub mod cli;
pub mod intent;
pub mod widget;

use agent::ChatAgent;
use cli::Args;
use config::prompt::load_prompts_or_default;
use llm::chat::new_client;
use log::{ info, warn };
use server::api::AppState;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("(provider default)"));
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("(provider default)"));
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("(built-in)"));
    info!("Static Dir: {}", args.static_dir.as_deref().unwrap_or("(none)"));
    info!("Rate Limit (req/s): {}", args.rate_limit_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let prompt_config = load_prompts_or_default(args.prompts_path.as_deref())?;

    let agent = match new_client(&args.chat_llm_config()) {
        Ok(chat_client) => {
            info!(
                "Chat client ready: model={} base_url={} native_streaming={}",
                chat_client.get_model(),
                chat_client.get_base_url().unwrap_or_default(),
                chat_client.supports_native_streaming()
            );
            Some(Arc::new(ChatAgent::new(chat_client, prompt_config)))
        }
        Err(e) => {
            warn!("Chat provider unavailable, chat requests will report a configuration error: {}", e);
            None
        }
    };

    let state = AppState::new(agent).with_rate_limit(args.rate_limit_per_second);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}

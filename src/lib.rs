pub mod cancel;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod proxy;
pub mod server;

use cancel::InMemoryCancellationRegistry;
use cli::Args;
use config::prompt::PromptConfig;
use config::{ GenerationDefaults, RateLimitConfig };
use history::initialize_history_store;
use llm::chat::new_client as new_chat_client;
use llm::LlmConfig;
use log::info;
use proxy::ChatProxy;
use server::api::AppState;
use server::rate_limit::RateLimiter;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Chat API Key: {}", if args.chat_api_key.is_empty() { "not set" } else { "set" });
    info!("History Store Type: {}", args.history_type);
    info!("History Store Host: {}", args.history_host);
    info!("Max Context Tokens: {}", args.max_context_tokens);
    info!(
        "Rate Limit: {} requests / {}s keyed by '{}'",
        args.rate_limit_max_requests,
        args.rate_limit_window_secs,
        args.rate_limit_header
    );
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let llm_config = LlmConfig {
        llm_type: args.chat_llm_type
            .parse()
            .map_err(|e| format!("Invalid chat LLM type: {}", e))?,
        base_url: args.chat_base_url.clone(),
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        model: args.chat_model.clone(),
    };
    let provider = new_chat_client(&llm_config)?;
    info!(
        "Chat client configured: Type={}, Model={}, URL={:?}",
        llm_config.llm_type,
        provider.get_model(),
        provider.get_base_url()
    );

    let store = Arc::new(initialize_history_store(&args)?);
    let proxy = Arc::new(
        ChatProxy::new(
            provider,
            store,
            Arc::new(InMemoryCancellationRegistry::new()),
            PromptConfig::from_args(&args),
            GenerationDefaults::from_args(&args)
        )
    );

    let rate_limit = RateLimitConfig::from_args(&args);
    let limiter = Arc::new(RateLimiter::from_config(&rate_limit));
    let state = AppState::new(proxy, limiter, rate_limit.client_header);

    let server = Server::new(args.server_addr.clone(), state, args.clone());
    server.run().await?;

    info!("Server stopped");
    Ok(())
}

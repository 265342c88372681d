pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use agent::ChatAgent;
use auth::AuthClient;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<set>" }
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr());
    info!("History Store Type: {}", args.history_type);
    info!("History Store Host: {}", args.history_host);
    info!("Store Failure Policy: {:?}", args.store_failure_policy);
    info!("Serialize Sessions: {}", args.serialize_sessions);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Temperature: {}", args.chat_temperature);
    info!("Chat API Key: {}", mask(&args.chat_api_key));
    info!("Auth Backend: {}", args.auth_backend_url);
    info!("Auth Timeout: {}s", args.auth_timeout_secs);
    info!("Session Secret: {}", mask(&args.secret_key));
    info!("Allowed Origins: {}", args.allowed_origins.join(", "));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = Arc::new(ChatAgent::from_args(&args).await?);
    let auth = Arc::new(
        AuthClient::new(&args.auth_backend_url, Duration::from_secs(args.auth_timeout_secs))?
    );
    info!("Tokens will be introspected at: {}", auth.profile_url());

    let server = Server::new(agent, auth, args);
    server.run().await?;

    Ok(())
}

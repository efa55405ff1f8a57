use clap::Parser;
use tracing::{info, warn};

use causerie::core::config::RelayConfig;
use causerie::server::{self, AppState};

#[derive(Parser)]
#[command(name = "causerie")]
#[command(about = "A streaming relay server for LLM chat interfaces")]
#[command(long_about = "Causerie relays chat requests to an LLM provider and streams the \
response back as plain text.\n\n\
Environment Variables:\n\
  LLM_PROVIDER        'deepseek' selects DeepSeek; anything else selects OpenAI\n\
  DEEPSEEK_API_KEY    API key for DeepSeek\n\
  OPENAI_API_KEY      API key for OpenAI\n\
  DEEPSEEK_BASE_URL   Custom DeepSeek base URL (optional)\n\
  OPENAI_BASE_URL     Custom OpenAI base URL (optional)\n\
  SYSTEM_PROMPT       Override the built-in default system prompt (optional)")]
struct Args {
    #[arg(long, default_value = "127.0.0.1", help = "Address to bind")]
    host: String,

    #[arg(short, long, default_value_t = 8080, help = "Port to listen on")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = RelayConfig::from_env();
    let state = AppState::new(config);

    if !state.selector.has_credentials() {
        // Still serve: the endpoint answers with a structured
        // configuration error until the operator supplies a key.
        warn!("no API key configured for the selected provider");
    }

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "causerie relay listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install Ctrl+C handler; running without graceful shutdown");
        futures_util::future::pending::<()>().await;
    }
}

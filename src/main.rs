use clap::Parser;

use fitwork::config::AppConfig;
use fitwork::state::SessionContext;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "fitwork=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let args = cli::Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(url) = args.api_url {
        config.api.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(path) = args.token_file {
        config.token_file = path;
    }
    tracing::debug!(
        api = %config.api.base_url,
        tokens = %config.token_file.display(),
        "config loaded"
    );

    let ctx = SessionContext::init(config)?;
    cli::run(args.command, &ctx).await
}

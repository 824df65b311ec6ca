pub mod bot;
pub mod config;
pub mod dirs;
pub mod job;
pub mod media;
pub mod models;
pub mod report;
pub mod telegram;
pub mod text;
pub mod transcribe;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Application-specific environment variable for log filtering (overrides config).
const LOG_ENV_VAR: &str = "VOICESCRIBE_LOG";

/// Entry point for the bot process: configures logging and launches the bot.
pub async fn run() -> anyhow::Result<()> {
    let config = config::Config::load().unwrap_or_default();

    // VOICESCRIBE_LOG env var overrides config file level
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(config.logging.level.as_directive().parse()?)
        .from_env()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Route whisper.cpp and GGML logs through tracing
    whisper_rs::install_logging_hooks();

    bot::run(config).await
}

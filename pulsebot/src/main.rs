/*
pulsebot - Telegram front-end
Registers users, relays their questions to the API and pushes periodic digests.
*/

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::Config;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pulsebot::api::ApiClient;
use pulsebot::dialogue;
use pulsebot::report;
use pulsebot::settings::BotSettings;

#[derive(Parser, Debug)]
#[command(name = "pulsebot", about = "Telegram bot for the CryptoPulse news assistant")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base URL of the CryptoPulse API
    #[arg(long, env = "FASTAPI_BASE_URL")]
    api_base_url: Option<String>,

    /// Hours between two digests
    #[arg(long)]
    report_interval_hours: Option<u64>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // The bot only needs the [bot] table; a missing or broken config falls back to defaults
    let file_config = match Config::load_with_defaults(
        Some(std::path::Path::new("config.default.toml")),
        Some(args.config.as_deref().unwrap_or(std::path::Path::new("config.toml"))),
    )
    .await
    {
        Ok(cfg) => cfg.bot,
        Err(e) => {
            warn!("Using default bot settings: {:#}", e);
            None
        }
    };

    let settings = BotSettings::resolve(
        file_config.as_ref(),
        args.api_base_url,
        args.report_interval_hours,
    );
    let token = settings.token()?;

    let api = Arc::new(
        ApiClient::new(&settings.api_base_url, settings.request_timeout)
            .context("Failed to build API client")?,
    );

    info!(
        "Starting pulsebot (API: {}, digest every {}h)",
        settings.api_base_url,
        settings.report_interval.as_secs() / 3600
    );

    let bot = Bot::new(token);
    let reports = report::spawn_reports(bot.clone(), api.clone(), settings.report_interval);

    Dispatcher::builder(bot, dialogue::schema())
        .dependencies(dptree::deps![dialogue::new_storage(), api])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    reports.abort();
    info!("pulsebot stopped");
    Ok(())
}

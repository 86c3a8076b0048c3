//! installer-ledger: Telegram-бот учёта кабеля, оборудования и подключений монтажников.

mod bot;
mod config;
mod db;
mod report;

use std::path::PathBuf;
use std::sync::Arc;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/installer-ledger.toml"));
    tracing::info!(
        "Starting installer-ledger with config {}",
        config_path.display()
    );

    let config = Arc::new(config::Config::load(&config_path)?);
    let token = config.bot_token()?;
    tracing::info!(
        admin_count = config.admin_ids.len(),
        allowed_count = config.allowed_ids.len(),
        db_path = %config.db_path.display(),
        reports_channel_id = ?config.reports_channel_id,
        list_page_size = config.list_page_size,
        "Configuration loaded"
    );

    let db = Arc::new(db::Db::open(&config.db_path).await?);
    match db.count_connections().await {
        Ok(count) => tracing::info!(connections = count, "Database ready"),
        Err(error) => tracing::warn!(error = %error, "Не удалось прочитать число подключений"),
    }

    let bot = Bot::new(token);
    let state = bot::handlers::BotState { config, db };
    tracing::info!("Dispatcher initialized, bot is ready");

    Dispatcher::builder(bot, bot::handlers::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

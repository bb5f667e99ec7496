use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{error, info};

use homework_relay::api::PracticumClient;
use homework_relay::config::RelayConfig;
use homework_relay::log;
use homework_relay::notify::{Notifier, TelegramBot};
use homework_relay::orchestrator::Orchestrator;
use homework_relay::RelayError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn load_config() -> Result<RelayConfig> {
    match RelayConfig::from_env() {
        Ok(config) => Ok(config),
        Err(e) => {
            match &e {
                RelayError::MissingConfig(names) => {
                    for name in names {
                        error!(variable = %name, "missing required environment variable");
                    }
                }
                other => error!(error = %other, "invalid configuration"),
            }
            Err(anyhow::Error::new(e).context("refusing to start"))
        }
    }
}

fn main() -> Result<()> {
    // A missing .env is normal; variables already set take precedence.
    dotenvy::dotenv().ok();

    log::init(&RelayConfig::log_file_from_env());

    let config = load_config()?;

    info!(
        version = VERSION,
        endpoint = %config.endpoint,
        chat_id = %config.telegram_chat_id,
        retry_period_secs = config.retry_period.as_secs(),
        http_timeout_secs = config.http_timeout.as_secs(),
        "starting homework relay"
    );

    let agent = ureq::AgentBuilder::new()
        .user_agent(&format!("homework-relay/{VERSION}"))
        .timeout(config.http_timeout)
        .build();
    let api = PracticumClient::new(agent.clone(), &config.endpoint, &config.practicum_token);
    let bot = TelegramBot::new(agent, &config.telegram_api_url, &config.telegram_token);
    let notifier = Notifier::new(Box::new(bot), &config.telegram_chat_id);

    let start_cursor = chrono::Utc::now().timestamp();
    let mut orchestrator =
        Orchestrator::new(Box::new(api), notifier, start_cursor, config.retry_period);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    ctrlc::set_handler(move || {
        stop_clone.store(true, Ordering::Relaxed);
    })
    .context("failed to install signal handler")?;

    let result = orchestrator.run(&stop);
    info!(result = ?result, cursor = orchestrator.cursor(), "homework relay stopped");

    Ok(())
}

//! `candle-desk`: keeps the dashboard watchlist fresh and forwards
//! decision-engine alerts read from stdin as JSON lines.

use std::sync::Arc;

use candle_desk::LiveDataError;
use candle_desk::config::{DeskConfig, fetch_config};
use candle_desk::credentials::populate_env_from_keychain;
use candle_desk::feed::LiveDataFeed;
use candle_desk::models::{AlertEvent, Timeframe};
use candle_desk::notify::{AlertNotifier, TelegramSink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), LiveDataError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Before the runtime spawns worker threads.
    populate_env_from_keychain();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| LiveDataError::Config(format!("failed to start runtime: {e}")))?
        .block_on(run())
}

async fn run() -> Result<(), LiveDataError> {
    let config = fetch_config()?;
    let feed = LiveDataFeed::from_config(&config)?;

    let notifier = match &config.alerts {
        Some(alerts) => {
            let sink = TelegramSink::new(alerts, &config.tls)?;
            Some(AlertNotifier::new(
                alerts.min_confidence,
                Arc::new(sink),
                alerts.default_chat_id.clone(),
            ))
        }
        None => {
            info!("TELEGRAM_BOT_TOKEN not set; alerts disabled");
            None
        }
    };

    info!(
        watchlist = ?config.desk.watchlist,
        interval = %config.desk.interval,
        period = %config.desk.period,
        "Desk started"
    );

    let mut ticker = tokio::time::interval(config.desk.refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => refresh(&feed, &config.desk).await,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => forward_alert(notifier.as_ref(), &line).await,
                Ok(None) => {
                    debug!("stdin closed; no more alerts");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin; no more alerts");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Refreshes every watchlist symbol and logs its status line.
async fn refresh(feed: &LiveDataFeed, desk: &DeskConfig) {
    let timeframe = Timeframe::from_interval(&desk.interval);
    for symbol in &desk.watchlist {
        // Failures are recorded in the status; nothing to do here.
        let _ = feed.get_ohlc(symbol, &desk.interval, &desk.period).await;
        let status = feed.status(symbol, timeframe).await;
        info!(symbol = %symbol, %timeframe, "{status}");
    }
}

async fn forward_alert(notifier: Option<&AlertNotifier>, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let event: AlertEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed alert line");
            return;
        }
    };
    match notifier {
        Some(notifier) => {
            let outcome = notifier.maybe_notify(&event).await;
            debug!(symbol = %event.symbol, ?outcome, "Alert processed");
        }
        None => debug!(symbol = %event.symbol, "Alerts disabled; dropping event"),
    }
}

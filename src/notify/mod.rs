//! Alert notifier: gates decision-engine events on confidence, formats
//! them and hands them to a [`MessageSink`].
//!
//! Delivery is fire-and-forget. A failed send is logged and reported in
//! the returned [`NotifyOutcome`], never raised to the caller.

pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::Result;
use crate::models::{AlertEvent, canonical_symbol};

pub use telegram::TelegramSink;

/// Outbound messaging channel.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Delivers `text` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Transport`](crate::LiveDataError::Transport)
    /// when the channel does not accept the message.
    async fn send(&self, destination: &str, text: &str) -> Result<()>;
}

/// Result of offering an event to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Confidence under the threshold; nothing was sent.
    BelowThreshold,
    /// The sink rejected the message or no destination was known.
    SendFailed,
}

/// Confidence gate in front of a [`MessageSink`].
pub struct AlertNotifier {
    threshold: f64,
    sink: Arc<dyn MessageSink>,
    default_destination: Option<String>,
}

impl AlertNotifier {
    #[must_use]
    pub fn new(
        threshold: f64,
        sink: Arc<dyn MessageSink>,
        default_destination: Option<String>,
    ) -> Self {
        Self {
            threshold,
            sink,
            default_destination,
        }
    }

    /// Sends `event` if its confidence is at least the threshold.
    pub async fn maybe_notify(&self, event: &AlertEvent) -> NotifyOutcome {
        // Non-finite confidence never passes the gate.
        if !(event.confidence.is_finite() && event.confidence >= self.threshold) {
            debug!(
                symbol = %event.symbol,
                confidence = event.confidence,
                threshold = self.threshold,
                "Alert below threshold"
            );
            return NotifyOutcome::BelowThreshold;
        }

        let destination = if event.destination.is_empty() {
            self.default_destination.as_deref()
        } else {
            Some(event.destination.as_str())
        };
        let Some(destination) = destination else {
            warn!(symbol = %event.symbol, "Alert has no destination and no default is configured");
            return NotifyOutcome::SendFailed;
        };

        let text = format_alert(event);
        match self.sink.send(destination, &text).await {
            Ok(()) => {
                info!(symbol = %event.symbol, action = event.direction.action(), "Alert sent");
                NotifyOutcome::Sent
            }
            Err(e) => {
                warn!(symbol = %event.symbol, error = %e, "Alert delivery failed");
                NotifyOutcome::SendFailed
            }
        }
    }
}

/// Renders an event as Telegram HTML.
///
/// ```text
/// <b>BUY</b> | <b>XAUUSD</b>
/// Confidence: 92%
///
/// Entry: 2345.1
/// ...
/// ```
pub fn format_alert(event: &AlertEvent) -> String {
    let header = format!(
        "<b>{}</b> | <b>{}</b>",
        event.direction.action(),
        escape_html(&canonical_symbol(&event.symbol))
    );
    let sub = format!("Confidence: {:.0}%", event.confidence * 100.0);

    let body = match &event.plan {
        Some(plan) => {
            let mut lines = vec![
                format!("Entry: {}", escape_html(&plan.entry)),
                format!("Stop: {}", escape_html(&plan.stop)),
                format!("TP1: {}", escape_html(&plan.tp1)),
            ];
            if let Some(tp2) = &plan.tp2 {
                lines.push(format!("TP2: {}", escape_html(tp2)));
            }
            if let Some(rr) = &plan.rr {
                lines.push(format!("RR: {}", escape_html(rr)));
            }
            lines.join("\n")
        }
        None => escape_html(&event.message),
    };

    format!("{header}\n{sub}\n\n{body}")
}

/// Escapes the three characters Telegram's HTML mode reserves.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

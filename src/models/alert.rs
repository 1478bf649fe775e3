//! Decision-engine alert events.

use serde::Deserialize;

/// Trade direction proposed by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "buy")]
    Long,
    #[serde(alias = "sell")]
    Short,
}

impl Direction {
    /// Action label used in alert headers.
    pub fn action(&self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }
}

/// Entry, stop and targets attached to an actionable decision.
///
/// Levels are kept as the engine formatted them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradePlan {
    pub entry: String,
    pub stop: String,
    pub tp1: String,
    #[serde(default)]
    pub tp2: Option<String>,
    #[serde(default)]
    pub rr: Option<String>,
}

/// A decision-engine output offered to the notifier. Consumed once.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertEvent {
    pub symbol: String,
    pub direction: Direction,
    /// Engine confidence in `[0, 1]`.
    pub confidence: f64,
    pub message: String,
    /// Messaging destination (chat id). Empty means the notifier's default.
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub plan: Option<TradePlan>,
}

//! Candle timeframes and dashboard period helpers.

use std::fmt;

/// Fewest bars requested for any period.
const MIN_BARS: u32 = 120;

/// Most bars requested for any period.
const MAX_BARS: u32 = 5000;

/// Bar duration supported by both candle sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
    ];

    /// Wire name sent to the bridge and the SDK (`"M15"`, `"H1"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
        }
    }

    /// Bar length in minutes.
    pub fn minutes(&self) -> i64 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1440,
        }
    }

    /// Parses a wire name such as `"M15"`.
    pub fn from_wire(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|tf| tf.as_str() == upper)
    }

    /// Maps a dashboard interval (`"1m"`, `"15m"`, `"4h"`, `"1d"`) or a
    /// wire name to a timeframe. Unknown intervals fall back to `M15`.
    pub fn from_interval(interval: &str) -> Self {
        match interval.trim() {
            "1m" => Self::M1,
            "5m" => Self::M5,
            "15m" => Self::M15,
            "30m" => Self::M30,
            "1h" => Self::H1,
            "4h" => Self::H4,
            "1d" => Self::D1,
            other => Self::from_wire(other).unwrap_or(Self::M15),
        }
    }

    /// Number of bars covering `period` (`"5d"`, `"2w"`, `"1m"` for a
    /// 30-day month), clamped to `[120, 5000]`.
    ///
    /// Unparsable periods are treated as five days.
    pub fn bars_for_period(&self, period: &str) -> u32 {
        let period = period.trim().to_ascii_lowercase();
        let minutes = match period.char_indices().last() {
            Some((idx, unit)) => {
                let value: i64 = period[..idx].parse().unwrap_or(5);
                match unit {
                    'd' => value.saturating_mul(24 * 60),
                    'w' => value.saturating_mul(7 * 24 * 60),
                    'm' => value.saturating_mul(30 * 24 * 60),
                    _ => 5 * 24 * 60,
                }
            }
            None => 5 * 24 * 60,
        };

        let bars = (minutes / self.minutes()).max(0);
        bars.clamp(MIN_BARS as i64, MAX_BARS as i64) as u32
    }

    /// Oldest acceptable age of the newest bar: three bars, at least ten minutes.
    pub fn max_lag_minutes(&self) -> i64 {
        (3 * self.minutes()).max(10)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

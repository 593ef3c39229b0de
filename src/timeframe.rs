use crate::errors::BriefError;
use chrono::Duration;
use std::fmt;
use std::str::FromStr;

/// A labeled report cadence such as `10m`, `1h` or `24h`.
///
/// The label selects the retention policy and which previous summary a new
/// report chains context from; the duration drives the fetch-window cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timeframe {
    label: String,
    minutes: i64,
}

impl Timeframe {
    pub fn from_minutes(minutes: i64) -> Self {
        let label = if minutes % 60 == 0 {
            format!("{}h", minutes / 60)
        } else {
            format!("{}m", minutes)
        };
        Self { label, minutes }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes)
    }
}

impl FromStr for Timeframe {
    type Err = BriefError;

    /// Parses `<N>m` (minutes) or `<N>h` (hours).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || {
            BriefError::Config(format!(
                "invalid timeframe '{s}': use 'm' for minutes or 'h' for hours (e.g. 10m, 1h, 24h)"
            ))
        };

        let Some((unit_at, unit)) = s.char_indices().last() else {
            return Err(invalid());
        };
        let amount: i64 = s[..unit_at].parse().map_err(|_| invalid())?;
        if amount <= 0 {
            return Err(invalid());
        }

        let minutes = match unit {
            'm' => amount,
            'h' => amount * 60,
            _ => return Err(invalid()),
        };

        Ok(Self {
            label: s.to_string(),
            minutes,
        })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

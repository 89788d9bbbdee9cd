use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Bucket width for historical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryInterval {
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "4hour")]
    FourHours,
}

impl HistoryInterval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1hour",
            Self::FourHours => "4hour",
        }
    }

    pub const fn width_ms(self) -> i64 {
        match self {
            Self::OneHour => 3_600_000,
            Self::FourHours => 4 * 3_600_000,
        }
    }
}

impl Display for HistoryInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryInterval {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1hour" | "1h" => Ok(Self::OneHour),
            "4hour" | "4h" => Ok(Self::FourHours),
            other => Err(ValidationError::InvalidInterval {
                value: other.to_owned(),
            }),
        }
    }
}

/// Observation window for history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub interval: HistoryInterval,
    pub lookback_hours: u32,
}

impl HistoryWindow {
    pub fn new(interval: HistoryInterval, lookback_hours: u32) -> Result<Self, ValidationError> {
        if i64::from(lookback_hours) * 3_600_000 < interval.width_ms() {
            return Err(ValidationError::LookbackTooShort);
        }
        Ok(Self {
            interval,
            lookback_hours,
        })
    }

    /// 24 hours at hourly resolution.
    pub const fn day() -> Self {
        Self {
            interval: HistoryInterval::OneHour,
            lookback_hours: 24,
        }
    }

    /// 5 days at 4-hour resolution.
    pub const fn five_days() -> Self {
        Self {
            interval: HistoryInterval::FourHours,
            lookback_hours: 120,
        }
    }

    pub const fn lookback_ms(self) -> i64 {
        self.lookback_hours as i64 * 3_600_000
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::day()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interval_aliases() {
        assert_eq!(HistoryInterval::from_str("4hour").expect("must parse"), HistoryInterval::FourHours);
        assert_eq!(HistoryInterval::from_str("1H").expect("must parse"), HistoryInterval::OneHour);
        assert!(matches!(
            HistoryInterval::from_str("1day"),
            Err(ValidationError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn rejects_window_shorter_than_one_bucket() {
        let err = HistoryWindow::new(HistoryInterval::FourHours, 2).expect_err("must fail");
        assert_eq!(err, ValidationError::LookbackTooShort);
        assert_eq!(HistoryWindow::five_days().lookback_ms(), 120 * 3_600_000);
    }
}

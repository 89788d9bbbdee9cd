use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream data sources merged into a snapshot.
///
/// Declaration order is merge precedence: when two sources report the same
/// exchange, the earlier variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Coinalyze,
    Hyperliquid,
    Coingecko,
}

impl SourceTag {
    pub const ALL: [Self; 3] = [Self::Coinalyze, Self::Hyperliquid, Self::Coingecko];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coinalyze => "coinalyze",
            Self::Hyperliquid => "hyperliquid",
            Self::Coingecko => "coingecko",
        }
    }

    /// Lower rank wins during exchange deduplication.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Coinalyze => 0,
            Self::Hyperliquid => 1,
            Self::Coingecko => 2,
        }
    }
}

impl Display for SourceTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coinalyze" => Ok(Self::Coinalyze),
            "hyperliquid" => Ok(Self::Hyperliquid),
            "coingecko" => Ok(Self::Coingecko),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Base assets tracked by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Eth,
}

impl Asset {
    pub const ALL: [Self; 2] = [Self::Btc, Self::Eth];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
        }
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Asset {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Self::Btc),
            "ETH" => Ok(Self::Eth),
            _ => Err(ValidationError::InvalidAsset {
                value: value.trim().to_owned(),
            }),
        }
    }
}

/// One value per tracked asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMap<T> {
    pub btc: T,
    pub eth: T,
}

impl<T> AssetMap<T> {
    pub fn from_fn(mut build: impl FnMut(Asset) -> T) -> Self {
        Self {
            btc: build(Asset::Btc),
            eth: build(Asset::Eth),
        }
    }

    pub fn get(&self, asset: Asset) -> &T {
        match asset {
            Asset::Btc => &self.btc,
            Asset::Eth => &self.eth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coin_case_insensitively() {
        assert_eq!(Asset::from_str("btc").expect("must parse"), Asset::Btc);
        assert_eq!(Asset::from_str(" Eth ").expect("must parse"), Asset::Eth);
    }

    #[test]
    fn rejects_unknown_coin() {
        let err = Asset::from_str("SOL").expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::InvalidAsset {
                value: String::from("SOL")
            }
        );
    }
}

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Exchange-qualified perpetual contract identifier, e.g. `BTCUSDT_PERP.A`.
///
/// The suffix after the last `.` is the aggregator's exchange code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyInstrument);
        }

        match trimmed.rsplit_once('.') {
            Some((contract, code)) if !contract.is_empty() && !code.is_empty() => {
                Ok(Self(trimmed.to_ascii_uppercase()))
            }
            _ => Err(ValidationError::MissingExchangeCode {
                value: trimmed.to_owned(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn exchange_code(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, code)| code).unwrap_or("")
    }

    pub fn contract(&self) -> &str {
        self.0.rsplit_once('.').map(|(contract, _)| contract).unwrap_or(&self.0)
    }

    /// True when the contract part names a USDT-margined perpetual.
    pub fn is_usdt_perpetual(&self) -> bool {
        self.contract().contains("USDT")
    }
}

impl Display for InstrumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for InstrumentId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for InstrumentId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<InstrumentId> for String {
    fn from(value: InstrumentId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_contract_and_exchange_code() {
        let id = InstrumentId::parse("btcusdt_perp.a").expect("must parse");
        assert_eq!(id.as_str(), "BTCUSDT_PERP.A");
        assert_eq!(id.contract(), "BTCUSDT_PERP");
        assert_eq!(id.exchange_code(), "A");
        assert!(id.is_usdt_perpetual());
    }

    #[test]
    fn coin_margined_contract_is_not_usdt() {
        let id = InstrumentId::parse("BTCUSD_PERP.A").expect("must parse");
        assert!(!id.is_usdt_perpetual());
    }

    #[test]
    fn rejects_symbol_without_exchange_code() {
        let err = InstrumentId::parse("BTCUSDT").expect_err("must fail");
        assert!(matches!(err, ValidationError::MissingExchangeCode { .. }));
        assert_eq!(InstrumentId::parse("  "), Err(ValidationError::EmptyInstrument));
    }
}

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Unix timestamp normalised to milliseconds.
///
/// Sources report seconds or milliseconds; adapters convert through
/// [`Timestamp::from_secs`] or [`Timestamp::from_millis`] so every series
/// shares one unit. Serializes as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self((nanos / 1_000_000) as i64)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub const fn as_secs(self) -> i64 {
        self.0.div_euclid(1_000)
    }

    /// Start of the bucket of `width_ms` containing this instant.
    pub const fn floor_to(self, width_ms: i64) -> Self {
        if width_ms <= 0 {
            return self;
        }
        Self(self.0 - self.0.rem_euclid(width_ms))
    }

    pub const fn saturating_sub_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_sub(millis))
    }

    pub fn format_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .and_then(|value| value.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_and_millis_share_one_unit() {
        assert_eq!(Timestamp::from_secs(1_700_000_000), Timestamp::from_millis(1_700_000_000_000));
    }

    #[test]
    fn floors_to_bucket_start() {
        let ts = Timestamp::from_millis(7_200_000 + 1_234);
        assert_eq!(ts.floor_to(3_600_000).as_millis(), 7_200_000);
        assert_eq!(ts.floor_to(0), ts);
    }

    #[test]
    fn formats_rfc3339() {
        assert_eq!(Timestamp::from_secs(0).format_rfc3339(), "1970-01-01T00:00:00Z");
    }
}

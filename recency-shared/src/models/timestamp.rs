use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Fractional-second digits a summary store keeps (Postgres `timestamptz`
/// stores microseconds).
pub const STORAGE_SUBSEC_DIGITS: u16 = 6;

/// A UTC instant. Serialized as RFC 3339 and totally ordered, so it can be
/// used directly as a sort key.
///
/// Instants entering through deserialization, [`Timestamp::now`] or
/// [`From<DateTime<Utc>>`] are truncated to microseconds, so a value read
/// back from storage compares equal to the one that was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ToSchema)]
pub struct Timestamp(pub DateTime<Utc>);

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        DateTime::<Utc>::deserialize(deserializer).map(Self::from)
    }
}

impl Timestamp {
    /// Samples the system clock.
    #[must_use]
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// This instant truncated to the precision of the summary store.
    #[must_use]
    pub fn at_storage_precision(self) -> Self {
        Self(self.0.trunc_subsecs(STORAGE_SUBSEC_DIGITS))
    }

    /// Returns this instant shifted by `millis` milliseconds (negative values move backwards).
    #[must_use]
    pub fn plus_millis(self, millis: i64) -> Self {
        Self(self.0 + chrono::Duration::milliseconds(millis))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value).at_storage_precision()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }
}

//! Timestamp normalization.
//!
//! All dates handled by the store are normalized to a single UTC instant at
//! second resolution: comparisons, equality and ordered-map keys all use the
//! normalized value, so two timestamps that differ only in sub-second
//! precision collapse to the same key.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};

/// A UTC instant truncated to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Default for Timestamp {
    /// The Unix epoch — only meaningful as the placeholder `Event::default()`
    /// needs for its `date` field; never compared against in practice since
    /// every real `Event` is constructed with an explicit date.
    fn default() -> Self {
        Self(Utc.timestamp_opt(0, 0).single().expect("epoch is a valid UTC instant"))
    }
}

impl Timestamp {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self(date.trunc_subsecs(0))
    }

    /// One second after this timestamp — used by the `increment` duplicate
    /// policy to find the next free slot.
    pub fn plus_one_second(self) -> Self {
        Self(self.0 + chrono::Duration::seconds(1))
    }

    pub fn inner(self) -> DateTime<Utc> {
        self.0
    }

    /// Parses any reasonably-shaped timestamp: RFC 3339, or a naive
    /// `YYYY-MM-DD[ HH:MM:SS]` pair interpreted as UTC. This is the permissive
    /// "any parseable timestamp" surface the tabular ingestion helper relies
    /// on (`spec.md` §6).
    pub fn parse(input: &str) -> Option<Self> {
        if let Ok(date) = DateTime::parse_from_rfc3339(input) {
            return Some(Self::new(date.with_timezone(&Utc)));
        }
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
            return Some(Self::new(Utc.from_utc_datetime(&naive)));
        }
        if let Ok(naive) = chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            let naive = naive.and_hms_opt(0, 0, 0)?;
            return Some(Self::new(Utc.from_utc_datetime(&naive)));
        }
        None
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(date: DateTime<Utc>) -> Self {
        Self::new(date)
    }
}

impl Timestamp {
    /// Interprets a raw ingested value as a timestamp: an RFC 3339/plain
    /// date string, or an epoch-seconds number (`spec.md` §6 "Times may be
    /// any parseable timestamp").
    pub fn from_value(value: &crate::dtype::Value) -> Option<Self> {
        use crate::dtype::Value;
        match value {
            Value::Str(s) => Self::parse(s),
            Value::Int(secs) => Utc.timestamp_opt(*secs, 0).single().map(Self::new),
            Value::Float(secs) => Utc.timestamp_opt(*secs as i64, 0).single().map(Self::new),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_second_resolution() {
        let a = Timestamp::new(Utc.with_ymd_and_hms(2020, 12, 10, 1, 2, 3).unwrap());
        let b = Timestamp::new(
            Utc.with_ymd_and_hms(2020, 12, 10, 1, 2, 3)
                .unwrap()
                .checked_add_signed(chrono::Duration::milliseconds(500))
                .unwrap(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn parses_date_only() {
        let a = Timestamp::parse("2020-12-10").unwrap();
        let b = Timestamp::new(Utc.with_ymd_and_hms(2020, 12, 10, 0, 0, 0).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn increment_adds_one_second() {
        let a = Timestamp::new(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let b = a.plus_one_second();
        assert_eq!(b.inner() - a.inner(), chrono::Duration::seconds(1));
    }
}

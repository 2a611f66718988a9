//! Event types shared across the engine.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One schedule entry as delivered by the ENT scraping layer.
///
/// All fields are raw strings straight out of the portal export;
/// interpretation happens in the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub title: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Deterministic fingerprint identifying "the same session" across runs.
///
/// Computed from the course label and the normalized start time only, so a
/// room or title fix upstream keeps the same key. The key is the sole join
/// channel between source events and calendar entries; calendar-assigned
/// ids never participate in matching.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncKey(String);

impl SyncKey {
    pub fn new(course: &str, start: DateTime<Utc>) -> Self {
        // Case and whitespace folding so cosmetic label edits don't change identity
        let folded = course
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        SyncKey(format!(
            "{}|{}",
            folded,
            start.to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }

    /// Rebuild a key from the tag value stored on an existing calendar entry.
    pub fn from_tag(tag: &str) -> Self {
        SyncKey(tag.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized schedule event, ready for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub key: SyncKey,
    /// Course/group label the key is derived from.
    pub course: String,
    /// Display title (whitespace-trimmed, original casing).
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// An existing calendar event previously created by this engine.
///
/// Entries without a key tag are foreign (manual or third-party) and must
/// never reach the matcher.
#[derive(Debug, Clone)]
pub struct CalendarEntry {
    /// Opaque id assigned by the calendar provider.
    pub id: String,
    pub key: SyncKey,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
}

impl CalendarEntry {
    /// True when every mutable display field matches the canonical event.
    pub fn matches(&self, event: &CanonicalEvent) -> bool {
        self.title == event.title
            && self.start == event.start
            && self.end == event.end
            && self.location == event.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sync_key_folds_case_and_whitespace() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let a = SyncKey::new("Math101", start);
        let b = SyncKey::new("  MATH101 ", start);
        assert_eq!(a, b, "cosmetic label differences must not change identity");
    }

    #[test]
    fn sync_key_distinguishes_sessions() {
        let a = SyncKey::new("Math101", Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap());
        let b = SyncKey::new("Math101", Utc.with_ymd_and_hms(2024, 3, 4, 11, 0, 0).unwrap());
        let c = SyncKey::new("Physics201", Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap());
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sync_key_round_trips_through_tag() {
        let key = SyncKey::new("Math101", Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap());
        assert_eq!(SyncKey::from_tag(key.as_str()), key);
    }
}

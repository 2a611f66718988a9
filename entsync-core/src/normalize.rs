//! Normalization of raw scraped records into canonical events.
//!
//! This is a pure transform: no I/O, no clock. Records missing a parsable
//! start time or a non-empty title are skipped and counted, never merged
//! into a neighboring event.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::event::{CanonicalEvent, RawRecord, SyncKey};

/// Output of one normalization pass.
pub struct NormalizedBatch {
    pub events: Vec<CanonicalEvent>,
    /// Records dropped for missing/unparsable required fields.
    pub malformed_skipped: usize,
}

/// Normalize a batch of scraped records.
///
/// `tz` is the timezone naive portal timestamps are interpreted in
/// (the ENT publishes floating local times).
pub fn normalize_records(records: &[RawRecord], tz: Tz) -> NormalizedBatch {
    let mut events = Vec::with_capacity(records.len());
    let mut malformed_skipped = 0;

    for record in records {
        match normalize_record(record, tz) {
            Ok(event) => events.push(event),
            Err(err) => {
                warn!(%err, "skipping malformed schedule record");
                malformed_skipped += 1;
            }
        }
    }

    NormalizedBatch {
        events,
        malformed_skipped,
    }
}

/// Normalize one record, failing with `MalformedRecord` when the title or
/// start time is absent or unparsable.
pub fn normalize_record(record: &RawRecord, tz: Tz) -> SyncResult<CanonicalEvent> {
    let title = record
        .title
        .as_deref()
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SyncError::MalformedRecord("missing title".to_string()))?;

    let start_raw = record
        .start
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::MalformedRecord(format!("'{}': missing start time", title)))?;

    let start = parse_timestamp(start_raw, tz).ok_or_else(|| {
        SyncError::MalformedRecord(format!("'{}': unparsable start time '{}'", title, start_raw))
    })?;

    // End is not a required field; a session without one gets a nominal hour.
    let end = record
        .end
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| parse_timestamp(s, tz))
        .unwrap_or(start + Duration::hours(1));

    let location = record
        .location
        .as_deref()
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty());

    let description = record
        .description
        .as_deref()
        .map(collapse_whitespace)
        .filter(|d| !d.is_empty());

    // The course label is the title as published; the key folds it further
    // so display fixes upstream don't invalidate identity.
    let course = title.clone();
    let key = SyncKey::new(&course, start);

    Ok(CanonicalEvent {
        key,
        course,
        title,
        start,
        end,
        location,
        description,
    })
}

/// Parse the timestamp shapes the portal export is known to emit.
///
/// Accepts RFC 3339, iCal basic format (`20240304T090000Z` /
/// `20240304T090000`), and `YYYY-MM-DDTHH:MM[:SS]`. Naive values are
/// interpreted in `tz`.
fn parse_timestamp(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%SZ") {
        return Some(naive.and_utc());
    }

    for format in ["%Y%m%dT%H%M%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    None
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Calendar collaborator seam.
//!
//! The engine never talks to a calendar API directly; it goes through
//! `CalendarStore`, which the CLI implements against Google Calendar and
//! the tests implement in memory.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::event::{CalendarEntry, CanonicalEvent};

/// Time window a snapshot read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SnapshotWindow {
    /// Window covering at least `now .. now + horizon` plus the full span
    /// of the source events, padded by a day on each side.
    ///
    /// The horizon keeps orphan deletion working when the source shrinks
    /// (or comes back empty): previously-synced future entries still fall
    /// inside the read and get cleaned up, while past entries are left
    /// alone.
    pub fn covering(events: &[CanonicalEvent], now: DateTime<Utc>, horizon_days: i64) -> Self {
        let mut from = now;
        let mut to = now + Duration::days(horizon_days);

        for event in events {
            from = from.min(event.start);
            to = to.max(event.end);
        }

        SnapshotWindow {
            from: from - Duration::days(1),
            to: to + Duration::days(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }
}

/// CRUD surface of the external calendar, restricted to entries this
/// engine owns.
#[async_trait]
pub trait CalendarStore {
    /// List every entry carrying this engine's tag inside the window.
    ///
    /// Implementations must paginate until exhaustion and must never
    /// return foreign (untagged) events. A failed read surfaces as
    /// `StoreError::Unavailable`; it is never an empty list.
    async fn list_tagged(&self, window: SnapshotWindow) -> Result<Vec<CalendarEntry>, StoreError>;

    /// Create an entry for the event, stamping its sync key tag before
    /// submission. Returns the provider-assigned event id.
    async fn create(&self, event: &CanonicalEvent) -> Result<String, StoreError>;

    /// Rewrite the mutable display fields of an existing entry. The sync
    /// key tag is left untouched.
    async fn update(&self, event_id: &str, event: &CanonicalEvent) -> Result<(), StoreError>;

    /// Delete an entry by provider-assigned id.
    async fn delete(&self, event_id: &str) -> Result<(), StoreError>;
}

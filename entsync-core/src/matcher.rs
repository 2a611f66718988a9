//! Identity matching between source events and existing calendar entries.
//!
//! The sync key is the sole join channel between the two universes; the
//! matcher never looks at calendar-assigned ids, title text, or position.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::event::{CalendarEntry, CanonicalEvent, SyncKey};

/// Classification of one sync key across both universes.
#[derive(Debug, Clone)]
pub enum MatchResult {
    /// Entry exists and every mutable field matches the source.
    Unchanged(CalendarEntry),
    /// Entry exists but at least one mutable field differs.
    Changed {
        entry: CalendarEntry,
        event: CanonicalEvent,
    },
    /// Source event with no existing entry.
    New(CanonicalEvent),
    /// Tagged entry whose session no longer appears in the source.
    Orphaned(CalendarEntry),
}

/// Result of matching: one `MatchResult` per key in the union of both
/// inputs, plus any duplicate tagged entries slated for deletion.
pub struct Matches {
    pub results: BTreeMap<SyncKey, MatchResult>,
    /// Extra entries sharing an already-seen key (prior bug or manual
    /// duplication). Deleting them lets duplicates self-heal over runs
    /// instead of accumulating.
    pub duplicate_entries: Vec<CalendarEntry>,
}

/// Pair source events with existing tagged entries by sync key.
///
/// `entries` must already be filtered to tagged entries (the snapshot
/// reader guarantees this); listing order decides which of several
/// duplicate entries is kept for matching.
pub fn match_events(events: &[CanonicalEvent], entries: Vec<CalendarEntry>) -> Matches {
    let mut by_key: HashMap<SyncKey, CalendarEntry> = HashMap::new();
    let mut duplicate_entries = Vec::new();

    for entry in entries {
        if by_key.contains_key(&entry.key) {
            warn!(key = %entry.key, id = %entry.id, "duplicate tagged entry, scheduling removal");
            duplicate_entries.push(entry);
        } else {
            by_key.insert(entry.key.clone(), entry);
        }
    }

    let mut results: BTreeMap<SyncKey, MatchResult> = BTreeMap::new();

    for event in events {
        if results.contains_key(&event.key) {
            // The source itself listed the same session twice; the first
            // occurrence already owns the key.
            warn!(key = %event.key, "duplicate source event, ignoring repeat");
            continue;
        }

        let result = match by_key.remove(&event.key) {
            Some(entry) if entry.matches(event) => MatchResult::Unchanged(entry),
            Some(entry) => MatchResult::Changed {
                entry,
                event: event.clone(),
            },
            None => MatchResult::New(event.clone()),
        };
        results.insert(event.key.clone(), result);
    }

    // Whatever is left carries a key absent from this run's source:
    // the session was cancelled or rescheduled.
    for (key, entry) in by_key {
        results.insert(key, MatchResult::Orphaned(entry));
    }

    Matches {
        results,
        duplicate_entries,
    }
}

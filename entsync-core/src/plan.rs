//! Turning match results into an ordered list of calendar operations.

use crate::event::CanonicalEvent;
use crate::matcher::{MatchResult, Matches};

/// One operation to issue against the calendar collaborator.
#[derive(Debug, Clone)]
pub enum Intent {
    Create(CanonicalEvent),
    Update {
        event_id: String,
        event: CanonicalEvent,
    },
    Delete {
        event_id: String,
    },
}

/// An ordered reconciliation plan.
///
/// Ordering policy: deletes before creates before updates. Deleting
/// orphans first bounds the calendar's transient size and closes the
/// window where a stale and a fresh entry for a replaced session coexist.
#[derive(Debug, Default)]
pub struct Plan {
    pub intents: Vec<Intent>,
    /// Number of the deletes that remove duplicate tagged entries
    /// (reported separately from ordinary orphans).
    pub duplicate_deletes: usize,
}

impl Plan {
    /// An empty plan means the calendar already matches the source.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Build the plan for a set of match results.
///
/// Unchanged entries generate no intent, so a re-run against an
/// already-synced calendar produces an empty plan.
pub fn build_plan(matches: &Matches) -> Plan {
    let mut deletes = Vec::new();
    let mut creates = Vec::new();
    let mut updates = Vec::new();

    for entry in &matches.duplicate_entries {
        deletes.push(Intent::Delete {
            event_id: entry.id.clone(),
        });
    }
    let duplicate_deletes = deletes.len();

    for result in matches.results.values() {
        match result {
            MatchResult::Unchanged(_) => {}
            MatchResult::Orphaned(entry) => deletes.push(Intent::Delete {
                event_id: entry.id.clone(),
            }),
            MatchResult::New(event) => creates.push(Intent::Create(event.clone())),
            MatchResult::Changed { entry, event } => updates.push(Intent::Update {
                event_id: entry.id.clone(),
                event: event.clone(),
            }),
        }
    }

    let mut intents = deletes;
    intents.extend(creates);
    intents.extend(updates);

    Plan {
        intents,
        duplicate_deletes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CalendarEntry, SyncKey};
    use crate::matcher::match_events;
    use chrono::{Duration, TimeZone, Utc};

    fn canonical(course: &str, hour: u32, location: &str) -> CanonicalEvent {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap();
        CanonicalEvent {
            key: SyncKey::new(course, start),
            course: course.to_string(),
            title: course.to_string(),
            start,
            end: start + Duration::hours(1),
            location: Some(location.to_string()),
            description: None,
        }
    }

    fn entry_for(event: &CanonicalEvent, id: &str) -> CalendarEntry {
        CalendarEntry {
            id: id.to_string(),
            key: event.key.clone(),
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            location: event.location.clone(),
        }
    }

    fn rank(intent: &Intent) -> u8 {
        match intent {
            Intent::Delete { .. } => 0,
            Intent::Create(_) => 1,
            Intent::Update { .. } => 2,
        }
    }

    #[test]
    fn empty_calendar_plans_a_create() {
        let event = canonical("Math101", 9, "Room A");
        let plan = build_plan(&match_events(std::slice::from_ref(&event), vec![]));

        assert_eq!(plan.intents.len(), 1);
        match &plan.intents[0] {
            Intent::Create(e) => {
                assert_eq!(e.title, "Math101");
                assert_eq!(e.location.as_deref(), Some("Room A"));
            }
            other => panic!("expected Create, got {:?}", other),
        }
    }

    #[test]
    fn synced_calendar_plans_nothing() {
        let event = canonical("Math101", 9, "Room A");
        let entry = entry_for(&event, "gcal-1");
        let plan = build_plan(&match_events(std::slice::from_ref(&event), vec![entry]));

        assert!(plan.is_empty(), "unchanged entries must generate no intent");
    }

    #[test]
    fn changed_location_plans_an_update_against_the_existing_id() {
        let event = canonical("Math101", 9, "Room B");
        let mut entry = entry_for(&event, "gcal-1");
        entry.location = Some("Room A".to_string());

        let plan = build_plan(&match_events(std::slice::from_ref(&event), vec![entry]));

        assert_eq!(plan.intents.len(), 1);
        match &plan.intents[0] {
            Intent::Update { event_id, event } => {
                assert_eq!(event_id, "gcal-1");
                assert_eq!(event.location.as_deref(), Some("Room B"));
            }
            other => panic!("expected Update, got {:?}", other),
        }
    }

    #[test]
    fn vanished_session_plans_a_delete() {
        let gone = canonical("Math101", 9, "Room A");
        let entry = entry_for(&gone, "gcal-1");

        let plan = build_plan(&match_events(&[], vec![entry]));

        assert_eq!(plan.intents.len(), 1);
        assert!(matches!(
            &plan.intents[0],
            Intent::Delete { event_id } if event_id == "gcal-1"
        ));
    }

    #[test]
    fn deletes_precede_creates_precede_updates() {
        let kept = canonical("Math101", 9, "Room B");
        let mut kept_entry = entry_for(&kept, "gcal-1");
        kept_entry.location = Some("Room A".to_string());

        let fresh = canonical("Physics201", 11, "Room C");

        let gone = canonical("Chem301", 14, "Room D");
        let gone_entry = entry_for(&gone, "gcal-2");

        let plan = build_plan(&match_events(
            &[kept, fresh],
            vec![kept_entry, gone_entry],
        ));

        let ranks: Vec<u8> = plan.intents.iter().map(rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        assert_eq!(ranks, sorted, "plan order must be delete < create < update");
        assert_eq!(plan.intents.len(), 3);
    }

    #[test]
    fn duplicate_entries_get_exactly_one_delete_each() {
        let event = canonical("Math101", 9, "Room A");
        let first = entry_for(&event, "gcal-1");
        let second = entry_for(&event, "gcal-2");

        let plan = build_plan(&match_events(
            std::slice::from_ref(&event),
            vec![first, second],
        ));

        assert_eq!(plan.duplicate_deletes, 1);
        assert_eq!(plan.intents.len(), 1);
        assert!(
            matches!(&plan.intents[0], Intent::Delete { event_id } if event_id == "gcal-2"),
            "the extra entry is deleted, the kept one is untouched"
        );
    }
}

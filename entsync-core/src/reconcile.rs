//! One full reconciliation run: snapshot read, match, plan, apply.
//!
//! Everything here is recomputed from scratch each run; the only durable
//! state is the sync key tag living inside each calendar entry.

use std::fmt;

use chrono::Utc;
use tracing::info;

use crate::apply::apply_plan;
use crate::error::{SyncError, SyncResult};
use crate::matcher::match_events;
use crate::normalize::NormalizedBatch;
use crate::plan::{build_plan, Plan};
use crate::store::{CalendarStore, SnapshotWindow};

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// How far past `now` the snapshot read always extends, so orphans
    /// keep getting cleaned up even when the source shrinks.
    pub horizon_days: i64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions { horizon_days: 60 }
    }
}

/// What one run did, reported to the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub orphaned_duplicates_removed: usize,
    pub failed: usize,
    pub malformed_records_skipped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted",
            self.created, self.updated, self.deleted
        )?;
        if self.orphaned_duplicates_removed > 0 {
            write!(f, ", {} duplicates removed", self.orphaned_duplicates_removed)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.malformed_records_skipped > 0 {
            write!(f, ", {} malformed records skipped", self.malformed_records_skipped)?;
        }
        Ok(())
    }
}

/// Compute the plan for the current source set without applying it.
///
/// The snapshot read happens here; a failed read aborts with
/// `CalendarUnavailable` before anything could be mutated.
pub async fn compute_plan<S: CalendarStore + ?Sized>(
    store: &S,
    batch: &NormalizedBatch,
    options: &ReconcileOptions,
) -> SyncResult<Plan> {
    let window = SnapshotWindow::covering(&batch.events, Utc::now(), options.horizon_days);

    let entries = store
        .list_tagged(window)
        .await
        .map_err(|err| SyncError::CalendarUnavailable(err.to_string()))?;

    info!(
        source_events = batch.events.len(),
        existing_entries = entries.len(),
        "computing reconciliation plan"
    );

    let matches = match_events(&batch.events, entries);
    Ok(build_plan(&matches))
}

/// Run the full engine: read, match, plan, apply, summarize.
pub async fn reconcile<S: CalendarStore + ?Sized>(
    store: &S,
    batch: &NormalizedBatch,
    options: &ReconcileOptions,
) -> SyncResult<RunSummary> {
    let plan = compute_plan(store, batch, options).await?;

    let mut summary = RunSummary {
        malformed_records_skipped: batch.malformed_skipped,
        ..RunSummary::default()
    };

    if plan.is_empty() {
        info!("calendar already in sync");
        return Ok(summary);
    }

    let report = apply_plan(store, &plan).await;

    // Duplicate deletes sit at the head of the plan; count how many of
    // them actually went through so they can be reported separately.
    summary.orphaned_duplicates_removed = report
        .outcomes
        .iter()
        .take(plan.duplicate_deletes)
        .filter(|o| o.is_applied())
        .count();

    summary.created = report.created;
    summary.updated = report.updated;
    summary.deleted = report.deleted - summary.orphaned_duplicates_removed;
    summary.failed = report.failed;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::event::{CalendarEntry, CanonicalEvent, SyncKey};
    use crate::normalize::NormalizedBatch;
    use crate::plan::Intent;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    /// In-memory calendar: tagged entries plus foreign events the engine
    /// must never touch.
    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<Vec<CalendarEntry>>,
        foreign_ids: Vec<String>,
        unavailable: bool,
        next_id: Mutex<u32>,
    }

    impl MemoryStore {
        fn with_entries(entries: Vec<CalendarEntry>) -> Self {
            MemoryStore {
                entries: Mutex::new(entries),
                ..MemoryStore::default()
            }
        }
    }

    #[async_trait]
    impl CalendarStore for MemoryStore {
        async fn list_tagged(
            &self,
            window: crate::store::SnapshotWindow,
        ) -> Result<Vec<CalendarEntry>, StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| window.contains(e.start))
                .cloned()
                .collect())
        }

        async fn create(&self, event: &CanonicalEvent) -> Result<String, StoreError> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let id = format!("mem-{}", *next);
            self.entries.lock().unwrap().push(CalendarEntry {
                id: id.clone(),
                key: event.key.clone(),
                title: event.title.clone(),
                start: event.start,
                end: event.end,
                location: event.location.clone(),
            });
            Ok(id)
        }

        async fn update(&self, event_id: &str, event: &CanonicalEvent) -> Result<(), StoreError> {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries
                .iter_mut()
                .find(|e| e.id == event_id)
                .ok_or_else(|| StoreError::Rejected(format!("no such event {}", event_id)))?;
            entry.title = event.title.clone();
            entry.start = event.start;
            entry.end = event.end;
            entry.location = event.location.clone();
            Ok(())
        }

        async fn delete(&self, event_id: &str) -> Result<(), StoreError> {
            if self.foreign_ids.iter().any(|f| f == event_id) {
                panic!("engine tried to delete a foreign event");
            }
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|e| e.id != event_id);
            if entries.len() == before {
                return Err(StoreError::Rejected(format!("no such event {}", event_id)));
            }
            Ok(())
        }
    }

    fn upcoming(course: &str, days_ahead: i64, location: &str) -> CanonicalEvent {
        let start = (Utc::now() + Duration::days(days_ahead))
            .date_naive()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();
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

    fn batch(events: Vec<CanonicalEvent>) -> NormalizedBatch {
        NormalizedBatch {
            events,
            malformed_skipped: 0,
        }
    }

    #[tokio::test]
    async fn first_run_creates_then_second_run_is_empty() {
        let store = MemoryStore::default();
        let source = batch(vec![
            upcoming("Math101", 2, "Room A"),
            upcoming("Physics201", 3, "Room B"),
        ]);
        let options = ReconcileOptions::default();

        let first = reconcile(&store, &source, &options).await.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.failed, 0);

        // Idempotence: an unchanged source against the now-synced calendar
        // must produce an empty plan.
        let plan = compute_plan(&store, &source, &options).await.unwrap();
        assert!(plan.is_empty(), "second run must plan nothing, got {:?}", plan.intents);

        let second = reconcile(&store, &source, &options).await.unwrap();
        assert_eq!(second, RunSummary::default());
    }

    #[tokio::test]
    async fn room_change_updates_in_place() {
        let store = MemoryStore::default();
        let options = ReconcileOptions::default();

        let before = batch(vec![upcoming("Math101", 2, "Room A")]);
        reconcile(&store, &before, &options).await.unwrap();

        let after = batch(vec![upcoming("Math101", 2, "Room B")]);
        let summary = reconcile(&store, &after, &options).await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(summary.deleted, 0);

        let entries = store.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].location.as_deref(), Some("Room B"));
    }

    #[tokio::test]
    async fn cancelled_session_is_deleted() {
        let store = MemoryStore::default();
        let options = ReconcileOptions::default();

        reconcile(&store, &batch(vec![upcoming("Math101", 2, "Room A")]), &options)
            .await
            .unwrap();

        let summary = reconcile(&store, &batch(vec![]), &options).await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert!(store.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_tagged_entries_self_heal() {
        let event = upcoming("Math101", 2, "Room A");
        let entry = CalendarEntry {
            id: "mem-a".to_string(),
            key: event.key.clone(),
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            location: event.location.clone(),
        };
        let mut dup = entry.clone();
        dup.id = "mem-b".to_string();

        let store = MemoryStore::with_entries(vec![entry, dup]);
        let summary = reconcile(&store, &batch(vec![event]), &ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.orphaned_duplicates_removed, 1);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.created, 0);

        let entries = store.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "mem-a", "the first occurrence is kept");
    }

    #[tokio::test]
    async fn unavailable_calendar_aborts_before_any_mutation() {
        let store = MemoryStore {
            unavailable: true,
            ..MemoryStore::default()
        };
        let source = batch(vec![upcoming("Math101", 2, "Room A")]);

        let err = reconcile(&store, &source, &ReconcileOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::CalendarUnavailable(_)));
        assert!(
            store.entries.lock().unwrap().is_empty(),
            "a failed read must never be treated as an empty calendar"
        );
    }

    #[tokio::test]
    async fn foreign_events_never_appear_in_a_plan() {
        // The snapshot reader only returns tagged entries, so foreign
        // events are invisible to the matcher by construction. Model a
        // store holding one and verify no intent references it.
        let store = MemoryStore {
            foreign_ids: vec!["manual-dentist".to_string()],
            ..MemoryStore::default()
        };
        let source = batch(vec![upcoming("Math101", 2, "Room A")]);

        let plan = compute_plan(&store, &source, &ReconcileOptions::default())
            .await
            .unwrap();

        for intent in &plan.intents {
            match intent {
                Intent::Update { event_id, .. } | Intent::Delete { event_id } => {
                    assert_ne!(event_id, "manual-dentist");
                }
                Intent::Create(_) => {}
            }
        }

        // Applying must not touch it either (the store panics if it does).
        reconcile(&store, &source, &ReconcileOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn malformed_count_flows_into_the_summary() {
        let store = MemoryStore::default();
        let source = NormalizedBatch {
            events: vec![],
            malformed_skipped: 3,
        };

        let summary = reconcile(&store, &source, &ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.malformed_records_skipped, 3);
    }
}

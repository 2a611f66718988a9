//! Reconciliation engine for syncing an ENT class schedule into a calendar.
//!
//! The engine takes a freshly scraped set of schedule events and the
//! current contents of the target calendar, computes the minimal set of
//! create/update/delete operations to make the calendar match the source,
//! and applies them idempotently. Identity survives across runs through a
//! sync key tag stored in each entry's private metadata; nothing is
//! persisted locally.

pub mod apply;
pub mod error;
pub mod event;
pub mod matcher;
pub mod normalize;
pub mod plan;
pub mod reconcile;
pub mod store;

pub use apply::{ApplyReport, IntentOutcome};
pub use error::{StoreError, SyncError, SyncResult};
pub use event::{CalendarEntry, CanonicalEvent, RawRecord, SyncKey};
pub use matcher::{MatchResult, Matches};
pub use normalize::{normalize_records, NormalizedBatch};
pub use plan::{Intent, Plan};
pub use reconcile::{compute_plan, reconcile, ReconcileOptions, RunSummary};
pub use store::{CalendarStore, SnapshotWindow};

//! Ordered execution of a reconciliation plan.
//!
//! Intents are issued one at a time in plan order. A transient failure is
//! retried with bounded backoff; a still-failing intent is recorded and
//! the run moves on, so one bad event never aborts the whole sync.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::plan::{Intent, Plan};
use crate::store::CalendarStore;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Per-intent outcome, in plan order.
#[derive(Debug, Clone)]
pub enum IntentOutcome {
    Applied,
    Failed(String),
}

impl IntentOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, IntentOutcome::Applied)
    }
}

/// Result of executing a plan. Individual failures are recorded here,
/// never raised.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    /// One outcome per intent, aligned with the plan's order.
    pub outcomes: Vec<IntentOutcome>,
}

/// Execute every intent in order against the store.
pub async fn apply_plan<S: CalendarStore + ?Sized>(store: &S, plan: &Plan) -> ApplyReport {
    let mut report = ApplyReport::default();

    for intent in &plan.intents {
        match apply_intent(store, intent).await {
            Ok(()) => {
                match intent {
                    Intent::Create(_) => report.created += 1,
                    Intent::Update { .. } => report.updated += 1,
                    Intent::Delete { .. } => report.deleted += 1,
                }
                report.outcomes.push(IntentOutcome::Applied);
            }
            Err(err) => {
                warn!(%err, ?intent, "intent failed, continuing with remaining plan");
                report.failed += 1;
                report.outcomes.push(IntentOutcome::Failed(err.to_string()));
            }
        }
    }

    report
}

/// Issue one intent, retrying transient failures up to `MAX_ATTEMPTS`.
async fn apply_intent<S: CalendarStore + ?Sized>(
    store: &S,
    intent: &Intent,
) -> Result<(), StoreError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match intent {
            Intent::Create(event) => store.create(event).await.map(|_| ()),
            Intent::Update { event_id, event } => store.update(event_id, event).await,
            Intent::Delete { event_id } => store.delete(event_id).await,
        };

        match result {
            Ok(()) => return Ok(()),
            Err(err @ StoreError::Transient(_)) if attempt < MAX_ATTEMPTS => {
                let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                debug!(%err, attempt, ?delay, "transient store error, backing off");
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

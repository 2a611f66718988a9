pub mod auth;
pub mod status;
pub mod sync;

use anyhow::Result;
use entsync_core::{normalize_records, NormalizedBatch, ReconcileOptions};

use crate::config::Config;
use crate::ent;

/// Fetch the schedule from the ENT and normalize it.
pub(crate) async fn gather_source(cfg: &Config) -> Result<NormalizedBatch> {
    let tz = cfg.timezone()?;

    println!("Fetching schedule from the ENT...");
    let records = ent::fetch_schedule(&cfg.ent).await?;
    println!("  {} records fetched", records.len());

    let batch = normalize_records(&records, tz);
    if batch.malformed_skipped > 0 {
        println!("  {} malformed records skipped", batch.malformed_skipped);
    }

    Ok(batch)
}

pub(crate) fn reconcile_options(cfg: &Config) -> ReconcileOptions {
    ReconcileOptions {
        horizon_days: cfg.horizon_days,
    }
}

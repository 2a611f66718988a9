//! Full sync run: fetch, normalize, reconcile, report.

use anyhow::Result;
use entsync_core::reconcile;

use crate::config;
use crate::gcal::GcalStore;

use super::{gather_source, reconcile_options};

pub async fn run() -> Result<()> {
    let cfg = config::load_config()?;

    let batch = gather_source(&cfg).await?;

    println!("\nSyncing: {}", cfg.calendar_name);
    let store = GcalStore::connect(&cfg).await?;

    let summary = reconcile(&store, &batch, &reconcile_options(&cfg)).await?;

    println!("\n{}", summary);
    Ok(())
}

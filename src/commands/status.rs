//! Dry run: show the plan a sync would apply, without applying it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use entsync_core::{compute_plan, Intent};

use crate::config;
use crate::gcal::GcalStore;

use super::{gather_source, reconcile_options};

pub async fn run() -> Result<()> {
    let cfg = config::load_config()?;

    let batch = gather_source(&cfg).await?;

    let store = GcalStore::connect(&cfg).await?;
    let plan = compute_plan(&store, &batch, &reconcile_options(&cfg)).await?;

    if plan.is_empty() {
        println!("\nCalendar '{}' is in sync.", cfg.calendar_name);
        return Ok(());
    }

    println!("\nChanges for calendar '{}':", cfg.calendar_name);

    let mut creates = 0;
    let mut updates = 0;
    let mut deletes = 0;

    for intent in &plan.intents {
        match intent {
            Intent::Delete { event_id } => {
                deletes += 1;
                println!("  - delete {}", event_id);
            }
            Intent::Create(event) => {
                creates += 1;
                println!(
                    "  + {} @ {}{}",
                    event.title,
                    fmt_time(event.start),
                    fmt_location(event.location.as_deref())
                );
            }
            Intent::Update { event_id, event } => {
                updates += 1;
                println!(
                    "  ~ {} @ {}{} ({})",
                    event.title,
                    fmt_time(event.start),
                    fmt_location(event.location.as_deref()),
                    event_id
                );
            }
        }
    }

    println!(
        "\n{} to create, {} to update, {} to delete",
        creates, updates, deletes
    );
    println!("Run `entsync sync` to apply.");

    Ok(())
}

fn fmt_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

fn fmt_location(location: Option<&str>) -> String {
    location.map(|l| format!(" [{}]", l)).unwrap_or_default()
}

//! Chunk plan preview.

use chrono::NaiveDate;
use console::style;

use rangeharvest::config::Config;
use rangeharvest::harvest;
use rangeharvest::models::DateWindow;
use rangeharvest::storage::{ChunkStore, JsonDirStore};

/// Print the chunks a run over `start..=end` would process.
pub fn cmd_plan(
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
    interval: Option<i64>,
) -> anyhow::Result<()> {
    let interval = interval.unwrap_or(config.harvest.interval_days);
    let window = DateWindow::new(start, end)?;
    let chunks = harvest::plan(window, interval)?;

    println!(
        "{} {} ({} days) in {} chunks of up to {} days",
        style("→").cyan(),
        window,
        window.days(),
        chunks.len(),
        interval
    );

    let store = JsonDirStore::new(config.resolve_path(&config.harvest.output_dir));
    for chunk in &chunks {
        let id = chunk.id();
        let exists = store.contains(&id);
        println!(
            "  {:>3}  {}  {}",
            chunk.index,
            id,
            if exists {
                style("stored").dim().to_string()
            } else {
                String::new()
            }
        );
    }

    Ok(())
}

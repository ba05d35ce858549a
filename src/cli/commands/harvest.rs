//! The harvest command: run a date window chunk by chunk with progress output.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use rangeharvest::config::Config;
use rangeharvest::harvest::{HarvestEvent, RangeHarvester};
use rangeharvest::models::{DateWindow, FilterSpec, RunSummary};
use rangeharvest::scrapers::CdpLauncher;
use rangeharvest::storage::JsonDirStore;

/// Command-line choices for one run, layered over the config.
pub struct HarvestOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Option<i64>,
    pub targets: Vec<String>,
    pub output: Option<PathBuf>,
    pub resume: bool,
    pub headed: bool,
    pub remote_url: Option<String>,
}

pub async fn cmd_harvest(mut config: Config, options: HarvestOptions) -> anyhow::Result<()> {
    if options.headed {
        config.browser.headless = false;
    }
    if options.remote_url.is_some() {
        config.browser.remote_url = options.remote_url;
    }

    let window = DateWindow::new(options.start, options.end)?;
    let interval = options.interval.unwrap_or(config.harvest.interval_days);
    let labels = if options.targets.is_empty() {
        config.site.targets.clone()
    } else {
        options.targets
    };
    let output_dir = match options.output {
        Some(dir) => dir,
        None => config.resolve_path(&config.harvest.output_dir),
    };

    println!(
        "{} Harvesting {} into {}",
        style("→").cyan(),
        window,
        output_dir.display()
    );
    if !labels.is_empty() {
        println!("  {} Targets: {}", style("→").dim(), labels.join(", "));
    }

    let store = Arc::new(JsonDirStore::new(&output_dir));
    let launcher = Arc::new(CdpLauncher::new(config.browser.clone()));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<HarvestEvent>();

    let harvester = RangeHarvester::new(
        launcher,
        store,
        config.chunk_runner(),
        config.site.base_url.clone(),
    )
    .with_resume(options.resume || config.harvest.resume)
    .with_events(event_tx);

    // Ctrl-C stops the run after the chunk in flight
    let cancel = harvester.cancel_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{} Interrupted, finishing the current chunk...",
                style("!").yellow()
            );
            cancel.cancel();
        }
    });

    let event_handler = tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap()
                .progress_chars("█▓░"),
        );

        while let Some(event) = event_rx.recv().await {
            match event {
                HarvestEvent::ChunkStarted {
                    total, chunk_id, ..
                } => {
                    pb.set_length(total as u64);
                    pb.set_message(chunk_id);
                }
                HarvestEvent::ChunkCompleted {
                    chunk_id, records, ..
                } => {
                    pb.println(format!(
                        "  {} {} {} records",
                        style("✓").green(),
                        chunk_id,
                        records
                    ));
                    pb.inc(1);
                }
                HarvestEvent::ChunkSkipped { chunk_id, .. } => {
                    pb.println(format!("  {} {} already stored", style("→").dim(), chunk_id));
                    pb.inc(1);
                }
                HarvestEvent::ChunkFailed {
                    chunk_id,
                    reason,
                    records,
                    ..
                } => {
                    let partial = if records > 0 {
                        format!(" ({} records kept)", records)
                    } else {
                        String::new()
                    };
                    pb.println(format!(
                        "  {} {} {}{}",
                        style("✗").red(),
                        chunk_id,
                        reason,
                        partial
                    ));
                    pb.inc(1);
                }
                HarvestEvent::RunFinished { .. } => {}
            }
        }

        pb.finish_and_clear();
    });

    let result = harvester
        .run(window, interval, &FilterSpec::new(labels))
        .await;

    // Dropping the harvester closes the event channel
    drop(harvester);
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }
    interrupt.abort();

    let summary = result?;
    print_summary(&summary);

    if summary.failed() > 0 {
        anyhow::bail!(
            "{} of {} chunks did not complete",
            summary.failed(),
            summary.planned_chunks
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} Harvested {} records from {} chunks",
        style("✓").green(),
        summary.total_records,
        summary.succeeded
    );

    if summary.skipped > 0 {
        println!(
            "  {} {} chunks already stored",
            style("→").dim(),
            summary.skipped
        );
    }

    if summary.cancelled {
        println!("  {} Run cancelled", style("!").yellow());
    }

    if let Some(ref reason) = summary.aborted {
        println!("  {} Run aborted: {}", style("!").yellow(), reason);
    }

    for failed in &summary.failures {
        println!(
            "  {} {} {}",
            style("✗").red(),
            failed.chunk.id(),
            failed.reason
        );
    }
}

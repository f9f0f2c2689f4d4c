//! `poolrace run` – drive the workload through the dispatcher.

use anyhow::{Context, Result};
use poolrace_core::config::PoolraceConfig;
use poolrace_core::dispatcher::{Dispatcher, EventSink, RepeatSource, Summary, TerminalEvent};
use poolrace_core::progress::ProgressStats;
use poolrace_core::retry::RetryPolicy;
use poolrace_core::store::{Query, ReplicatedStore};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const PROGRESS_INTERVAL_MS: u64 = 500;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub concurrency: Option<usize>,
    pub tasks: Option<u64>,
    pub forever: bool,
    pub query: Option<String>,
    pub write: bool,
}

impl RunOverrides {
    fn apply(self, cfg: &mut PoolraceConfig) {
        if let Some(n) = self.concurrency {
            cfg.concurrency = n;
        }
        if let Some(n) = self.tasks {
            cfg.workload.tasks = Some(n);
            cfg.workload.forever = false;
        }
        if self.forever {
            cfg.workload.forever = true;
        }
        if self.query.is_some() {
            cfg.workload.query = self.query;
        }
        if self.write {
            cfg.workload.write = true;
        }
    }
}

pub async fn run_load(mut cfg: PoolraceConfig, overrides: RunOverrides) -> Result<()> {
    overrides.apply(&mut cfg);
    cfg.validate()?;

    let policy = RetryPolicy::from_config(&cfg.retry)?;
    let max_connections =
        u32::try_from(cfg.concurrency).context("concurrency does not fit a pool size")?;
    let store = Arc::new(ReplicatedStore::connect_lazy(&cfg.store, max_connections)?);
    store.authenticate().await?;

    let query = if cfg.workload.write {
        Query::write(cfg.query())
    } else {
        Query::read(cfg.query())
    };
    let total = cfg.task_count();
    tracing::info!(
        concurrency = cfg.concurrency,
        tasks = ?total,
        query = %query,
        "starting run"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let (sink, events) = EventSink::channel();
    let progress_handle = tokio::spawn(report_progress(events, total));

    let dispatcher = Dispatcher::new(store.clone(), policy, cfg.concurrency)?.with_events(sink);
    let summary = dispatcher.run(RepeatSource::from_count(query, total), &cancel).await;
    // Dropping the dispatcher closes the event channel so the reporter finishes.
    drop(dispatcher);
    ctrl_c.abort();
    let _ = progress_handle.await;

    store.close().await;
    print_summary(&summary);
    Ok(())
}

/// Fold terminal events into running stats and redraw the progress line
/// every `PROGRESS_INTERVAL_MS`.
async fn report_progress(mut events: UnboundedReceiver<TerminalEvent>, total: Option<u64>) {
    let started = Instant::now();
    let mut stats = ProgressStats::new(total);
    let mut tick = tokio::time::interval(Duration::from_millis(PROGRESS_INTERVAL_MS));
    tick.tick().await;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => stats.observe(&event),
                None => break,
            },
            _ = tick.tick() => {
                stats.elapsed_secs = started.elapsed().as_secs_f64();
                print_progress(&stats);
            }
        }
    }
    stats.elapsed_secs = started.elapsed().as_secs_f64();
    print_progress(&stats);
    println!();
}

fn print_progress(stats: &ProgressStats) {
    print!("{}", progress_line(stats));
    let _ = io::stdout().flush();
}

/// One progress line that overwrites the previous one in place.
fn progress_line(stats: &ProgressStats) -> String {
    let done = match (stats.total, stats.fraction()) {
        (Some(total), Some(fraction)) => {
            format!("{} / {} ({:.1}%)", stats.completed(), total, fraction * 100.0)
        }
        _ => format!("{}", stats.completed()),
    };
    let eta = stats
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "\r  {}  {:.1} tasks/s  fatal {}  exhausted {}  retries {}  ETA {}  ",
        done,
        stats.tasks_per_sec(),
        stats.failed_fatal,
        stats.failed_exhausted,
        stats.retries,
        eta
    )
}

fn print_summary(summary: &Summary) {
    let secs = summary.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        summary.completed() as f64 / secs
    } else {
        0.0
    };
    println!(
        "Done: {} succeeded, {} fatal, {} exhausted, {} abandoned in {:.2}s ({:.1} tasks/s, peak in flight {})",
        summary.succeeded,
        summary.failed_fatal,
        summary.failed_exhausted,
        summary.abandoned,
        secs,
        rate,
        summary.peak_in_flight
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let mut cfg = PoolraceConfig::default();
        cfg.workload.forever = true;
        RunOverrides {
            concurrency: Some(3),
            tasks: Some(12),
            forever: false,
            query: Some("SELECT 2;".to_string()),
            write: true,
        }
        .apply(&mut cfg);
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.task_count(), Some(12));
        assert_eq!(cfg.query(), "SELECT 2;");
        assert!(cfg.workload.write);
    }

    #[test]
    fn progress_line_redraws_in_place() {
        let mut stats = ProgressStats::new(Some(200));
        stats.succeeded = 50;
        stats.retries = 7;
        stats.elapsed_secs = 5.0;
        let line = progress_line(&stats);
        assert!(line.starts_with('\r'));
        assert!(!line.contains('\n'));
        assert!(line.contains("50 / 200 (25.0%)"), "{line}");
        assert!(line.contains("10.0 tasks/s"), "{line}");
        assert!(line.contains("ETA 15s"), "{line}");
    }

    #[test]
    fn progress_line_without_total() {
        let mut stats = ProgressStats::new(None);
        stats.succeeded = 3;
        let line = progress_line(&stats);
        assert!(line.contains("  3  "), "{line}");
        assert!(line.contains("ETA ?"), "{line}");
    }

    #[test]
    fn empty_overrides_keep_config() {
        let mut cfg = PoolraceConfig::default();
        RunOverrides::default().apply(&mut cfg);
        assert_eq!(cfg, PoolraceConfig::default());
    }
}

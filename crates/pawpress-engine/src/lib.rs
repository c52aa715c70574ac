//! Turns a resolved theme selection into printable page files on disk.
//!
//! The engine owns a run directory per batch: generated pages, an
//! `events.jsonl` stream, and a final `summary.json`. Presentation layers
//! poll progress and read the report; they never talk to providers
//! directly.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use pawpress_contracts::context::SessionContext;
use pawpress_contracts::events::{now_utc_iso, EventPayload, EventWriter};
use pawpress_contracts::progress::ProgressTracker;
use pawpress_contracts::resolve::resolve_selection;
use pawpress_contracts::selection::SelectionState;
use pawpress_contracts::summary::{write_summary, RunSummary};
use pawpress_contracts::themes::{Category, ThemeCatalog};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod compile;
pub mod pipeline;
pub mod providers;
pub mod schedule;

pub use compile::{CompileError, DISCLOSURE_PREFIX};
pub use pipeline::{JobOutcome, Page};
pub use providers::CollaboratorSet;
pub use schedule::{BatchReport, BatchScheduler, BatchStatus};

/// One page file written into the run directory.
#[derive(Debug, Clone)]
pub struct SavedPage {
    pub path: PathBuf,
    pub caption: String,
    pub category: Category,
}

/// Outcome of a whole batch, returned after `summary.json` is written.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub pages: Vec<SavedPage>,
    pub requested: usize,
    pub degraded: usize,
    pub failed: usize,
    pub status: BatchStatus,
    pub warning: Option<String>,
}

pub struct PageRun {
    run_dir: PathBuf,
    run_id: String,
    events: EventWriter,
    progress: ProgressTracker,
    collaborators: CollaboratorSet,
    catalog: ThemeCatalog,
    summary_path: PathBuf,
    started_at: String,
    backoff: Duration,
}

impl PageRun {
    pub fn new(run_dir: impl Into<PathBuf>, collaborators: CollaboratorSet) -> Result<Self> {
        let run_dir = run_dir.into();
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create {}", run_dir.display()))?;
        let run_id = run_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", Uuid::new_v4().simple()));
        let events = EventWriter::new(run_dir.join("events.jsonl"), run_id.clone());
        let summary_path = run_dir.join("summary.json");
        let started_at = now_utc_iso();

        events.emit(
            "run_started",
            map_object(json!({
                "out_dir": run_dir.to_string_lossy().to_string(),
                "generator": collaborators.generator.name(),
            })),
        )?;

        Ok(Self {
            run_dir,
            run_id,
            events,
            progress: ProgressTracker::new(),
            collaborators,
            catalog: ThemeCatalog::default(),
            summary_path,
            started_at,
            backoff: Duration::from_secs(1),
        })
    }

    pub fn with_catalog(mut self, catalog: ThemeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &std::path::Path {
        &self.run_dir
    }

    pub fn catalog(&self) -> &ThemeCatalog {
        &self.catalog
    }

    /// Clone-shareable progress handle for a polling presenter thread.
    pub fn progress(&self) -> ProgressTracker {
        self.progress.clone()
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    /// Resolves the selection into jobs, runs the batch, writes page files
    /// and `summary.json`, and returns the report. Validation problems
    /// surface before any generation call is made.
    pub fn generate(
        &self,
        state: &SelectionState,
        context: &SessionContext,
        count: usize,
        seed: Option<u64>,
    ) -> Result<RunReport> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let jobs = resolve_selection(state, &self.catalog, count, &mut rng)?;
        self.events.emit(
            "jobs_resolved",
            map_object(json!({
                "requested": jobs.len(),
                "themes": jobs.iter().map(|job| job.label()).collect::<Vec<_>>(),
            })),
        )?;

        let scheduler = BatchScheduler::new(
            &self.collaborators,
            &self.catalog,
            &self.events,
            self.progress.clone(),
        )
        .with_backoff(self.backoff);
        let report = match scheduler.run_jobs(&jobs, state, context) {
            Ok(report) => report,
            Err(err) => {
                self.write_run_summary(jobs.len(), 0, 0, jobs.len(), "failed")?;
                return Err(err);
            }
        };

        let mut pages = Vec::with_capacity(report.pages.len());
        for (index, page) in report.pages.iter().enumerate() {
            let path = self.write_page_file(index, page)?;
            pages.push(SavedPage {
                path,
                caption: page.caption.clone(),
                category: page.category,
            });
        }

        let status_label = match report.status {
            BatchStatus::Complete => "complete",
            BatchStatus::Partial { .. } => "partial",
        };
        self.write_run_summary(
            report.requested,
            pages.len(),
            report.degraded,
            report.failed,
            status_label,
        )?;
        self.events.emit(
            "batch_completed",
            map_object(json!({
                "requested": report.requested,
                "created": pages.len(),
                "degraded": report.degraded,
                "failed": report.failed,
                "status": status_label,
            })),
        )?;
        self.progress.set_status(match report.status {
            BatchStatus::Complete => "All pages created.".to_string(),
            BatchStatus::Partial { succeeded, requested } => {
                format!("Created {succeeded} of {requested} pages.")
            }
        });

        Ok(RunReport {
            run_id: self.run_id.clone(),
            run_dir: self.run_dir.clone(),
            pages,
            requested: report.requested,
            degraded: report.degraded,
            failed: report.failed,
            warning: report.warning(),
            status: report.status,
        })
    }

    /// Page files are content-addressed so re-running into the same dir
    /// never silently overwrites a different image.
    fn write_page_file(&self, index: usize, page: &Page) -> Result<PathBuf> {
        let digest = Sha256::digest(&page.asset.bytes);
        let short_hash = &hex::encode(digest)[..8];
        let path = self.run_dir.join(format!(
            "page-{:02}-{}.{}",
            index + 1,
            short_hash,
            page.asset.file_extension(),
        ));
        fs::write(&path, &page.asset.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    fn write_run_summary(
        &self,
        requested: usize,
        created: usize,
        degraded: usize,
        failed: usize,
        status: &str,
    ) -> Result<()> {
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            requested: requested as u64,
            created: created as u64,
            degraded: degraded as u64,
            failed: failed as u64,
            status: status.to_string(),
        };
        let mut extra = Map::new();
        extra.insert(
            "generator".to_string(),
            Value::String(self.collaborators.generator.name().to_string()),
        );
        write_summary(&self.summary_path, &summary, Some(&extra))
    }
}

fn map_object(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

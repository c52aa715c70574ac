use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use pawpress_contracts::context::SessionContext;
use pawpress_contracts::events::EventWriter;
use pawpress_contracts::progress::ProgressTracker;
use pawpress_contracts::resolve::ResolvedJob;
use pawpress_contracts::selection::SelectionState;
use pawpress_contracts::themes::ThemeCatalog;

use crate::compile::{compile_instruction, validate_preconditions};
use crate::pipeline::{GenerationPipeline, JobOutcome, Page};
use crate::providers::CollaboratorSet;

/// Below this job count the batch runs strictly sequentially so results
/// stream back one page at a time in job order.
pub const SEQUENTIAL_LIMIT: usize = 10;

/// Concurrent chunk size for large batches, sized to the external service's
/// concurrency tolerance.
pub const CONCURRENT_CHUNK_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Complete,
    Partial { succeeded: usize, requested: usize },
}

#[derive(Debug)]
pub struct BatchReport {
    pub pages: Vec<Page>,
    pub requested: usize,
    pub degraded: usize,
    pub failed: usize,
    pub status: BatchStatus,
}

impl BatchReport {
    /// Non-fatal notice shown when some, but not all, pages were created.
    pub fn warning(&self) -> Option<String> {
        match self.status {
            BatchStatus::Partial {
                succeeded,
                requested,
            } => Some(format!(
                "Created {succeeded} of {requested} pages; the rest could not be generated."
            )),
            BatchStatus::Complete => None,
        }
    }
}

/// Executes a resolved job list against the collaborators, sequentially for
/// small batches and in fixed-size concurrent chunks for large ones. Never
/// aborts on a single job failure.
pub struct BatchScheduler<'a> {
    collaborators: &'a CollaboratorSet,
    catalog: &'a ThemeCatalog,
    events: &'a EventWriter,
    progress: ProgressTracker,
    backoff: Duration,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(
        collaborators: &'a CollaboratorSet,
        catalog: &'a ThemeCatalog,
        events: &'a EventWriter,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            collaborators,
            catalog,
            events,
            progress,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn run_jobs(
        &self,
        jobs: &[ResolvedJob],
        state: &SelectionState,
        context: &SessionContext,
    ) -> Result<BatchReport> {
        validate_preconditions(jobs, state, context, self.catalog)?;

        let requested = jobs.len();
        self.progress.begin(requested);
        let pipeline = GenerationPipeline::new(
            self.collaborators.generator.as_ref(),
            self.collaborators.captioner.as_ref(),
        )
        .with_backoff(self.backoff);

        let mut pages: Vec<Page> = Vec::new();
        let mut degraded = 0usize;
        let mut failed = 0usize;

        if requested < SEQUENTIAL_LIMIT {
            for (index, job) in jobs.iter().enumerate() {
                self.progress
                    .set_status(format!("Creating page {} of {}...", index + 1, requested));
                let outcome = self.execute_one(&pipeline, job, state, context);
                self.record_outcome(index, job, outcome, &mut pages, &mut degraded, &mut failed);
                self.progress.add_completed(1);
            }
        } else {
            let chunk_count = requested.div_ceil(CONCURRENT_CHUNK_SIZE);
            for (chunk_index, chunk) in jobs.chunks(CONCURRENT_CHUNK_SIZE).enumerate() {
                let first_page = chunk_index * CONCURRENT_CHUNK_SIZE + 1;
                let last_page = first_page + chunk.len() - 1;
                self.progress.set_status(format!(
                    "Creating batch {} of {} (pages {}-{})...",
                    chunk_index + 1,
                    chunk_count,
                    first_page,
                    last_page,
                ));

                // Every job in the chunk runs concurrently; the chunk is
                // joined as a whole before the shared page list is touched.
                let (tx, rx) = mpsc::channel::<(usize, JobOutcome)>();
                thread::scope(|scope| {
                    for (offset, job) in chunk.iter().enumerate() {
                        let tx = tx.clone();
                        let pipeline = &pipeline;
                        scope.spawn(move || {
                            let outcome = self.execute_one(pipeline, job, state, context);
                            let _ = tx.send((offset, outcome));
                        });
                    }
                    drop(tx);
                    for (offset, outcome) in rx {
                        let index = chunk_index * CONCURRENT_CHUNK_SIZE + offset;
                        self.record_outcome(
                            index,
                            &chunk[offset],
                            outcome,
                            &mut pages,
                            &mut degraded,
                            &mut failed,
                        );
                        self.progress.add_completed(1);
                    }
                });
            }
        }

        if pages.is_empty() {
            bail!("No pages could be created. Please try again.");
        }

        let status = if pages.len() == requested {
            BatchStatus::Complete
        } else {
            BatchStatus::Partial {
                succeeded: pages.len(),
                requested,
            }
        };
        Ok(BatchReport {
            pages,
            requested,
            degraded,
            failed,
            status,
        })
    }

    fn execute_one(
        &self,
        pipeline: &GenerationPipeline<'_>,
        job: &ResolvedJob,
        state: &SelectionState,
        context: &SessionContext,
    ) -> JobOutcome {
        // Preconditions ran up front; a residual compile error counts as a
        // failed job rather than aborting the batch.
        let Ok(instruction) = compile_instruction(
            job,
            state,
            context,
            self.catalog,
            self.collaborators.optimizer.as_ref(),
        ) else {
            return JobOutcome::Failed;
        };
        pipeline.run_job(&instruction, context, &context.all_image_refs())
    }

    fn record_outcome(
        &self,
        index: usize,
        job: &ResolvedJob,
        outcome: JobOutcome,
        pages: &mut Vec<Page>,
        degraded: &mut usize,
        failed: &mut usize,
    ) {
        let event_type = match &outcome {
            JobOutcome::Success(_) => "page_created",
            JobOutcome::Degraded(_) => "page_degraded",
            JobOutcome::Failed => "page_failed",
        };
        let _ = self.events.emit_page(event_type, index, job.label());
        match outcome {
            JobOutcome::Success(page) => pages.push(page),
            JobOutcome::Degraded(page) => {
                *degraded += 1;
                pages.push(page);
            }
            JobOutcome::Failed => *failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result as AnyResult;
    use indexmap::IndexMap;
    use pawpress_contracts::context::ImageRef;
    use pawpress_contracts::themes::{Category, Theme};
    use serde_json::Value;

    use crate::compile::DISCLOSURE_PREFIX;
    use crate::providers::{
        Asset, CaptionProvider, DryrunOptimizer, GenerationProvider, PromptOptimizer,
    };

    use super::*;

    /// Echoes the instruction into the asset bytes; fails any instruction
    /// containing one of the configured needles.
    struct EchoGenerator {
        fail_needles: Vec<&'static str>,
    }

    impl GenerationProvider for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        fn generate(&self, instruction: &str, _refs: &[ImageRef]) -> AnyResult<Asset> {
            if self
                .fail_needles
                .iter()
                .any(|needle| instruction.contains(needle))
            {
                anyhow::bail!("scripted failure");
            }
            Ok(Asset {
                bytes: instruction.as_bytes().to_vec(),
                mime_type: "image/png".to_string(),
            })
        }
    }

    struct FixedCaptioner;

    impl CaptionProvider for FixedCaptioner {
        fn name(&self) -> &str {
            "fixed"
        }

        fn caption(&self, _asset: &Asset, context: &SessionContext) -> AnyResult<String> {
            Ok(format!("Starring {}", context.display_name()))
        }
    }

    fn collaborators(fail_needles: Vec<&'static str>) -> CollaboratorSet {
        CollaboratorSet {
            generator: Box::new(EchoGenerator { fail_needles }),
            captioner: Box::new(FixedCaptioner),
            optimizer: Box::new(DryrunOptimizer),
        }
    }

    fn test_theme(title: &str) -> (String, Theme) {
        let template = format!("{} template", title.to_ascii_lowercase());
        (
            template.clone(),
            Theme {
                title: title.to_string(),
                template,
                category: Category::Standard,
                special: false,
                badge: None,
            },
        )
    }

    fn catalog() -> ThemeCatalog {
        ThemeCatalog::new(Some(IndexMap::from_iter([
            test_theme("Alpha"),
            test_theme("Bravo"),
        ])))
    }

    fn theme_jobs(ids: &[&str]) -> Vec<ResolvedJob> {
        ids.iter()
            .map(|id| ResolvedJob::Theme(id.to_string()))
            .collect()
    }

    fn page_text(page: &Page) -> String {
        String::from_utf8(page.asset.bytes.clone()).expect("utf8 asset")
    }

    fn run(
        jobs: &[ResolvedJob],
        fail_needles: Vec<&'static str>,
    ) -> (AnyResult<BatchReport>, ProgressTracker, Vec<Value>) {
        let temp = tempfile::tempdir().expect("tempdir");
        let events_path = temp.path().join("events.jsonl");
        let events = EventWriter::new(&events_path, "run-test");
        let progress = ProgressTracker::new();
        let set = collaborators(fail_needles);
        let catalog = catalog();
        let scheduler = BatchScheduler::new(&set, &catalog, &events, progress.clone())
            .with_backoff(Duration::ZERO);
        let report = scheduler.run_jobs(jobs, &SelectionState::default(), &SessionContext::default());

        let content = fs::read_to_string(&events_path).unwrap_or_default();
        let emitted = content
            .lines()
            .map(|line| serde_json::from_str(line).expect("event json"))
            .collect();
        (report, progress, emitted)
    }

    #[test]
    fn sequential_results_keep_job_order() {
        let jobs = theme_jobs(&["alpha template", "bravo template", "alpha template"]);
        let (report, progress, _) = run(&jobs, Vec::new());
        let report = report.expect("report");

        assert_eq!(report.status, BatchStatus::Complete);
        assert_eq!(report.pages.len(), 3);
        assert!(page_text(&report.pages[0]).contains("alpha template"));
        assert!(page_text(&report.pages[1]).contains("bravo template"));
        assert!(page_text(&report.pages[2]).contains("alpha template"));

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.completed, 3);
        assert_eq!(snapshot.status, "Creating page 3 of 3...");
    }

    #[test]
    fn one_failed_job_never_aborts_the_batch() {
        // Primary fails on "bravo", and the portrait fallback is downed too,
        // so the bravo job is a hard per-job failure.
        let jobs = theme_jobs(&["alpha template", "bravo template", "alpha template"]);
        let (report, _, events) = run(&jobs, vec!["bravo", "warm portrait"]);
        let report = report.expect("report");

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.status,
            BatchStatus::Partial {
                succeeded: 2,
                requested: 3
            }
        );
        assert_eq!(
            report.warning().as_deref(),
            Some("Created 2 of 3 pages; the rest could not be generated.")
        );
        assert!(events
            .iter()
            .any(|event| event["type"] == "page_failed" && event["page"] == 2));
    }

    #[test]
    fn degraded_jobs_count_and_carry_the_disclosure_prefix() {
        // Primary fails on "bravo" but the fallback portrait succeeds.
        let jobs = theme_jobs(&["alpha template", "bravo template"]);
        let (report, _, events) = run(&jobs, vec!["bravo"]);
        let report = report.expect("report");

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.degraded, 1);
        assert_eq!(report.status, BatchStatus::Complete);
        let degraded_page = report
            .pages
            .iter()
            .find(|page| page.caption.starts_with(DISCLOSURE_PREFIX))
            .expect("degraded page");
        assert!(page_text(degraded_page).contains("warm portrait"));
        assert!(events.iter().any(|event| event["type"] == "page_degraded"));
    }

    #[test]
    fn total_failure_is_a_hard_error() {
        let jobs = theme_jobs(&["bravo template"]);
        let (report, _, _) = run(&jobs, vec!["bravo", "warm portrait"]);
        let err = report.expect_err("no pages");
        assert!(err.to_string().contains("No pages could be created"));
    }

    #[test]
    fn large_batches_accumulate_in_chunk_order() {
        let mut ids = vec!["alpha template"; 5];
        ids.extend(vec!["bravo template"; 5]);
        let jobs = theme_jobs(&ids);
        let (report, progress, _) = run(&jobs, Vec::new());
        let report = report.expect("report");

        assert_eq!(report.pages.len(), 10);
        // Chunks of five are joined before the next chunk begins, so every
        // first-chunk page precedes every second-chunk page even though
        // order inside a chunk is completion order.
        for page in &report.pages[..5] {
            assert!(page_text(page).contains("alpha template"));
        }
        for page in &report.pages[5..] {
            assert!(page_text(page).contains("bravo template"));
        }
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.completed, 10);
        assert_eq!(snapshot.status, "Creating batch 2 of 2 (pages 6-10)...");
    }

    #[test]
    fn concurrent_chunk_failures_are_absorbed_per_job() {
        let mut ids = vec!["alpha template"; 8];
        ids.extend(vec!["bravo template"; 4]);
        let jobs = theme_jobs(&ids);
        let (report, _, _) = run(&jobs, vec!["bravo", "warm portrait"]);
        let report = report.expect("report");

        assert_eq!(report.pages.len(), 8);
        assert_eq!(report.failed, 4);
        assert_eq!(
            report.status,
            BatchStatus::Partial {
                succeeded: 8,
                requested: 12
            }
        );
    }

    #[test]
    fn precondition_failures_abort_before_any_network_call() {
        let jobs = vec![ResolvedJob::Theme(
            pawpress_contracts::themes::SPORTSCARD_MODE.to_string(),
        )];
        let (report, _, events) = run(&jobs, Vec::new());
        let err = report.expect_err("missing sport");
        assert!(err.to_string().contains("sport"));
        assert!(events.is_empty());
    }

    #[test]
    fn optimizer_is_best_effort_in_the_batch_path() {
        struct FailingOptimizer;
        impl PromptOptimizer for FailingOptimizer {
            fn name(&self) -> &str {
                "failing"
            }
            fn optimize(&self, _raw_theme: &str) -> AnyResult<String> {
                anyhow::bail!("optimizer offline")
            }
        }

        let temp = tempfile::tempdir().expect("tempdir");
        let events = EventWriter::new(temp.path().join("events.jsonl"), "run-test");
        let set = CollaboratorSet {
            generator: Box::new(EchoGenerator {
                fail_needles: Vec::new(),
            }),
            captioner: Box::new(FixedCaptioner),
            optimizer: Box::new(FailingOptimizer),
        };
        let catalog = catalog();
        let scheduler = BatchScheduler::new(&set, &catalog, &events, ProgressTracker::new())
            .with_backoff(Duration::ZERO);
        let report = scheduler
            .run_jobs(
                &theme_jobs(&["alpha template"]),
                &SelectionState::default(),
                &SessionContext::default(),
            )
            .expect("report");
        assert!(page_text(&report.pages[0]).contains("alpha template"));
    }
}

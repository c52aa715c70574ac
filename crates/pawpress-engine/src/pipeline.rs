use std::thread;
use std::time::Duration;

use pawpress_contracts::context::{ImageRef, SessionContext};
use pawpress_contracts::themes::Category;

use crate::compile::{fallback_caption, fallback_instruction, CompiledInstruction, DISCLOSURE_PREFIX};
use crate::providers::{Asset, CaptionProvider, GenerationProvider};

pub const MAX_PRIMARY_ATTEMPTS: u32 = 2;

/// Per-job execution stage. The transition function is pure so the retry
/// policy can be tested apart from any collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary { attempt: u32 },
    Fallback,
    Done,
}

/// Advances one stage given whether the current attempt failed. Success
/// anywhere finishes the job; primary failures retry up to
/// [`MAX_PRIMARY_ATTEMPTS`], then degrade to the single fallback attempt.
pub fn next_stage(stage: Stage, failed: bool) -> Stage {
    match stage {
        Stage::Primary { .. } if !failed => Stage::Done,
        Stage::Primary { attempt } if attempt + 1 < MAX_PRIMARY_ATTEMPTS => {
            Stage::Primary { attempt: attempt + 1 }
        }
        Stage::Primary { .. } => Stage::Fallback,
        Stage::Fallback | Stage::Done => Stage::Done,
    }
}

/// One finished page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub asset: Asset,
    pub caption: String,
    pub category: Category,
}

/// Exactly one of these per job; the pipeline never throws, so a failing
/// job cannot take its batch down with it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(Page),
    Degraded(Page),
    Failed,
}

impl JobOutcome {
    pub fn page(&self) -> Option<&Page> {
        match self {
            JobOutcome::Success(page) | JobOutcome::Degraded(page) => Some(page),
            JobOutcome::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed)
    }
}

/// Runs one compiled job with bounded retry and graceful degradation:
/// at most two primary attempts with linear backoff between them, then one
/// simplified fallback attempt.
pub struct GenerationPipeline<'a> {
    pub generator: &'a dyn GenerationProvider,
    pub captioner: &'a dyn CaptionProvider,
    /// Base delay unit; the wait before primary attempt n is `backoff * n`.
    pub backoff: Duration,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(generator: &'a dyn GenerationProvider, captioner: &'a dyn CaptionProvider) -> Self {
        Self {
            generator,
            captioner,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn run_job(
        &self,
        instruction: &CompiledInstruction,
        context: &SessionContext,
        refs: &[ImageRef],
    ) -> JobOutcome {
        let mut stage = Stage::Primary { attempt: 0 };
        loop {
            match stage {
                Stage::Primary { attempt } => {
                    if attempt > 0 {
                        thread::sleep(self.backoff * attempt);
                    }
                    match self.generator.generate(&instruction.text, refs) {
                        Ok(asset) => {
                            let caption = self.caption_or_fallback(&asset, context);
                            return JobOutcome::Success(Page {
                                asset,
                                caption,
                                category: instruction.category,
                            });
                        }
                        Err(_) => stage = next_stage(stage, true),
                    }
                }
                Stage::Fallback => {
                    let text = fallback_instruction(instruction.category, context);
                    match self.generator.generate(&text, refs) {
                        Ok(asset) => {
                            let caption = format!(
                                "{DISCLOSURE_PREFIX}{}",
                                self.caption_or_fallback(&asset, context)
                            );
                            return JobOutcome::Degraded(Page {
                                asset,
                                caption,
                                category: instruction.category,
                            });
                        }
                        Err(_) => return JobOutcome::Failed,
                    }
                }
                Stage::Done => return JobOutcome::Failed,
            }
        }
    }

    fn caption_or_fallback(&self, asset: &Asset, context: &SessionContext) -> String {
        self.captioner
            .caption(asset, context)
            .unwrap_or_else(|_| fallback_caption(context))
    }
}

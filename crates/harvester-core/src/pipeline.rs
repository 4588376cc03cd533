//! Wires the six stages together and waits for the two aggregates.
//!
//! ```text
//! fetch -> decode -> clone -> extract -+-> dedup
//!                                      +-> group
//! ```
//!
//! Every queue is bounded by `queue_size`. A stage closes its output only
//! after its input is exhausted (or the run is cancelled) and all of the
//! tasks it spawned have been joined, so shutdown cascades in stage order.

use crate::aggregate::{EmailSet, GroupedEmails, spawn_deduplicator, spawn_grouper};
use crate::budget::Budget;
use crate::cloner::{CloneSettings, spawn_cloner};
use crate::config::PipelineOptions;
use crate::decode::spawn_decoder;
use crate::extract::spawn_extractor;
use crate::fetch::{PageSource, spawn_fetcher};
use crate::git::GitRunner;
use crate::progress::{PipelineProgress, ProgressSnapshot};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct HarvestOutcome {
    pub emails: EmailSet,
    pub grouped: GroupedEmails,
    pub cancelled: bool,
}

pub struct HarvestPipeline {
    source: Arc<dyn PageSource>,
    git: Arc<dyn GitRunner>,
    options: PipelineOptions,
}

impl HarvestPipeline {
    pub fn new(
        source: Arc<dyn PageSource>,
        git: Arc<dyn GitRunner>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            git,
            options,
        }
    }

    /// Starts every stage; must be called from within a tokio runtime.
    pub fn spawn(&self, seed: impl Into<String>, cancel: CancellationToken) -> PipelineHandle {
        let options = &self.options;
        let queue_size = options.queue_size;
        let budget = Budget::new(options.workers, cancel.clone());
        let progress = Arc::new(PipelineProgress::new());
        let seed = seed.into();
        info!(
            seed = %seed,
            workers = options.workers,
            queue_size,
            "starting pipeline"
        );

        let (bodies, fetcher) = spawn_fetcher(
            Arc::clone(&self.source),
            seed,
            budget.clone(),
            Arc::clone(&progress),
            queue_size,
        );
        let (repos, decoder) = spawn_decoder(
            bodies,
            options.skip_forks,
            budget.clone(),
            Arc::clone(&progress),
            queue_size,
        );
        let (local_repos, cloner) = spawn_cloner(
            repos,
            Arc::clone(&self.git),
            CloneSettings {
                working_dir: options.working_dir.clone(),
                size_filter_kb: options.size_filter_kb,
            },
            budget.clone(),
            Arc::clone(&progress),
            queue_size,
        );
        let (queues, extractor) = spawn_extractor(
            local_repos,
            Arc::clone(&self.git),
            budget,
            Arc::clone(&progress),
            queue_size,
        );
        let dedup = spawn_deduplicator(queues.emails, Arc::clone(&progress));
        let group = spawn_grouper(queues.associations, Arc::clone(&progress));

        PipelineHandle {
            progress,
            cancel,
            stages: vec![fetcher, decoder, cloner, extractor],
            dedup,
            group,
        }
    }
}

pub struct PipelineHandle {
    progress: Arc<PipelineProgress>,
    cancel: CancellationToken,
    stages: Vec<JoinHandle<()>>,
    dedup: oneshot::Receiver<EmailSet>,
    group: oneshot::Receiver<GroupedEmails>,
}

impl PipelineHandle {
    pub fn progress(&self) -> Arc<PipelineProgress> {
        Arc::clone(&self.progress)
    }

    pub async fn wait(self) -> anyhow::Result<HarvestOutcome> {
        self.wait_with_progress(Duration::MAX, |_| {}).await
    }

    /// Waits for both aggregates, calling `on_tick` every `every` until then.
    pub async fn wait_with_progress<F>(
        self,
        every: Duration,
        mut on_tick: F,
    ) -> anyhow::Result<HarvestOutcome>
    where
        F: FnMut(ProgressSnapshot),
    {
        let PipelineHandle {
            progress,
            cancel,
            stages,
            mut dedup,
            mut group,
        } = self;

        let mut emails = None;
        let mut grouped = None;
        let period = every.max(Duration::from_millis(1));
        let start = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval_at(start.checked_add(period).unwrap_or(start), period);
        while emails.is_none() || grouped.is_none() {
            tokio::select! {
                set = &mut dedup, if emails.is_none() => {
                    emails = Some(set.context("deduplicator stopped without a result")?);
                }
                map = &mut group, if grouped.is_none() => {
                    grouped = Some(map.context("grouper stopped without a result")?);
                }
                _ = ticker.tick(), if every != Duration::MAX => on_tick(progress.snapshot()),
            }
        }

        for stage in stages {
            if let Err(err) = stage.await {
                warn!(error = %err, "pipeline stage ended abnormally");
            }
        }

        Ok(HarvestOutcome {
            emails: emails.unwrap_or_default(),
            grouped: grouped.unwrap_or_default(),
            cancelled: cancel.is_cancelled(),
        })
    }
}

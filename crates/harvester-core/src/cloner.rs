//! Stage 3: clones each surviving repository into the working directory.

use crate::budget::{self, Budget};
use crate::git::{GitError, GitRunner};
use crate::model::RepositoryRecord;
use crate::progress::{PipelineProgress, Stage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub struct CloneSettings {
    pub working_dir: PathBuf,
    /// Size threshold in kB as reported by the API; 0 disables filtering.
    pub size_filter_kb: u64,
}

impl CloneSettings {
    pub fn exceeds_filter(&self, repo: &RepositoryRecord) -> bool {
        self.size_filter_kb > 0 && repo.size > self.size_filter_kb
    }
}

pub fn spawn_cloner(
    mut repos: mpsc::Receiver<RepositoryRecord>,
    git: Arc<dyn GitRunner>,
    settings: CloneSettings,
    budget: Budget,
    progress: Arc<PipelineProgress>,
    queue_size: usize,
) -> (mpsc::Receiver<Arc<RepositoryRecord>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_size);
    let settings = Arc::new(settings);
    let handle = tokio::spawn(async move {
        let counters = progress.stage(Stage::Clone);
        let mut tasks = JoinSet::new();
        while let Some(repo) = budget::recv(&mut repos, budget.cancel_token()).await {
            if settings.exceeds_filter(&repo) {
                info!(
                    stage = Stage::Clone.label(),
                    repo = %repo.name,
                    size = repo.size,
                    filter = settings.size_filter_kb,
                    "skipping repo based on size filter"
                );
                counters.skip();
                counters.complete();
                continue;
            }
            let Some(permit) = budget.acquire().await else {
                break;
            };
            counters.start();
            let tx = tx.clone();
            let git = Arc::clone(&git);
            let settings = Arc::clone(&settings);
            let budget = budget.clone();
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                let cloned = clone_one(repo, git.as_ref(), &settings, &budget, &progress).await;
                drop(permit);
                let Some(repo) = cloned else {
                    return;
                };
                let counters = progress.stage(Stage::Clone);
                if budget::send(&tx, Arc::new(repo), budget.cancel_token()).await {
                    progress.stage(Stage::Extract).discover(2);
                    counters.finish();
                } else {
                    counters.abandon();
                }
            });
            while let Some(joined) = tasks.try_join_next() {
                if let Err(err) = joined {
                    warn!(error = %err, "clone task ended abnormally");
                }
            }
        }

        debug!(
            stage = Stage::Clone.label(),
            in_flight = counters.snapshot().active,
            "input drained; waiting on clones"
        );
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "clone task ended abnormally");
            }
        }
        drop(tx);

        let snapshot = counters.snapshot();
        info!(
            stage = Stage::Clone.label(),
            cloned = snapshot.completed.saturating_sub(snapshot.skipped),
            skipped = snapshot.skipped,
            errors = snapshot.errors,
            "completed"
        );
    });
    (rx, handle)
}

async fn clone_one(
    mut repo: RepositoryRecord,
    git: &dyn GitRunner,
    settings: &CloneSettings,
    budget: &Budget,
    progress: &PipelineProgress,
) -> Option<RepositoryRecord> {
    let result = git
        .clone_repo(&repo.clone_url, &settings.working_dir, budget.cancel_token())
        .await;
    match result {
        Ok(()) => {
            repo.local_path = Some(settings.working_dir.join(&repo.name));
            Some(repo)
        }
        Err(err) => {
            report_git_failure(Stage::Clone, &repo.name, &err);
            progress.stage(Stage::Clone).fail();
            None
        }
    }
}

pub(crate) fn report_git_failure(stage: Stage, repo: &str, err: &GitError) {
    if err.is_interruption() {
        debug!(stage = stage.label(), repo = %repo, error = %err, "killed by application interrupt");
    } else {
        error!(stage = stage.label(), repo = %repo, error = %err, "git command failed");
    }
}

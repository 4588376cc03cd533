//! Stage 4: runs the author and committer summaries for each local checkout.

use crate::budget::{self, Budget};
use crate::cloner::report_git_failure;
use crate::git::GitRunner;
use crate::model::{EmailAssociation, RepositoryRecord, Role};
use crate::progress::{PipelineProgress, Stage};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Slots reserved for this stage before it falls back to the shared budget.
const LOCAL_SLOTS: usize = 2;
const QUERIES: [Role; 2] = [Role::Author, Role::Committer];

pub struct ExtractorQueues {
    pub emails: mpsc::Receiver<String>,
    pub associations: mpsc::Receiver<EmailAssociation>,
}

pub fn spawn_extractor(
    mut repos: mpsc::Receiver<Arc<RepositoryRecord>>,
    git: Arc<dyn GitRunner>,
    budget: Budget,
    progress: Arc<PipelineProgress>,
    queue_size: usize,
) -> (ExtractorQueues, JoinHandle<()>) {
    let (email_tx, email_rx) = mpsc::channel(queue_size);
    let (assoc_tx, assoc_rx) = mpsc::channel(queue_size);
    let handle = tokio::spawn(async move {
        let counters = progress.stage(Stage::Extract);
        let local = Arc::new(Semaphore::new(LOCAL_SLOTS));
        let mut tasks = JoinSet::new();
        'repos: while let Some(repo) = budget::recv(&mut repos, budget.cancel_token()).await {
            for role in QUERIES {
                let permit = match Arc::clone(&local).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => match budget.acquire().await {
                        Some(permit) => permit,
                        None => break 'repos,
                    },
                };
                counters.start();
                let repo = Arc::clone(&repo);
                let git = Arc::clone(&git);
                let sinks = Sinks {
                    emails: email_tx.clone(),
                    associations: assoc_tx.clone(),
                };
                let budget = budget.clone();
                let progress = Arc::clone(&progress);
                tasks.spawn(async move {
                    let output = match repo.local_path() {
                        Some(path) => git.shortlog(path, role, budget.cancel_token()).await,
                        None => {
                            error!(stage = Stage::Extract.label(), repo = %repo.name, "repo has no local path");
                            progress.stage(Stage::Extract).fail();
                            return;
                        }
                    };
                    drop(permit);
                    match output {
                        Ok(output) => {
                            publish(&repo, role, &output, &sinks, &budget, &progress).await;
                        }
                        Err(err) => {
                            report_git_failure(Stage::Extract, &repo.name, &err);
                            progress.stage(Stage::Extract).fail();
                        }
                    }
                });
            }
            while let Some(joined) = tasks.try_join_next() {
                if let Err(err) = joined {
                    warn!(error = %err, "extraction task ended abnormally");
                }
            }
        }

        debug!(
            stage = Stage::Extract.label(),
            in_flight = counters.snapshot().active,
            "input drained; waiting on shortlogs"
        );
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "extraction task ended abnormally");
            }
        }
        drop(email_tx);
        drop(assoc_tx);

        let snapshot = counters.snapshot();
        info!(
            stage = Stage::Extract.label(),
            queries = snapshot.completed,
            identities = progress.stage(Stage::Dedup).snapshot().total,
            errors = snapshot.errors,
            "completed"
        );
    });
    (
        ExtractorQueues {
            emails: email_rx,
            associations: assoc_rx,
        },
        handle,
    )
}

struct Sinks {
    emails: mpsc::Sender<String>,
    associations: mpsc::Sender<EmailAssociation>,
}

async fn publish(
    repo: &Arc<RepositoryRecord>,
    role: Role,
    output: &str,
    sinks: &Sinks,
    budget: &Budget,
    progress: &PipelineProgress,
) {
    let counters = progress.stage(Stage::Extract);
    let cancel = budget.cancel_token();
    for line in output.lines() {
        let Some(email) = email_from_line(line) else {
            if !line.trim().is_empty() {
                debug!(stage = Stage::Extract.label(), repo = %repo.name, line = %line, "no email in line");
            }
            continue;
        };
        let association = EmailAssociation {
            repo: Arc::clone(repo),
            email: email.to_string(),
            role,
        };
        if !budget::send(&sinks.emails, email.to_string(), cancel).await
            || !budget::send(&sinks.associations, association, cancel).await
        {
            counters.abandon();
            return;
        }
        progress.stage(Stage::Dedup).discover(1);
        progress.stage(Stage::Group).discover(1);
    }
    counters.finish();
}

/// Extracts the address between the last `<` and the closing `>`.
pub fn email_from_line(line: &str) -> Option<&str> {
    let line = line.trim_end();
    let start = line.rfind('<')? + 1;
    let rest = &line[start..];
    Some(rest.strip_suffix('>').unwrap_or(rest))
}

//! Stage 2: turns response bodies into repository records.

use crate::budget::{self, Budget};
use crate::fetch::BodyHandle;
use crate::model::RepositoryRecord;
use crate::progress::{PipelineProgress, Stage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub fn spawn_decoder(
    mut bodies: mpsc::Receiver<BodyHandle>,
    skip_forks: bool,
    budget: Budget,
    progress: Arc<PipelineProgress>,
    queue_size: usize,
) -> (mpsc::Receiver<RepositoryRecord>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_size);
    let handle = tokio::spawn(async move {
        let counters = progress.stage(Stage::Decode);
        let mut tasks = JoinSet::new();
        while let Some(body) = budget::recv(&mut bodies, budget.cancel_token()).await {
            let Some(permit) = budget.acquire().await else {
                break;
            };
            counters.start();
            let tx = tx.clone();
            let budget = budget.clone();
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                let decoded = decode_body(body, skip_forks, &progress).await;
                drop(permit);
                forward(decoded, &tx, &budget, &progress).await;
            });
            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }
        }

        debug!(
            stage = Stage::Decode.label(),
            in_flight = counters.snapshot().active,
            "input drained; waiting on decode tasks"
        );
        while let Some(joined) = tasks.join_next().await {
            log_join_error(joined);
        }
        drop(tx);

        let snapshot = counters.snapshot();
        info!(
            stage = Stage::Decode.label(),
            pages = snapshot.completed,
            repos = progress.stage(Stage::Clone).snapshot().total,
            errors = snapshot.errors,
            "completed"
        );
    });
    (rx, handle)
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!(error = %err, "pipeline task ended abnormally");
    }
}

/// Records decoded from one body; `complete` is false when decoding stopped at a bad value.
struct Decoded {
    repos: Vec<RepositoryRecord>,
    complete: bool,
}

/// Decodes every JSON array in the body; a malformed value abandons the rest
/// but keeps the records decoded before it.
async fn decode_body(body: BodyHandle, skip_forks: bool, progress: &PipelineProgress) -> Decoded {
    let counters = progress.stage(Stage::Decode);
    let bytes = match body.read_all().await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(stage = Stage::Decode.label(), error = %err, "failed to read body");
            return Decoded {
                repos: Vec::new(),
                complete: false,
            };
        }
    };

    let mut repos = Vec::new();
    let mut complete = true;
    let stream = serde_json::Deserializer::from_slice(&bytes).into_iter::<Vec<RepositoryRecord>>();
    for batch in stream {
        match batch {
            Ok(batch) => repos.extend(batch),
            Err(err) => {
                error!(
                    stage = Stage::Decode.label(),
                    decoded = repos.len(),
                    error = %err,
                    "failed to parse body"
                );
                complete = false;
                break;
            }
        }
    }

    if skip_forks {
        repos.retain(|repo| {
            if repo.fork {
                debug!(stage = Stage::Decode.label(), repo = %repo.name, "skipping fork");
                counters.skip();
            }
            !repo.fork
        });
    }
    Decoded { repos, complete }
}

async fn forward(
    decoded: Decoded,
    tx: &mpsc::Sender<RepositoryRecord>,
    budget: &Budget,
    progress: &PipelineProgress,
) {
    let counters = progress.stage(Stage::Decode);
    for repo in decoded.repos {
        if !budget::send(tx, repo, budget.cancel_token()).await {
            counters.abandon();
            return;
        }
        progress.stage(Stage::Clone).discover(1);
    }
    if decoded.complete {
        counters.finish();
    } else {
        counters.fail();
    }
}

//! Stage 1: walks the repository listing by following `rel="next"` links.

use crate::budget::{self, Budget};
use crate::paging::parse_link_header;
use crate::progress::{PipelineProgress, Stage};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const MAX_FETCH_ATTEMPTS: u32 = 4;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// A response body that has not been read yet.
pub trait PageBody: Send {
    fn read_all(self: Box<Self>) -> SourceFuture<'static, Vec<u8>>;
}

pub type BodyHandle = Box<dyn PageBody>;

impl PageBody for Vec<u8> {
    fn read_all(self: Box<Self>) -> SourceFuture<'static, Vec<u8>> {
        Box::pin(async move { Ok(*self) })
    }
}

pub struct FetchedPage {
    /// Raw `Link` header value, if the response carried one.
    pub link: Option<String>,
    pub body: BodyHandle,
}

pub trait PageSource: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> SourceFuture<'a, FetchedPage>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch cancelled")]
    Cancelled,
    #[error("giving up on {url} after {attempts} attempts: {source:#}")]
    Exhausted {
        url: String,
        attempts: u32,
        source: anyhow::Error,
    },
}

pub fn spawn_fetcher(
    source: Arc<dyn PageSource>,
    seed: String,
    budget: Budget,
    progress: Arc<PipelineProgress>,
    queue_size: usize,
) -> (mpsc::Receiver<BodyHandle>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_size);
    let handle = tokio::spawn(async move {
        walk_pages(source.as_ref(), seed, &budget, &progress, tx).await;
    });
    (rx, handle)
}

async fn walk_pages(
    source: &dyn PageSource,
    seed: String,
    budget: &Budget,
    progress: &PipelineProgress,
    bodies: mpsc::Sender<BodyHandle>,
) {
    let counters = progress.stage(Stage::Fetch);
    let cancel = budget.cancel_token();
    // Only this task pushes and pops, so the work queue can never block on itself.
    let mut pending = VecDeque::from([seed]);
    let mut total_known = false;

    while let Some(url) = pending.pop_front() {
        counters.start();
        let page = match fetch_with_retry(source, &url, budget).await {
            Ok(page) => page,
            Err(FetchError::Cancelled) => {
                counters.abandon();
                break;
            }
            Err(err) => {
                error!(stage = Stage::Fetch.label(), error = %err, "pagination walk aborted");
                counters.fail();
                budget.cancel();
                break;
            }
        };

        let links = page.link.as_deref().map(parse_link_header).unwrap_or_default();
        if !total_known {
            counters.raise_total(links.last_page.unwrap_or(1));
            total_known = true;
        }
        counters.finish();
        let fetched = counters.snapshot().completed;
        counters.raise_total(fetched);

        if !budget::send(&bodies, page.body, cancel).await {
            break;
        }
        progress.stage(Stage::Decode).discover(1);

        match links.next {
            Some(next) => pending.push_back(next),
            None => {
                let snapshot = counters.snapshot();
                info!(
                    stage = Stage::Fetch.label(),
                    pages = snapshot.completed,
                    errors = snapshot.errors,
                    "completed"
                );
            }
        }
    }
    // Dropping `bodies` here closes the output queue together with `pending`.
}

async fn fetch_with_retry(
    source: &dyn PageSource,
    url: &str,
    budget: &Budget,
) -> Result<FetchedPage, FetchError> {
    let cancel = budget.cancel_token();
    let mut attempt = 1;
    loop {
        let Some(permit) = budget.acquire().await else {
            return Err(FetchError::Cancelled);
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = source.fetch(url) => result,
        };
        drop(permit);

        match result {
            Ok(page) => return Ok(page),
            Err(err) if attempt >= MAX_FETCH_ATTEMPTS => {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => {
                debug!(
                    stage = Stage::Fetch.label(),
                    attempt,
                    url = %url,
                    error = %err,
                    "fetch attempt failed"
                );
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct ScriptedSource {
        pages: HashMap<String, (Option<String>, Vec<u8>)>,
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn page(mut self, url: &str, link: Option<&str>, body: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                (link.map(str::to_string), body.as_bytes().to_vec()),
            );
            self
        }

        fn failing(self, url: &str, times: u32) -> Self {
            self.failures.lock().unwrap().insert(url.to_string(), times);
            self
        }
    }

    impl PageSource for ScriptedSource {
        fn fetch<'a>(&'a self, url: &'a str) -> SourceFuture<'a, FetchedPage> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(url.to_string());
                if let Some(left) = self.failures.lock().unwrap().get_mut(url)
                    && *left > 0
                {
                    *left -= 1;
                    anyhow::bail!("connection reset");
                }
                let (link, body) = self
                    .pages
                    .get(url)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("404 for {url}"))?;
                Ok(FetchedPage {
                    link,
                    body: Box::new(body),
                })
            })
        }
    }

    async fn drain(source: ScriptedSource, seed: &str) -> (Vec<String>, Arc<PipelineProgress>, Budget) {
        let budget = Budget::new(2, CancellationToken::new());
        let progress = Arc::new(PipelineProgress::new());
        let (mut rx, handle) = spawn_fetcher(
            Arc::new(source),
            seed.to_string(),
            budget.clone(),
            Arc::clone(&progress),
            1,
        );
        let mut bodies = Vec::new();
        while let Some(body) = rx.recv().await {
            bodies.push(String::from_utf8(body.read_all().await.unwrap()).unwrap());
        }
        handle.await.unwrap();
        (bodies, progress, budget)
    }

    fn link(next: Option<u32>, last: u32) -> String {
        let mut parts = Vec::new();
        if let Some(next) = next {
            parts.push(format!("<https://api.test/repos?page={next}>; rel=\"next\""));
        }
        parts.push(format!("<https://api.test/repos?page={last}>; rel=\"last\""));
        parts.join(", ")
    }

    #[tokio::test]
    async fn follows_next_links_until_the_last_page() {
        let first = link(Some(2), 3);
        let second = link(Some(3), 3);
        let source = ScriptedSource::default()
            .page("https://api.test/repos", Some(&first), "[1]")
            .page("https://api.test/repos?page=2", Some(&second), "[2]")
            .page(
                "https://api.test/repos?page=3",
                Some("<https://api.test/repos?page=2>; rel=\"prev\""),
                "[3]",
            );

        let (bodies, progress, budget) = drain(source, "https://api.test/repos").await;
        assert_eq!(bodies, vec!["[1]", "[2]", "[3]"]);
        let fetch = progress.stage(Stage::Fetch).snapshot();
        assert_eq!(fetch.completed, 3);
        assert_eq!(fetch.total, 3);
        assert_eq!(fetch.active, 0);
        assert_eq!(progress.stage(Stage::Decode).snapshot().total, 3);
        assert!(!budget.cancel_token().is_cancelled());
        assert_eq!(budget.available(), 2);
    }

    #[tokio::test]
    async fn single_page_without_link_counts_one_page() {
        let source = ScriptedSource::default().page("https://api.test/one", None, "[]");
        let (bodies, progress, _) = drain(source, "https://api.test/one").await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(progress.stage(Stage::Fetch).snapshot().total, 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let source = ScriptedSource::default()
            .page("https://api.test/flaky", None, "[]")
            .failing("https://api.test/flaky", MAX_FETCH_ATTEMPTS - 1);
        let (bodies, progress, budget) = drain(source, "https://api.test/flaky").await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(progress.stage(Stage::Fetch).snapshot().errors, 0);
        assert!(!budget.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn exhausted_retries_abort_the_walk_and_cancel_the_run() {
        let first = link(Some(2), 2);
        let source = ScriptedSource::default()
            .page("https://api.test/repos", Some(&first), "[1]")
            .failing("https://api.test/repos?page=2", MAX_FETCH_ATTEMPTS);

        let budget = Budget::new(2, CancellationToken::new());
        let progress = Arc::new(PipelineProgress::new());
        let source = Arc::new(source);
        let (mut rx, handle) = spawn_fetcher(
            Arc::clone(&source) as Arc<dyn PageSource>,
            "https://api.test/repos".to_string(),
            budget.clone(),
            Arc::clone(&progress),
            4,
        );
        handle.await.unwrap();
        assert!(budget.cancel_token().is_cancelled());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());

        let fetch = progress.stage(Stage::Fetch).snapshot();
        assert_eq!(fetch.errors, 1);
        assert_eq!(fetch.active, 0);
        let calls = source.calls.lock().unwrap();
        let retries = calls
            .iter()
            .filter(|url| url.as_str() == "https://api.test/repos?page=2")
            .count();
        assert_eq!(retries, MAX_FETCH_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn cancelled_before_start_closes_output() {
        let source = ScriptedSource::default().page("https://api.test/one", None, "[]");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let budget = Budget::new(1, cancel);
        let progress = Arc::new(PipelineProgress::new());
        let (mut rx, handle) = spawn_fetcher(
            Arc::new(source),
            "https://api.test/one".to_string(),
            budget,
            Arc::clone(&progress),
            1,
        );
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
        assert_eq!(progress.stage(Stage::Fetch).snapshot().active, 0);
    }
}

use anyhow::Context;
use harvester_core::fetch::{FetchedPage, PageBody, PageSource, SourceFuture};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use tracing::debug;

const USER_AGENT: &str = "repo-harvester";
const ACCEPT: &str = "application/vnd.github+json";

/// Repository listing pages served by the GitHub REST API.
#[derive(Clone, Debug, Default)]
pub struct GitHubPages {
    client: Client,
}

impl GitHubPages {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, url: &str) -> anyhow::Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", ACCEPT)
            .send()
            .await
            .context("call GitHub list repos")?
            .error_for_status()
            .context("GitHub list repos status")?;
        let link = string_header(response.headers(), "link");
        debug!(url = %url, status = %response.status(), has_link = link.is_some(), "fetched page");
        Ok(FetchedPage {
            link,
            body: Box::new(ResponseBody(response)),
        })
    }
}

impl PageSource for GitHubPages {
    fn fetch<'a>(&'a self, url: &'a str) -> SourceFuture<'a, FetchedPage> {
        Box::pin(self.get(url))
    }
}

/// Body left unread on the response until the decoder asks for it.
struct ResponseBody(Response);

impl PageBody for ResponseBody {
    fn read_all(self: Box<Self>) -> SourceFuture<'static, Vec<u8>> {
        Box::pin(async move {
            let bytes = self.0.bytes().await.context("read repos response")?;
            Ok(bytes.to_vec())
        })
    }
}

pub(crate) fn string_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

use crate::aggregate::{EmailSet, GroupedEmails};
use crate::report::{build_report, render_email_list, render_report};
use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const MAX_WRITE_ATTEMPTS: u32 = 4;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteStatus {
    Written,
    NothingToWrite,
}

pub async fn write_with_retry(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let mut attempt = 1;
    loop {
        match tokio::fs::write(path, data).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= MAX_WRITE_ATTEMPTS => {
                return Err(err).with_context(|| format!("write {}", path.display()));
            }
            Err(err) => {
                debug!(path = %path.display(), attempt, error = %err, "write failed; retrying");
                attempt += 1;
                tokio::time::sleep(WRITE_RETRY_DELAY).await;
            }
        }
    }
}

pub async fn write_email_list(path: &Path, emails: &EmailSet) -> anyhow::Result<WriteStatus> {
    if emails.is_empty() {
        info!(path = %path.display(), "no emails found; nothing to write");
        return Ok(WriteStatus::NothingToWrite);
    }
    write_with_retry(path, render_email_list(emails).as_bytes()).await?;
    Ok(WriteStatus::Written)
}

pub async fn write_report(path: &Path, grouped: &GroupedEmails) -> anyhow::Result<WriteStatus> {
    if grouped.is_empty() {
        info!(path = %path.display(), "no repo identities found; nothing to write");
        return Ok(WriteStatus::NothingToWrite);
    }
    let data = render_report(&build_report(grouped)).context("serialize report")?;
    write_with_retry(path, &data).await?;
    Ok(WriteStatus::Written)
}

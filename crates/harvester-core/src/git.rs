use crate::model::Role;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type GitFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GitError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git interrupted by cancellation")]
    Interrupted,
    #[error("git terminated without an exit code: {stderr}")]
    Killed { stderr: String },
    #[error("git exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

impl GitError {
    /// True when the process ended because the run was cancelled, not because git failed.
    pub fn is_interruption(&self) -> bool {
        matches!(self, GitError::Interrupted | GitError::Killed { .. })
    }
}

pub trait GitRunner: Send + Sync {
    /// Clones `clone_url` without checkout into a directory under `working_dir`.
    fn clone_repo<'a>(
        &'a self,
        clone_url: &'a str,
        working_dir: &'a Path,
        cancel: &'a CancellationToken,
    ) -> GitFuture<'a, ()>;

    /// Returns the raw `<count>\t<name> <<email>>` summary for one role.
    fn shortlog<'a>(
        &'a self,
        repo_path: &'a Path,
        role: Role,
        cancel: &'a CancellationToken,
    ) -> GitFuture<'a, String>;
}

pub fn clone_args(clone_url: &str) -> Vec<&str> {
    vec!["clone", "-n", "-q", clone_url]
}

pub fn shortlog_args(role: Role) -> Vec<&'static str> {
    let mut args = vec!["--no-pager", "shortlog", "--all", "-n", "-e", "-s"];
    if role == Role::Committer {
        args.push("-c");
    }
    args
}

#[derive(Clone, Debug)]
pub struct GitCli {
    git_path: PathBuf,
}

impl GitCli {
    pub fn new(git_path: impl Into<PathBuf>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    async fn run(
        &self,
        args: &[&str],
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, GitError> {
        debug!(dir = %dir.display(), args = ?args, "running git");
        let child = Command::new(&self.git_path)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on cancellation kills the child.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GitError::Interrupted),
            output = child.wait_with_output() => output?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        match output.status.code() {
            Some(code) => Err(GitError::Failed { code, stderr }),
            None => Err(GitError::Killed { stderr }),
        }
    }
}

impl GitRunner for GitCli {
    fn clone_repo<'a>(
        &'a self,
        clone_url: &'a str,
        working_dir: &'a Path,
        cancel: &'a CancellationToken,
    ) -> GitFuture<'a, ()> {
        Box::pin(async move {
            self.run(&clone_args(clone_url), working_dir, cancel)
                .await
                .map(|_| ())
        })
    }

    fn shortlog<'a>(
        &'a self,
        repo_path: &'a Path,
        role: Role,
        cancel: &'a CancellationToken,
    ) -> GitFuture<'a, String> {
        Box::pin(async move { self.run(&shortlog_args(role), repo_path, cancel).await })
    }
}

/// Looks `program` up on `PATH` the way a shell would.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    let names: Vec<String> = if cfg!(windows) {
        vec![format!("{program}.exe"), program.to_string()]
    } else {
        vec![program.to_string()]
    };
    std::env::split_paths(&paths)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

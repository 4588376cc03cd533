use super::*;
use std::fs::OpenOptions;

pub(super) fn resolve_working_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .context("working directory not provided and the current directory is unavailable")?;
    let path = cwd.join("working_dir");
    info!(path = %path.display(), "working directory not provided; using default");
    Ok(path)
}

pub(super) fn resolve_git_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let found = find_on_path("git")
                .context("git path not provided and could not find `git` in the PATH")?;
            info!(path = %found.display(), "git path not provided; using PATH lookup");
            found
        }
    };
    std::path::absolute(&path).with_context(|| format!("resolve git path {}", path.display()))
}

/// Creates the clone root if needed and refuses to reuse one that has content.
pub(super) fn prepare_working_dir(path: &Path) -> anyhow::Result<()> {
    create_private_dir(path).with_context(|| format!("cannot use {}", path.display()))?;
    let mut entries =
        std::fs::read_dir(path).with_context(|| format!("cannot read {}", path.display()))?;
    if entries.next().is_some() {
        anyhow::bail!("{} is not empty", path.display());
    }
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Claims an output path up front so a bad location fails before any work.
pub(super) fn reserve_output(path: &Path) -> anyhow::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("could not create {}", path.display()))?;
    Ok(())
}

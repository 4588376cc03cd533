pub const GITHUB_API_HOST: &str = "https://api.github.com";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    User,
    Org,
    /// The target is already a full listing URL.
    Url,
}

/// Builds the first listing URL for a target.
pub fn seed_url(kind: TargetKind, target: &str) -> String {
    repos_url(GITHUB_API_HOST, kind, target)
}

pub(crate) fn repos_url(host: &str, kind: TargetKind, target: &str) -> String {
    let host = host.trim_end_matches('/');
    match kind {
        TargetKind::User => format!("{host}/users/{target}/repos?per_page=100"),
        TargetKind::Org => format!("{host}/orgs/{target}/repos?per_page=100"),
        TargetKind::Url => target.to_string(),
    }
}

pub mod github_scope;
pub mod http;

pub use github_scope::{TargetKind, seed_url};
pub use http::GitHubPages;

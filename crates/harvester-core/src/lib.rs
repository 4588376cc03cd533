pub mod aggregate;
pub mod budget;
pub mod cloner;
pub mod config;
pub mod decode;
pub mod extract;
pub mod fetch;
pub mod git;
pub mod model;
pub mod output;
pub mod paging;
pub mod pipeline;
pub mod progress;
pub mod report;

pub use tokio_util::sync::CancellationToken;

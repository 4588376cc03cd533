use crate::logging::{self, Verbosity};
use anyhow::Context;
use clap::{ArgGroup, Parser, ValueEnum};
use harvester_core::CancellationToken;
use harvester_core::config::{DEFAULT_QUEUE_SIZE, DEFAULT_SIZE_FILTER_KB, DEFAULT_WORKERS, PipelineOptions};
use harvester_core::git::{GitCli, find_on_path};
use harvester_core::output::{WriteStatus, write_email_list, write_report};
use harvester_core::pipeline::HarvestPipeline;
use harvester_core::progress::{ProgressSnapshot, render_table};
use harvester_providers::{GitHubPages, TargetKind, seed_url};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod app;
mod args;
mod checks;

use args::*;
use checks::*;

pub async fn run() -> anyhow::Result<()> {
    app::run().await
}

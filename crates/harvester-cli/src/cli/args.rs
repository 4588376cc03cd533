use super::*;

#[derive(Debug, Parser)]
#[command(
    name = "repo-harvester",
    author,
    version,
    about = "Collect contributor emails from every repository of a GitHub user or org"
)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["target_type", "org", "user", "url"])
))]
pub(super) struct Cli {
    #[arg(
        value_name = "TARGET_NAME",
        help = "User or org name, or the full listing URL with --url"
    )]
    pub(super) target_name: String,

    #[arg(short = 't', long = "type", value_enum, help = "Kind of target")]
    pub(super) target_type: Option<TargetTypeValue>,
    #[arg(short, long, help = "Target is an org")]
    pub(super) org: bool,
    #[arg(short, long, help = "Target is a user")]
    pub(super) user: bool,
    #[arg(long, help = "Target is a full repository listing URL")]
    pub(super) url: bool,
    #[arg(
        long,
        value_name = "KB",
        default_value_t = DEFAULT_SIZE_FILTER_KB,
        help = "Skip cloning repos larger than this many kB; 0 disables"
    )]
    pub(super) size_filter: u64,
    #[arg(long, help = "Skip forked repositories")]
    pub(super) no_fork: bool,

    #[arg(short = 'j', long = "json", value_name = "FILE", help = "JSON report path")]
    pub(super) json_file: PathBuf,
    #[arg(short = 'f', long = "file", value_name = "FILE", help = "Email list path")]
    pub(super) list_file: PathBuf,

    #[arg(short, long, conflicts_with = "quiet", help = "Debug logging")]
    pub(super) verbose: bool,
    #[arg(short, long, help = "Only log errors")]
    pub(super) quiet: bool,
    #[arg(long, help = "Keep the working directory after the run")]
    pub(super) preserve_dir: bool,
    #[arg(short, long, value_name = "DIR", help = "Clone root [default: ./working_dir]")]
    pub(super) working_dir: Option<PathBuf>,
    #[arg(short, long, value_name = "PATH", help = "git binary [default: git on PATH]")]
    pub(super) git_path: Option<PathBuf>,

    #[arg(
        long,
        allow_negative_numbers = true,
        default_value_t = DEFAULT_WORKERS as i64,
        help = "Concurrent outbound operations"
    )]
    pub(super) workers: i64,
    #[arg(
        long,
        allow_negative_numbers = true,
        default_value_t = DEFAULT_QUEUE_SIZE as i64,
        help = "Capacity of each stage queue"
    )]
    pub(super) queue_size: i64,
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between progress tables"
    )]
    pub(super) report_interval: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(super) enum TargetTypeValue {
    User,
    Org,
    Url,
}

impl From<TargetTypeValue> for TargetKind {
    fn from(value: TargetTypeValue) -> Self {
        match value {
            TargetTypeValue::User => TargetKind::User,
            TargetTypeValue::Org => TargetKind::Org,
            TargetTypeValue::Url => TargetKind::Url,
        }
    }
}

impl Cli {
    pub(super) fn target_kind(&self) -> anyhow::Result<TargetKind> {
        if self.user {
            return Ok(TargetKind::User);
        }
        if self.org {
            return Ok(TargetKind::Org);
        }
        if self.url {
            return Ok(TargetKind::Url);
        }
        self.target_type
            .map(TargetKind::from)
            .context("provide one of --user, --org, --url or --type <user|org|url>")
    }

    pub(super) fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    pub(super) fn pipeline_options(&self, working_dir: PathBuf) -> PipelineOptions {
        PipelineOptions::from_raw(
            self.workers,
            self.queue_size,
            self.size_filter,
            self.no_fork,
            working_dir,
        )
    }
}

use super::*;

const START_MARKER: &str = "=====START=====";
const END_MARKER: &str = "=====END=====";
const COMPLETED_MARKER: &str = "=====COMPLETED=====";

pub(super) async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbosity());
    harvest(cli).await
}

async fn harvest(cli: Cli) -> anyhow::Result<()> {
    let target = cli.target_kind()?;
    let working_dir = resolve_working_dir(cli.working_dir.clone())?;
    let git_path = resolve_git_path(cli.git_path.clone())?;
    let options = cli.pipeline_options(working_dir.clone());
    if !options.size_filter_enabled() {
        info!("disabling size filter for cloning");
    }

    prepare_working_dir(&working_dir)?;
    reserve_output(&cli.list_file)?;
    reserve_output(&cli.json_file)?;

    let seed = seed_url(target, &cli.target_name);
    let pipeline = HarvestPipeline::new(
        Arc::new(GitHubPages::new()),
        Arc::new(GitCli::new(git_path)),
        options,
    );

    let cancel = CancellationToken::new();
    let listener = spawn_interrupt_listener(cancel.clone());
    info!(target = %cli.target_name, "starting");
    let handle = pipeline.spawn(seed, cancel.clone());
    let progress = handle.progress();
    let outcome = handle
        .wait_with_progress(Duration::from_secs(cli.report_interval), |snapshot| {
            print!("{}", progress_block(START_MARKER, END_MARKER, &snapshot));
        })
        .await?;
    listener.abort();
    print!(
        "{}",
        progress_block(COMPLETED_MARKER, COMPLETED_MARKER, &progress.snapshot())
    );
    if outcome.cancelled {
        warn!("run was cancelled; writing what was collected");
    }

    let (list, report) = tokio::join!(
        write_email_list(&cli.list_file, &outcome.emails),
        write_report(&cli.json_file, &outcome.grouped),
    );
    let mut failed = 0;
    for (path, result) in [(&cli.list_file, list), (&cli.json_file, report)] {
        match result {
            Ok(WriteStatus::Written) => info!(path = %path.display(), "successfully wrote output"),
            Ok(WriteStatus::NothingToWrite) => {}
            Err(err) => {
                let message = format!("{err:#}");
                error!(path = %path.display(), error = %message, "could not write output");
                failed += 1;
            }
        }
    }

    if !cli.preserve_dir {
        info!(path = %working_dir.display(), "clearing working directory");
        tokio::fs::remove_dir_all(&working_dir)
            .await
            .with_context(|| format!("could not clear {}", working_dir.display()))?;
    }
    if failed > 0 {
        anyhow::bail!("{failed} output file(s) could not be written");
    }
    Ok(())
}

fn spawn_interrupt_listener(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    warn!("interrupt received; stopping pipeline");
                    cancel.cancel();
                }
                Err(err) => warn!(error = %err, "could not listen for interrupts"),
            },
            _ = cancel.cancelled() => {}
        }
    })
}

pub(super) fn progress_block(start: &str, end: &str, snapshot: &ProgressSnapshot) -> String {
    format!("{start}\n{}{end}\n", render_table(snapshot))
}

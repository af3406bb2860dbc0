//! `runstream upload`: stream one run directory to a DNAnexus project.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use runstream_core::duration::parse_run_duration;
use runstream_core::notify_state::default_state_dir;
use runstream_core::{CompletionStyle, DownstreamTarget, LaneLayout, SystemClock};
use runstream_orchestrator::preflight::check_sizes;
use runstream_orchestrator::{
    init_tracing, parse_downstream_input, LaneSummary, Orchestrator,
    OrchestratorError, Outcome, Reporter, RunLock, RunReport, UploadConfig,
};
use runstream_platform::dx::DEFAULT_API_URL;
use runstream_platform::{DxPlatform, SlackNotifier, SlackSettings};
use runstream_sync::{ExternalSynchronizer, SyncSettings, Uploader};

/// Arguments for `runstream upload`.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// API token to authenticate against the DNAnexus platform.
    #[arg(short = 'a', long, env = "DX_API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    /// Project id to upload the run directory to.
    #[arg(short = 'p', long)]
    pub project: String,

    /// Local path to the run directory.
    #[arg(short = 'r', long)]
    pub run_dir: PathBuf,

    /// Local directory where temporary TAR archives are created.
    #[arg(short = 't', long)]
    pub temp_dir: PathBuf,

    /// Local directory for the per-lane synchronizer logs.
    #[arg(short = 'L', long)]
    pub log_dir: PathBuf,

    /// Upload BCL files sorted by lane (2 or 8).
    #[arg(short = 'l', long, value_parser = ["2", "8"])]
    pub num_lanes: Option<String>,

    /// Minimum age (seconds) of files to be tarred and uploaded.
    #[arg(short = 'm', long, default_value_t = 1000)]
    pub min_age: u64,

    /// Minimum size (MB) of a TAR before it is uploaded.
    #[arg(short = 'z', long, default_value_t = 100)]
    pub min_size: u64,

    /// Maximum size (MB) of a TAR.
    #[arg(short = 'M', long, default_value_t = 10_000)]
    pub max_size: u64,

    /// Seconds between scans of the run directory.
    #[arg(short = 'i', long, default_value_t = 1800)]
    pub sync_interval: u64,

    /// Expected run duration; suffixes s, m, h, d, w, M, y.
    #[arg(short = 'D', long, default_value = "24h")]
    pub run_duration: String,

    /// Number of run-duration intervals to wait for the run to complete.
    #[arg(short = 'I', long, default_value_t = 3)]
    pub intervals_to_wait: u32,

    /// Upload thumbnail images as well as BCL files.
    #[arg(short = 'U', long)]
    pub upload_thumbnails: bool,

    /// Upload threads used by the synchronizer.
    #[arg(short = 'u', long, default_value_t = 8)]
    pub upload_threads: u32,

    /// Attempts per synchronization before the run fails (at least 1).
    #[arg(short = 'R', long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: u32,

    /// Executable run locally after a successful upload, given the run directory.
    #[arg(short = 's', long)]
    pub script: Option<PathBuf>,

    /// JSON object of inputs for the downstream applet or workflow.
    #[arg(short = 'N', long)]
    pub downstream_input: Option<String>,

    /// Delay samplesheet upload until the run data is uploaded.
    #[arg(short = 'S', long)]
    pub samplesheet_delay: bool,

    /// Extra name patterns to exclude from upload.
    #[arg(short = 'x', long, num_args = 0..)]
    pub exclude_patterns: Vec<String>,

    /// NovaSeq-style run: wait for CopyComplete.txt.
    #[arg(short = 'n', long)]
    pub novaseq: bool,

    /// Sequencer id, keeps lock and notification state per instrument.
    #[arg(long, alias = "sequencer_id", default_value = "")]
    pub sequencer_id: String,

    /// Upload with the Python SDK instead of the upload agent.
    #[arg(short = 'd', long, conflicts_with = "verbose")]
    pub dxpy_upload: bool,

    /// Run the upload agent in verbose mode.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Applet to run per lane after upload.
    #[arg(short = 'A', long, conflicts_with = "workflow")]
    pub applet: Option<String>,

    /// Workflow to run per lane after upload.
    #[arg(short = 'w', long)]
    pub workflow: Option<String>,

    /// Synchronizer executable.
    #[arg(long, default_value = "dx_sync_directory")]
    pub sync_executable: PathBuf,

    /// DNAnexus API server.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Directory for lock and notification state (default ~/.runstream).
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Log as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Print the final lane summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl UploadArgs {
    pub fn run(self) -> Result<ExitCode> {
        init_tracing(self.json_logs);

        let notifier = SlackNotifier::new(SlackSettings::from_env(), self.sequencer_id.clone());
        let reporter = Reporter::new(&notifier);
        let label = self.label();

        check_sizes(self.min_size, self.max_size)
            .map_err(|msg| reporter.fatal(&label, msg, false))?;
        let run_duration = parse_run_duration(&self.run_duration)
            .map_err(|err| reporter.fatal(&label, err.to_string(), true))?;
        let downstream_input = parse_downstream_input(self.downstream_input.as_deref())
            .map_err(|msg| reporter.fatal(&label, msg, true))?;

        let config = self.config(run_duration, downstream_input)?;
        let _lock = match RunLock::acquire(&config.state_dir, &config.sequencer_id) {
            Ok(lock) => lock,
            Err(OrchestratorError::LockHeld { path }) => {
                return Err(reporter
                    .fatal(
                        &label,
                        format!("another upload is already running (lock held: {})", path.display()),
                        false,
                    )
                    .into());
            }
            Err(err) => return Err(err).context("failed to take the run lock"),
        };

        let platform = DxPlatform::new(&self.api_url, &self.api_token);
        let synchronizer = ExternalSynchronizer::new(config.sync.clone());
        let outcome = Orchestrator {
            config: &config,
            platform: &platform,
            synchronizer: &synchronizer,
            notifier: &notifier,
            clock: &SystemClock,
        }
        .run()?;

        print_report(outcome.report(), self.json)?;
        Ok(match outcome {
            Outcome::AlreadyUploaded(_) => {
                eprintln!("EXITING: All lanes already uploaded");
                ExitCode::from(1)
            }
            Outcome::Streamed(_) => ExitCode::SUCCESS,
        })
    }

    fn label(&self) -> String {
        if !self.sequencer_id.trim().is_empty() {
            return self.sequencer_id.clone();
        }
        self.run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn config(
        &self,
        run_duration: Duration,
        downstream_input: serde_json::Map<String, serde_json::Value>,
    ) -> Result<UploadConfig> {
        let lanes = LaneLayout::from_count(
            self.num_lanes
                .as_deref()
                .map(str::parse::<u8>)
                .transpose()
                .context("invalid lane count")?,
        )?;
        let downstream = DownstreamTarget::from_options(self.applet.clone(), self.workflow.clone())
            .context("--applet and --workflow are mutually exclusive")?;
        let uploader = match (self.dxpy_upload, self.verbose) {
            (true, _) => Uploader::Dxpy,
            (false, true) => Uploader::UploadAgentVerbose,
            (false, false) => Uploader::UploadAgent,
        };
        let state_dir = match &self.state_dir {
            Some(dir) => absolute(dir)?,
            None => default_state_dir()?,
        };

        Ok(UploadConfig {
            sync: SyncSettings {
                executable: self.sync_executable.clone(),
                run_dir: absolute(&self.run_dir)?,
                temp_dir: absolute(&self.temp_dir)?,
                project: self.project.clone(),
                auth_token: self.api_token.clone(),
                min_size_mb: self.min_size,
                max_size_mb: self.max_size,
                upload_threads: self.upload_threads,
                min_age_secs: self.min_age,
                exclude_patterns: self.exclude_patterns.clone(),
                upload_thumbnails: self.upload_thumbnails,
                samplesheet_delay: self.samplesheet_delay,
                uploader,
            },
            log_dir: absolute(&self.log_dir)?,
            lanes,
            sync_interval: Duration::from_secs(self.sync_interval),
            run_duration,
            intervals_to_wait: self.intervals_to_wait,
            retries: self.retries,
            script: self.script.clone(),
            downstream,
            downstream_input,
            completion: CompletionStyle::from_novaseq(self.novaseq),
            sequencer_id: self.sequencer_id.clone(),
            state_dir,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    Ok(cwd.join(path))
}

// ---------------------------------------------------------------------------
// Summary output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReportJson<'a> {
    run_id: &'a str,
    lanes: Vec<LaneSummary>,
    jobs: &'a [runstream_orchestrator::DispatchedJob],
    downstream_skipped: Option<&'a str>,
    elapsed_secs: u64,
}

#[derive(Tabled)]
struct LaneRow {
    #[tabled(rename = "lane")]
    lane: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "archives")]
    archives: usize,
    #[tabled(rename = "sentinel")]
    sentinel: String,
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let payload = ReportJson {
            run_id: &report.run_id.0,
            lanes: report.lane_summaries(),
            jobs: &report.jobs,
            downstream_skipped: report.downstream_skipped.as_deref(),
            elapsed_secs: report.elapsed.as_secs(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize run report")?
        );
        return Ok(());
    }

    println!("Run {}", report.run_id.0.bold());
    let rows: Vec<LaneRow> = report
        .lane_summaries()
        .into_iter()
        .map(|s| LaneRow {
            lane: s.lane,
            state: match s.state {
                "closed" => s.state.green().to_string(),
                "already uploaded" => s.state.yellow().to_string(),
                other => other.red().to_string(),
            },
            archives: s.archives,
            sentinel: s.sentinel.unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for job in &report.jobs {
        println!("Lane {}: started {} in {}", job.lane, job.job_id, job.folder);
    }
    if let Some(reason) = &report.downstream_skipped {
        println!("{} downstream analysis not started: {reason}", "!".yellow());
    }
    Ok(())
}

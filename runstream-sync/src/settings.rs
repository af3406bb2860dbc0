//! Argument contract of the external synchronizer.

use std::path::PathBuf;

use runstream_core::{Lane, LaneLabel};

/// Run configuration files every per-lane upload carries alongside its BCLs.
pub const CONFIG_FILES: [&str; 5] = [
    "RTAConfiguration.xml",
    "RunInfo.xml",
    "RunParameters.xml",
    "config.xml",
    "s.locs",
];

/// Upload backend the synchronizer uses internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Uploader {
    /// Upload agent, quiet.
    #[default]
    UploadAgent,
    /// Upload agent with `--verbose`.
    UploadAgentVerbose,
    /// Python SDK uploads instead of the upload agent.
    Dxpy,
}

/// Everything the synchronizer needs besides the lane itself.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub executable: PathBuf,
    pub run_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub project: String,
    pub auth_token: String,
    pub min_size_mb: u64,
    pub max_size_mb: u64,
    pub upload_threads: u32,
    /// Files younger than this are left for a later pass (non-finish only).
    pub min_age_secs: u64,
    pub exclude_patterns: Vec<String>,
    pub upload_thumbnails: bool,
    pub samplesheet_delay: bool,
    pub uploader: Uploader,
}

impl SyncSettings {
    /// Config files plus the lane's `s_<n>_` tile prefix; nothing for `all`.
    pub fn include_patterns(&self, label: LaneLabel) -> Vec<String> {
        match label {
            LaneLabel::All => Vec::new(),
            LaneLabel::Numbered(n) => CONFIG_FILES
                .iter()
                .map(|f| f.to_string())
                .chain(std::iter::once(format!("s_{n}_")))
                .collect(),
        }
    }

    pub fn exclude_patterns(&self) -> Vec<String> {
        let mut patterns = self.exclude_patterns.clone();
        if !self.upload_thumbnails {
            patterns.push("Images".to_string());
        }
        if self.samplesheet_delay {
            patterns.push("SampleSheet.csv".to_string());
        }
        patterns
    }

    /// Full argument vector for one invocation (program name excluded).
    pub fn args_for(&self, lane: &Lane, finish: bool) -> Vec<String> {
        let mut args = vec![
            "--log-file".to_string(),
            lane.log_path.display().to_string(),
            "--tar-destination".to_string(),
            format!("{}:{}", self.project, lane.remote_folder),
            "--tar-directory".to_string(),
            self.temp_dir.display().to_string(),
            "--include-patterns".to_string(),
        ];
        args.extend(self.include_patterns(lane.label));
        args.push("--exclude-patterns".to_string());
        args.extend(self.exclude_patterns());
        args.extend([
            "--min-tar-size".to_string(),
            self.min_size_mb.to_string(),
            "--max-tar-size".to_string(),
            self.max_size_mb.to_string(),
            "--upload-threads".to_string(),
            self.upload_threads.to_string(),
            "--prefix".to_string(),
            lane.prefix.clone(),
            "--auth-token".to_string(),
            self.auth_token.clone(),
        ]);
        match self.uploader {
            Uploader::UploadAgent => {}
            Uploader::UploadAgentVerbose => args.push("--verbose".to_string()),
            Uploader::Dxpy => args.push("--dxpy-upload".to_string()),
        }
        if finish {
            args.push("--finish".to_string());
        } else {
            args.extend(["--min-age".to_string(), self.min_age_secs.to_string()]);
        }
        args.push(self.run_dir.display().to_string());
        args
    }
}

/// Render an argument vector for logs with the auth token masked.
pub fn redacted(args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("********".to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "--auth-token";
        out.push(arg.clone());
    }
    out.join(" ")
}

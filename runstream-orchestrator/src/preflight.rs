//! Eager configuration checks, run before any upload work.

use std::path::Path;

use runstream_platform::StoragePlatform;
use runstream_sync::Synchronizer;

use crate::config::UploadConfig;
use crate::error::FatalError;
use crate::fatal::Reporter;

/// Facts learned while validating that later phases reuse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preflight {
    /// Display title of the downstream applet or workflow.
    pub executable_title: Option<String>,
}

/// Archive size bounds must be ordered. Not alerted: nothing is known about
/// the run yet.
pub fn check_sizes(min_mb: u64, max_mb: u64) -> Result<(), String> {
    if min_mb > max_mb {
        return Err(format!(
            "min size ({min_mb} MB) must not be larger than max size ({max_mb} MB)"
        ));
    }
    Ok(())
}

/// Remote and local checks, in order: archive sizes, project, downstream
/// executable, post-success script, synchronizer. The first failure is fatal.
pub fn validate(
    config: &UploadConfig,
    platform: &dyn StoragePlatform,
    synchronizer: &dyn Synchronizer,
    reporter: &Reporter<'_>,
) -> Result<Preflight, FatalError> {
    let label = config.fallback_label();

    check_sizes(config.sync.min_size_mb, config.sync.max_size_mb)
        .map_err(|msg| reporter.fatal(&label, msg, false))?;

    if let Err(err) = platform.describe_project(config.project()) {
        let message = match err.api_kind() {
            Some("InvalidAuthentication") => format!("Invalid authentication token: {err}"),
            Some("PermissionDenied") => format!(
                "Project {} is not accessible with the given token: {err}",
                config.project()
            ),
            _ => format!("Could not describe project {}: {err}", config.project()),
        };
        return Err(reporter.fatal(&label, message, true));
    }

    let mut preflight = Preflight::default();
    if let Some(id) = config.downstream.executable_id() {
        let title = platform.executable_title(id).map_err(|err| {
            reporter.fatal(
                &label,
                format!(
                    "Unable to resolve {} {id}: {err}",
                    config.downstream.kind()
                ),
                true,
            )
        })?;
        preflight.executable_title = Some(title);
    }

    if let Some(script) = &config.script {
        if !is_executable(script) {
            return Err(reporter.fatal(
                &label,
                format!("Script {} is not an executable file", script.display()),
                true,
            ));
        }
    }

    synchronizer.check_available().map_err(|err| {
        reporter.fatal(&label, format!("Synchronizer is not usable: {err}"), true)
    })?;

    tracing::info!(
        project = config.project(),
        downstream = config.downstream.kind(),
        "configuration validated"
    );
    Ok(preflight)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

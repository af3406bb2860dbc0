//! Samplesheet discovery and reconciliation.
//!
//! Candidates are files in the run root whose name matches
//! `sample[-_ ]?sheet….csv` case-insensitively. Zero candidates is allowed;
//! several candidates are accepted only when they are byte-identical copies of
//! the first one. The first candidate is the first in directory-listing order,
//! which is filesystem-dependent: it is a tie-break between identical files,
//! not a statement about which file is "right".

use std::path::Path;

use regex::Regex;
use similar::TextDiff;

use crate::error::{io_err, CoreError};

const SAMPLESHEET_PATTERN: &str = r"(?i)sample[-_ ]?sheet.*\.csv$";
const DIFF_PREVIEW_LINES: usize = 40;

/// Outcome of samplesheet reconciliation for a run directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    /// File name (relative to the run directory) to upload, if any.
    pub selected: Option<String>,
    /// Conflicting samplesheets: downstream jobs must not be launched.
    pub halt_downstream: bool,
    /// Every matching file, in listing order.
    pub candidates: Vec<String>,
    /// Message for the alert channel when the result needs attention.
    pub alert: Option<String>,
    /// Unified diff between the first candidate and the first differing one.
    pub conflict_diff: Option<String>,
}

/// Names of samplesheet candidates in `run_dir`, in directory-listing order.
pub fn find_candidates(run_dir: &Path) -> Result<Vec<String>, CoreError> {
    let pattern = Regex::new(SAMPLESHEET_PATTERN).map_err(|e| {
        io_err(run_dir, std::io::Error::other(format!("bad samplesheet pattern: {e}")))
    })?;
    let mut names = Vec::new();
    for entry in std::fs::read_dir(run_dir).map_err(|e| io_err(run_dir, e))? {
        let entry = entry.map_err(|e| io_err(run_dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| io_err(entry.path(), e))?
            .is_file();
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && pattern.is_match(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Byte-exact content comparison.
pub fn identical(a: &Path, b: &Path) -> Result<bool, CoreError> {
    let left = std::fs::read(a).map_err(|e| io_err(a, e))?;
    let right = std::fs::read(b).map_err(|e| io_err(b, e))?;
    Ok(left == right)
}

/// Reconcile the samplesheets of `run_dir` using byte-exact comparison.
pub fn reconcile(run_dir: &Path) -> Result<Reconciliation, CoreError> {
    reconcile_with(run_dir, identical)
}

/// Reconcile with a caller-supplied comparison. `same` is called once per
/// additional candidate, in listing order, until one differs.
pub fn reconcile_with<F>(run_dir: &Path, mut same: F) -> Result<Reconciliation, CoreError>
where
    F: FnMut(&Path, &Path) -> Result<bool, CoreError>,
{
    let candidates = find_candidates(run_dir)?;

    let Some(first) = candidates.first().cloned() else {
        return Ok(Reconciliation {
            alert: Some(format!(
                "No samplesheet found in {}. Continuing upload without a samplesheet.",
                run_dir.display()
            )),
            ..Reconciliation::default()
        });
    };

    let first_path = run_dir.join(&first);
    for other in &candidates[1..] {
        let other_path = run_dir.join(other);
        if !same(&first_path, &other_path)? {
            return Ok(Reconciliation {
                selected: None,
                halt_downstream: true,
                alert: Some(format!(
                    "Multiple samplesheets with differing contents found: {}. \
                     Downstream analysis will not be started for this run.",
                    candidates.join(", ")
                )),
                conflict_diff: diff_preview(&first_path, &other_path),
                candidates,
            });
        }
    }

    Ok(Reconciliation {
        selected: Some(first),
        halt_downstream: false,
        candidates,
        alert: None,
        conflict_diff: None,
    })
}

/// Truncated unified diff of two text files; `None` when either is not UTF-8.
fn diff_preview(a: &Path, b: &Path) -> Option<String> {
    let left = std::fs::read_to_string(a).ok()?;
    let right = std::fs::read_to_string(b).ok()?;
    let name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    let diff = TextDiff::from_lines(&left, &right)
        .unified_diff()
        .context_radius(1)
        .header(&name(a), &name(b))
        .to_string();
    let mut lines: Vec<&str> = diff.lines().take(DIFF_PREVIEW_LINES + 1).collect();
    if lines.len() > DIFF_PREVIEW_LINES {
        lines.truncate(DIFF_PREVIEW_LINES);
        lines.push("…");
    }
    Some(lines.join("\n"))
}

//! Disk and timing figures for the start and success notifications.

use std::path::Path;
use std::time::Duration;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Usage of the filesystem holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
}

impl DiskUsage {
    pub fn of(path: &Path) -> Option<Self> {
        let total = fs2::total_space(path).ok()?;
        let available = fs2::available_space(path).ok()?;
        Some(Self {
            total,
            used: total.saturating_sub(available),
        })
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 / self.total as f64 * 100.0
    }
}

/// `<used>/<total> GB (<pct>%)`, or `unknown` when the figures are missing.
pub fn format_usage(usage: Option<DiskUsage>) -> String {
    match usage {
        Some(u) => format!(
            "{:.2}/{:.2} GB ({:.2}%)",
            u.used as f64 / GIB,
            u.total as f64 / GIB,
            u.percent()
        ),
        None => "unknown".to_string(),
    }
}

/// `<h>h<m>m`, minutes rounded up.
pub fn format_upload_time(elapsed: Duration) -> String {
    let minutes = elapsed.as_secs().div_ceil(60);
    format!("{}h{}m", minutes / 60, minutes % 60)
}

/// Total size of regular files under `dir`. Symlinks are not followed and
/// unreadable entries are skipped.
pub fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(t) if t.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

pub fn format_gb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / GIB)
}

//! Post-upload cycle-consistency check.
//!
//! An instrument fault can stop a run early while still writing the terminal
//! marker, so the upload "succeeds" with missing cycles. The expected cycle
//! count comes from `RunInfo.xml`; the observed count per lane is the highest
//! `C<cycle>.<n>` directory under `Data/Intensities/BaseCalls/<lane>/`.
//!
//! Only the maximum is compared. Gaps below the maximum are not detected.

use std::path::Path;

use regex::Regex;
use serde::Serialize;

use crate::error::{io_err, CoreError};

/// Cycle directories live under `<run_dir>/<CYCLE_ROOT>/<lane>/`.
pub const CYCLE_ROOT: &str = "Data/Intensities/BaseCalls";

/// Highest cycle directory found for one lane directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneCycles {
    pub lane: String,
    pub max_cycle: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub expected: u32,
    pub lanes: Vec<LaneCycles>,
}

impl CycleReport {
    /// Every lane reached the expected cycle. A run with no lane directories
    /// at all is not considered complete.
    pub fn is_complete(&self) -> bool {
        !self.lanes.is_empty() && self.lanes.iter().all(|l| l.max_cycle == self.expected)
    }

    /// Alert text listing each lane's highest cycle.
    pub fn describe_mismatch(&self) -> String {
        let mut message = format!(
            "Total sequencing cycles do not appear to have completed.\n\
             Expected cycles: *{}*\n\nCycles found:\n",
            self.expected
        );
        if self.lanes.is_empty() {
            message.push_str("\tno lane directories found\n");
        }
        for lane in &self.lanes {
            message.push_str(&format!("\t{}\t:\t{}\n", lane.lane, lane.max_cycle));
        }
        message
    }
}

/// Compare the highest cycle directory of every lane against `expected`.
pub fn check_cycles(run_dir: &Path, expected: u32) -> Result<CycleReport, CoreError> {
    let root = run_dir.join(CYCLE_ROOT);
    let pattern = Regex::new(r"^C(\d+)\.\d")
        .map_err(|e| io_err(&root, std::io::Error::other(e.to_string())))?;

    let mut lane_dirs = Vec::new();
    if root.is_dir() {
        for entry in std::fs::read_dir(&root).map_err(|e| io_err(&root, e))? {
            let entry = entry.map_err(|e| io_err(&root, e))?;
            if entry.file_type().map_err(|e| io_err(entry.path(), e))?.is_dir() {
                lane_dirs.push(entry);
            }
        }
    }
    lane_dirs.sort_by_key(|e| e.file_name());

    let mut lanes = Vec::with_capacity(lane_dirs.len());
    for lane_dir in lane_dirs {
        let path = lane_dir.path();
        let mut max_cycle = 0u32;
        for entry in std::fs::read_dir(&path).map_err(|e| io_err(&path, e))? {
            let entry = entry.map_err(|e| io_err(&path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = pattern.captures(&name) else {
                continue;
            };
            if let Ok(cycle) = caps[1].parse::<u32>() {
                max_cycle = max_cycle.max(cycle);
            }
        }
        lanes.push(LaneCycles {
            lane: lane_dir.file_name().to_string_lossy().into_owned(),
            max_cycle,
        });
    }

    Ok(CycleReport { expected, lanes })
}

//! `runstream check-cycles <run dir>`: the post-upload cycle check, standalone.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use runstream_core::cycles::check_cycles;
use runstream_core::RunInfo;

/// Arguments for `runstream check-cycles`.
#[derive(Args, Debug)]
pub struct CheckCyclesArgs {
    /// Run directory containing RunInfo.xml.
    pub run_dir: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct CycleRow {
    #[tabled(rename = "lane")]
    lane: String,
    #[tabled(rename = "max cycle")]
    max_cycle: u32,
    #[tabled(rename = "expected")]
    expected: u32,
}

impl CheckCyclesArgs {
    /// Exit 0 when every lane reached the expected cycle, 1 otherwise.
    pub fn run(self) -> Result<ExitCode> {
        let info = RunInfo::load(&self.run_dir)
            .with_context(|| format!("failed to read run metadata in {}", self.run_dir.display()))?;
        let report = check_cycles(&self.run_dir, info.expected_cycles())
            .context("failed to scan cycle directories")?;
        let complete = report.is_complete();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize cycle report")?
            );
        } else {
            println!("Run {}: expecting {} cycles", info.run_id.0.bold(), report.expected);
            let rows: Vec<CycleRow> = report
                .lanes
                .iter()
                .map(|l| CycleRow {
                    lane: l.lane.clone(),
                    max_cycle: l.max_cycle,
                    expected: report.expected,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            if complete {
                println!("{}", "all cycles present".green());
            } else {
                println!("{}", "incomplete cycles".red());
            }
        }

        Ok(if complete {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        })
    }
}

//! `runstream samplesheet <run dir>`: preview samplesheet reconciliation.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use runstream_core::samplesheet::reconcile;

/// Arguments for `runstream samplesheet`.
#[derive(Args, Debug)]
pub struct SamplesheetArgs {
    /// Run directory to inspect.
    pub run_dir: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SamplesheetJson<'a> {
    candidates: &'a [String],
    selected: Option<&'a str>,
    halt_downstream: bool,
}

impl SamplesheetArgs {
    /// Exit 1 when conflicting samplesheets would halt downstream analysis.
    pub fn run(self) -> Result<ExitCode> {
        let result = reconcile(&self.run_dir)
            .with_context(|| format!("failed to reconcile samplesheets in {}", self.run_dir.display()))?;

        if self.json {
            let payload = SamplesheetJson {
                candidates: &result.candidates,
                selected: result.selected.as_deref(),
                halt_downstream: result.halt_downstream,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize result")?
            );
        } else {
            if result.candidates.is_empty() {
                println!("No samplesheet found.");
            } else {
                println!("Candidates: {}", result.candidates.join(", "));
            }
            match &result.selected {
                Some(name) => println!("Selected: {}", name.green()),
                None if result.halt_downstream => {
                    println!("{}", "Conflicting samplesheets: downstream analysis would be halted".red());
                }
                None => println!("Selected: -"),
            }
            if let Some(diff) = &result.conflict_diff {
                print!("{diff}");
                if !diff.ends_with('\n') {
                    println!();
                }
            }
        }

        Ok(if result.halt_downstream {
            ExitCode::from(1)
        } else {
            ExitCode::SUCCESS
        })
    }
}

//! runstream: stream a sequencing run to DNAnexus while the instrument is
//! still writing it.
//!
//! # Usage
//!
//! ```text
//! runstream upload -a <token> -p <project> -r <run dir> -t <tar dir> -L <log dir> [options]
//! runstream check-cycles <run dir> [--json]
//! runstream samplesheet <run dir> [--json]
//! ```
//!
//! Exit status: 0 on success, 1 when every lane was already uploaded (or a
//! check found a problem), 2 on a fatal error.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check_cycles::CheckCyclesArgs, samplesheet::SamplesheetArgs, upload::UploadArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "runstream",
    version,
    about = "Incrementally upload a sequencing run directory and chain downstream analysis",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a run directory until the run completes, then close and dispatch.
    Upload(UploadArgs),

    /// Compare the cycle directories on disk against RunInfo.xml.
    CheckCycles(CheckCyclesArgs),

    /// Show which samplesheet would be uploaded for a run directory.
    Samplesheet(SamplesheetArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result: Result<ExitCode> = match cli.command {
        Commands::Upload(args) => args.run(),
        Commands::CheckCycles(args) => args.run(),
        Commands::Samplesheet(args) => args.run(),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("runstream: ERROR: {err:#}");
            ExitCode::from(2)
        }
    }
}

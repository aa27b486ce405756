//! # winapp2-trim: The Main Entry Point
//!
//! This module handles Command Line Interface (CLI) parsing, logging
//! initialization, and dispatching to the trim driver. It is the
//! orchestrator of the winapp2-trim application.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use simplelog::{Config, SimpleLogger};

mod auditor;
mod augmenter;
mod config;
mod driver;
mod evaluator;
mod fetch;
mod ini_io;
mod invariant_ppt;
mod model;
mod probe;
mod resolver;

use config::TrimConfig;
use probe::RealHostProbe;

/// The primary Command Line Interface (CLI) configuration.
///
/// Uses `clap` for sub-command parsing and help generation.
#[derive(Parser)]
#[command(name = "winapp2-trim")]
#[command(about = "Prunes winapp2.ini entries that don't apply to the running host", long_about = None)]
struct Cli {
    /// The sub-command to execute. Defaults to `trim` when omitted, since
    /// trimming is this tool's one obvious action.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit and trim a ruleset against the running host.
    Trim {
        /// Path to the ruleset to trim.
        #[arg(long, default_value = "./winapp2.ini")]
        input: PathBuf,

        /// Path to write the reduced ruleset to.
        #[arg(long, default_value = "./winapp2.ini")]
        output: PathBuf,

        /// Path to the includes override file.
        #[arg(long, default_value = "./includes.ini")]
        includes: PathBuf,

        /// Path to the excludes override file.
        #[arg(long, default_value = "./excludes.ini")]
        excludes: PathBuf,

        /// Force-retain any entry named in the includes file.
        #[arg(long)]
        use_includes: bool,

        /// Force-discard any entry named in the excludes file, unless also
        /// included.
        #[arg(long)]
        use_excludes: bool,

        /// Fetch the input ruleset from this URL instead of reading
        /// `--input` from disk.
        #[arg(long)]
        download: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = SimpleLogger::init(log_level, Config::default());

    let config = match cli.command {
        Some(Commands::Trim { input, output, includes, excludes, use_includes, use_excludes, download }) => {
            TrimConfig { input_path: input, output_path: output, includes_path: includes, excludes_path: excludes, use_includes, use_excludes, download_url: download }
        }
        None => TrimConfig::default(),
    };

    let probe = RealHostProbe::new();
    info!("trimming {} -> {}", config.input_path.display(), config.output_path.display());

    match driver::run_trim(&config, &probe) {
        Ok((initial, r#final)) => println!("{}", driver::summarize(initial, r#final)),
        Err(e) => {
            error!("trim declined: {e:#}");
            std::process::exit(1);
        }
    }
}

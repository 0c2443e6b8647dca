//! # CFGEditor Bootstrapper: The Main Entry Point
//!
//! Parses the (optional) command line, sets up logging and runs the installer.
//! Double-clicking the executable with no arguments performs the full install:
//! unpack CFGEditor next to the bootstrapper, create `CFGEditor.lnk`, and launch it.
//!
//! Failures are logged and turned into a per-step exit code (see [`error::BootstrapError::exit_code`]).

use std::error::Error as _;

use clap::Parser;
use log::{LevelFilter, error, info};
use simplelog::{Config, SimpleLogger};

mod error;
mod installer;
mod invariants;
mod layout;
mod payload;
mod shell;

use installer::ReinstallPolicy;

/// The primary Command Line Interface (CLI) configuration.
///
/// Every flag is optional; the defaults are what a double click gets.
#[derive(Parser)]
#[command(name = "cfgeditor-bootstrap")]
#[command(about = "Unpacks CFGEditor next to this executable and launches it", long_about = None)]
struct Cli {
    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Fail instead of replacing an existing `CFGEditor` directory.
    #[arg(long)]
    keep_existing: bool,

    /// Skip shortcut creation and launch (for machines without a desktop shell).
    #[arg(long)]
    headless: bool,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Logging failure shouldn't stop the install
    let _ = SimpleLogger::init(log_level, Config::default());

    let policy = if cli.keep_existing {
        ReinstallPolicy::Keep
    } else {
        ReinstallPolicy::Replace
    };
    let shell = shell::platform_shell(cli.headless);

    match installer::run(shell.as_ref(), policy) {
        Ok(installed) => match &installed.shortcut {
            Some(link) => info!(
                "CFGEditor installed to {:?} ({} files); shortcut {:?} -> {:?}",
                installed.app_dir, installed.files, link, installed.entry
            ),
            None => info!(
                "CFGEditor installed to {:?} ({} files); no shortcut created",
                installed.app_dir, installed.files
            ),
        },
        Err(e) => {
            error!("Install failed: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            std::process::exit(e.exit_code());
        }
    }
}

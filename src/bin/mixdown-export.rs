//! `mixdown-export [OPTIONS] <SESSION-DIR> <SESSION-NAME>`
//!
//! Exports the session range of `<SESSION-DIR>/<SESSION-NAME>.mixdown` to WAV.
//! Progress goes to stdout, logs to stderr (`RUST_LOG` filters them).

use clap::Parser;
use mixdown::cli::{export, Cli};
use std::io::Write;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let mut last_percent = None;
    let result = export(&cli, |progress| {
        let percent = (progress.fraction() * 100.0) as u32;
        if last_percent != Some(percent) {
            last_percent = Some(percent);
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "\rExporting {}... {percent:3}%", progress.timespan_name);
            let _ = stdout.flush();
        }
    });

    match result {
        Ok(path) => {
            println!("\nExported {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!();
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

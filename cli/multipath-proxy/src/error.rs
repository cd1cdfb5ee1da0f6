//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// Usage line shown with argument errors.
pub const USAGE: &str = "ssh-multipath-proxy <HOST[:PORT]>... [-- <COMMAND> [ARGS]...]";

/// Invocation errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("at least one host required even with command")]
    MissingHost,

    #[error("command must not be empty")]
    EmptyCommand,

    #[error(transparent)]
    Clap(#[from] clap::Error),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    if let Some(CliError::Clap(e)) = err.downcast_ref::<CliError>() {
        eprintln!("{} {}", "Error:".red().bold(), clap_message(e));
        return;
    }

    eprintln!("{} {}", "Error:".red().bold(), err);

    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }

    if let Some(CliError::MissingHost | CliError::EmptyCommand) = err.downcast_ref::<CliError>() {
        eprintln!("\n{} {}", "Usage:".yellow(), USAGE);
    }
}

/// Clap's rendered error without its own `error:` prefix. Keeps the usage
/// line and the `--help` hint clap appends.
fn clap_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    rendered
        .trim_start_matches("error:")
        .trim()
        .to_string()
}

//! Invocation parsing.

use std::ffi::OsString;

use clap::Parser;
use multipath_race::HostSpec;

use crate::error::CliError;

/// Connect to the first of several endpoints that answers with an SSH banner
/// and relay standard input and output to it.
///
/// Meant to be used as an ssh ProxyCommand:
///
///     ProxyCommand ssh-multipath-proxy localhost:4242 %h:%p -- alternate-proxy %h
#[derive(Debug, Parser)]
#[command(name = "ssh-multipath-proxy", version, verbatim_doc_comment)]
struct Cli {
    /// Candidate endpoints, tried in order (port defaults to 22).
    #[arg(value_name = "HOST[:PORT]", required = true)]
    hosts: Vec<HostSpec>,

    /// Command to exec when no candidate answers in time.
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

/// A parsed and validated invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub hosts: Vec<HostSpec>,
    /// Fallback command and its arguments; never empty when present.
    pub fallback: Option<Vec<String>>,
}

impl Invocation {
    /// Parse a full argument vector, program name first.
    pub fn parse_from<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        // Clap cannot tell "no command" from "empty command" after `--`.
        if let Some(position) = args.iter().skip(1).position(|arg| arg == "--") {
            if position == 0 {
                return Err(CliError::MissingHost);
            }
            if position + 2 == args.len() {
                return Err(CliError::EmptyCommand);
            }
        }

        let cli = Cli::try_parse_from(args)?;

        Ok(Self {
            hosts: cli.hosts,
            fallback: (!cli.command.is_empty()).then_some(cli.command),
        })
    }
}

//! ssh-multipath-proxy - race several endpoints of one ssh server.
//!
//! Used as an ssh ProxyCommand. Endpoints are tried in order with staggered
//! connects; the first one that greets with an SSH banner is relayed to
//! standard input and output. When none does, an optional fallback command
//! takes over the process.

use std::process::ExitCode;

use anyhow::Result;
use multipath_race::{Fallback, RaceConfig, RaceOutcome, Racer, Relay, SystemResolver};
use tracing::{debug, error, info, warn};

mod cli;
mod config;
mod error;
mod fallback;
mod logging;
mod stdio;

use cli::Invocation;
use config::Config;
use error::CliError;
use fallback::ExecFallback;
use stdio::LocalStdio;

fn main() -> ExitCode {
    let invocation = match Invocation::parse_from(std::env::args_os()) {
        Ok(invocation) => invocation,
        // Help and version are not failures.
        Err(CliError::Clap(e)) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error::print_error(&e.into());
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error::print_error(&e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config) {
        error::print_error(&e);
        return ExitCode::FAILURE;
    }

    if config.setsid {
        detach();
    }

    match run(invocation) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "proxy failed");
            for cause in e.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::FAILURE
        }
    }
}

/// Leave the caller's session so terminal signals aimed at ssh do not reach
/// the proxy.
fn detach() {
    match nix::unistd::setsid() {
        Ok(session) => debug!(%session, "started new session"),
        Err(e) => warn!(error = %e, "setsid failed"),
    }
}

fn run(invocation: Invocation) -> Result<ExitCode> {
    let mut fallback = invocation.fallback.map(ExecFallback::new);

    let mut racer = Racer::new(invocation.hosts, SystemResolver, RaceConfig::default());
    let outcome = racer.run(fallback.as_mut().map(|f| f as &mut dyn Fallback))?;

    let winner = match outcome {
        RaceOutcome::Winner(winner) => winner,
        RaceOutcome::Exhausted => {
            warn!("no candidate answered");
            return Ok(ExitCode::FAILURE);
        }
    };

    info!(
        candidate = %winner.spec,
        address = %winner.address.ip(),
        port = winner.address.port(),
        "using candidate"
    );

    // SAFETY: from here on only the relay touches descriptors 0 and 1;
    // logging goes to standard error.
    let local = unsafe { LocalStdio::adopt() };

    let mut relay =
        Relay::between(winner.stream, local.input, local.output)?.with_pending(&winner.banner);
    let stats = relay.run()?;

    debug!(
        to_remote = stats.to_remote,
        to_local = stats.to_local,
        "connection closed"
    );
    Ok(ExitCode::SUCCESS)
}

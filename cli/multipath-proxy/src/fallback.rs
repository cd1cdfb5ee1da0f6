//! Fallback command execution.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use multipath_race::Fallback;

/// Replaces this process with the user's alternate proxy command.
///
/// Standard input and output are inherited, so the command takes over the
/// session directly. Candidate sockets are close-on-exec and do not leak.
#[derive(Debug, Clone)]
pub struct ExecFallback {
    argv: Vec<String>,
}

impl ExecFallback {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl Fallback for ExecFallback {
    fn describe(&self) -> String {
        self.argv.join(" ")
    }

    fn exec(&mut self) -> io::Error {
        let Some((program, args)) = self.argv.split_first() else {
            return io::Error::new(io::ErrorKind::InvalidInput, "empty fallback command");
        };

        let error = Command::new(program).args(args).exec();
        io::Error::new(error.kind(), format!("{}: {}", program, error))
    }
}

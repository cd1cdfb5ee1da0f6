//! Local side of the relay.

use std::fs::File;
use std::os::unix::io::FromRawFd;

/// Standard input and output as owned handles.
pub struct LocalStdio {
    pub input: File,
    pub output: File,
}

impl LocalStdio {
    /// Take ownership of descriptors 0 and 1.
    ///
    /// Dropping `output` closes descriptor 1, which is how the end of the
    /// relayed stream reaches the parent when it is not a socket.
    ///
    /// # Safety
    ///
    /// Nothing else in the process may read, write or close descriptors 0
    /// and 1 afterwards, and both must be open.
    pub unsafe fn adopt() -> Self {
        Self {
            input: File::from_raw_fd(libc::STDIN_FILENO),
            output: File::from_raw_fd(libc::STDOUT_FILENO),
        }
    }
}

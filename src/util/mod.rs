use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::{libc, sys::signal::Signal, unistd};

/// Logs the error of a `Result` that the shell can carry on without.
macro_rules! log_if_err {
    ($result:expr, $msg:expr) => {
        if let Err(ref e) = $result {
            log::error!("{}: {}", $msg, e);
        }
    };
    ($result:expr, $fmt:expr, $($arg:tt)+) => {
        if let Err(ref e) = $result {
            log::error!("{}: {}", format_args!($fmt, $($arg)+), e);
        }
    };
}

/// MSH Utility Extensions for `ExitStatus`
pub trait MshExitStatusExt {
    /// Create an ExitStatus to indicate *successful* program execution.
    fn from_success() -> Self;

    /// Create an ExitStatus to indicate *unsuccessful* program execution.
    fn from_failure() -> Self;

    /// Create an ExitStatus from a status code
    fn from_status(code: i32) -> Self;

    /// Create an ExitStatus for a process killed by `signal`, following the
    /// shell convention of 128 + signal number.
    fn from_signal(signal: Signal) -> Self;
}

impl MshExitStatusExt for ExitStatus {
    /// # Examples
    /// ```rust
    /// use msh_rs::MshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_success().success());
    /// ```
    fn from_success() -> Self {
        ExitStatus::from_status(0)
    }

    /// # Examples
    /// ```rust
    /// use msh_rs::MshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(!ExitStatus::from_failure().success());
    /// ```
    fn from_failure() -> Self {
        ExitStatus::from_status(1)
    }

    /// # Examples
    /// ```rust
    /// use msh_rs::MshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_status(0).success());
    /// assert_eq!(ExitStatus::from_status(127).code(), Some(127));
    /// ```
    fn from_status(code: i32) -> Self {
        ExitStatus::from_raw(code << 8)
    }

    fn from_signal(signal: Signal) -> Self {
        ExitStatus::from_status(128 + signal as i32)
    }
}

pub fn is_interactive() -> bool {
    let temp_result = unistd::isatty(libc::STDIN_FILENO);
    log_if_err!(temp_result, "unistd::isatty");
    temp_result.unwrap_or(false)
}

//! MSH builtins
//!
//! Commands run by the shell itself instead of being launched as processes.
//! `!!` and `!n` are not listed here: history references are expanded before
//! a line is dispatched.

use std::iter;

use docopt::Docopt;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

use self::prelude::*;

pub use self::dirs::Cd;
pub use self::exit::Quit;
pub use self::help::Help;
pub use self::history::History;
pub use self::jobs::{Procs, Stop, Term, Wake};

pub mod prelude {
    pub use std::io::Write;
    pub use std::process::ExitStatus;

    pub use super::{parse_args, NoArgs};
    pub use crate::errors::{Error, ErrorKind, Result, ResultExt};
    pub use crate::shell::Shell;
    pub use crate::util::MshExitStatusExt;
}

mod dirs;
mod exit;
mod help;
mod history;
mod jobs;

const CD_NAME: &str = "cd";
const HELP_NAME: &str = "help";
const HISTORY_NAME: &str = "history";
const PROCS_NAME: &str = "procs";
const QUIT_NAME: &str = "quit";
const STOP_NAME: &str = "stop";
const TERM_NAME: &str = "term";
const WAKE_NAME: &str = "wake";

/// Represents a MSH builtin command such as cd or procs.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user. Ends with a docopt `Usage:`
    /// section describing the accepted arguments.
    const HELP: &'static str;
    /// The usage string to display to the user.
    fn usage() -> &'static str {
        Self::HELP.lines().next().unwrap_or(Self::NAME)
    }
    /// Runs the command with the given arguments in the `shell` environment.
    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [
        CD_NAME,
        HELP_NAME,
        HISTORY_NAME,
        PROCS_NAME,
        QUIT_NAME,
        STOP_NAME,
        TERM_NAME,
        WAKE_NAME,
    ]
    .contains(&program.as_ref())
}

/// precondition: command is a builtin.
/// Returns (`exit_status_code`, `builtin_result`)
pub fn run<S1, S2>(
    shell: &mut Shell,
    program: S1,
    args: &[S2],
    stdout: &mut dyn Write,
) -> (ExitStatus, Result<()>)
where
    S1: AsRef<str>,
    S2: AsRef<str>,
{
    debug_assert!(is_builtin(&program));

    let result = match program.as_ref() {
        CD_NAME => Cd::run(shell, args, stdout),
        HELP_NAME => Help::run(shell, args, stdout),
        HISTORY_NAME => History::run(shell, args, stdout),
        PROCS_NAME => Procs::run(shell, args, stdout),
        QUIT_NAME => Quit::run(shell, args, stdout),
        STOP_NAME => Stop::run(shell, args, stdout),
        TERM_NAME => Term::run(shell, args, stdout),
        WAKE_NAME => Wake::run(shell, args, stdout),
        _ => unreachable!(),
    };

    let exit_status = get_builtin_exit_status(&result);
    (exit_status, result)
}

fn get_builtin_exit_status(result: &Result<()>) -> ExitStatus {
    let status = if let Err(ref e) = *result {
        match *e.kind() {
            ErrorKind::BuiltinCommand(_, code) => code,
            _ => 1,
        }
    } else {
        0
    };

    ExitStatus::from_status(status)
}

/// Arguments of a builtin that accepts none.
#[derive(Debug, Deserialize)]
pub struct NoArgs {}

/// Parses `args` against the `Usage:` section of `usage`.
///
/// Arguments that do not match become a `BuiltinCommand` error carrying the
/// first line of `usage`, with exit status 2.
pub fn parse_args<D, S, I>(usage: &str, program: S, args: I) -> Result<D>
where
    D: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Docopt::new(usage)?
        .argv(iter::once(program).chain(args))
        .help(false)
        .deserialize()
        .map_err(|e| match e {
            docopt::Error::WithProgramUsage(..)
            | docopt::Error::Argv(_)
            | docopt::Error::NoMatch => {
                let usage_line = usage.lines().next().unwrap_or_default();
                Error::builtin_command(usage_line, 2)
            }
            e => e.into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_shell() -> Shell {
        Shell::new(crate::shell::ShellConfig::noninteractive()).expect("failed to create shell")
    }

    #[test]
    fn test_is_builtin() {
        for name in &["cd", "help", "history", "procs", "quit", "stop", "term", "wake"] {
            assert!(is_builtin(name), "{} should be a builtin", name);
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("!!"));
        assert!(!is_builtin("Quit"));
    }

    #[test]
    fn test_exit_status_of_bad_arguments() {
        let mut shell = test_shell();
        let mut stdout = Vec::new();
        let (status, result) = run(&mut shell, "stop", &["1", "2"], &mut stdout);
        assert_eq!(status.code(), Some(2));
        assert_eq!(result.unwrap_err().to_string(), "stop: stop <pid>");
        assert!(stdout.is_empty());
    }

    #[test]
    fn test_exit_status_of_success() {
        let mut shell = test_shell();
        let mut stdout = Vec::new();
        let (status, result) = run(&mut shell, "procs", &[] as &[&str], &mut stdout);
        assert!(result.is_ok());
        assert!(status.success());
    }
}

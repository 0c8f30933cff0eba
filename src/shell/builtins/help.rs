use serde_derive::Deserialize;

use crate::shell::builtins::{
    self, prelude::*, BuiltinCommand, Cd, History, Procs, Quit, Stop, Term, Wake,
};

pub struct Help;

#[derive(Debug, Deserialize)]
struct HelpArgs {
    arg_command: Vec<String>,
}

impl builtins::BuiltinCommand for Help {
    const NAME: &'static str = builtins::HELP_NAME;

    const HELP: &'static str = "\
help: help [<command>...]
    Display information about builtin commands.

    Without COMMAND, prints a one line summary of every builtin. Otherwise
    prints the full help of each COMMAND.

Usage:
    help [<command>...]";

    fn run<T: AsRef<str>>(_shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let args: HelpArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;

        if args.arg_command.is_empty() {
            for usage in all_usage_strings().iter() {
                writeln!(stdout, "{}", usage)?;
            }
            return Ok(());
        }

        let mut all_invalid = true;
        for command in &args.arg_command {
            if let Some(help) = help_text(command) {
                writeln!(stdout, "{}", without_usage_section(help))?;
                all_invalid = false;
            }
        }
        if all_invalid {
            let command = args.arg_command.last().map(String::as_str).unwrap_or_default();
            bail!(ErrorKind::BuiltinCommand(
                format!("help: no help topics match `{}'", command),
                1
            ));
        }

        Ok(())
    }
}

fn all_usage_strings() -> [&'static str; 8] {
    [
        Cd::usage(),
        Help::usage(),
        History::usage(),
        Procs::usage(),
        Quit::usage(),
        Stop::usage(),
        Term::usage(),
        Wake::usage(),
    ]
}

fn help_text(command: &str) -> Option<&'static str> {
    match command {
        builtins::CD_NAME => Some(Cd::HELP),
        builtins::HELP_NAME => Some(Help::HELP),
        builtins::HISTORY_NAME => Some(History::HELP),
        builtins::PROCS_NAME => Some(Procs::HELP),
        builtins::QUIT_NAME => Some(Quit::HELP),
        builtins::STOP_NAME => Some(Stop::HELP),
        builtins::TERM_NAME => Some(Term::HELP),
        builtins::WAKE_NAME => Some(Wake::HELP),
        _ => None,
    }
}

/// The docopt section only repeats the first line.
fn without_usage_section(help: &str) -> &str {
    match help.find("\n\nUsage:") {
        Some(end) => &help[..end],
        None => help,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellConfig;

    fn help(args: &[&str]) -> (Result<()>, String) {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();
        let mut stdout = Vec::new();
        let result = Help::run(&mut shell, args, &mut stdout);
        (result, String::from_utf8(stdout).unwrap())
    }

    #[test]
    fn test_help_lists_every_builtin() {
        let (result, stdout) = help(&[]);
        assert!(result.is_ok());
        assert_eq!(stdout.lines().count(), 8);
        assert!(stdout.contains("stop: stop <pid>"));
        assert!(stdout.contains("cd: cd [<dir>]"));
    }

    #[test]
    fn test_help_for_one_command() {
        let (result, stdout) = help(&["term"]);
        assert!(result.is_ok());
        assert!(stdout.starts_with("term: term <pid>\n"));
        assert!(stdout.contains("SIGTERM"));
        assert!(!stdout.contains("Usage:"));
    }

    #[test]
    fn test_help_unknown_topic() {
        let (result, stdout) = help(&["ls"]);
        assert_eq!(
            result.unwrap_err().to_string(),
            "help: no help topics match `ls'"
        );
        assert!(stdout.is_empty());
    }
}

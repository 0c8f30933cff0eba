use crate::shell::builtins::{self, prelude::*};

pub struct History;

impl builtins::BuiltinCommand for History {
    const NAME: &'static str = builtins::HISTORY_NAME;

    const HELP: &'static str = "\
history: history
    Display the history list with line numbers, oldest first.

    Only the most recent lines are kept. Use !n to run line number N again
    and !! to run the last line again.

Usage:
    history";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let _: NoArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;
        write!(stdout, "{}", shell.history())?;
        Ok(())
    }
}

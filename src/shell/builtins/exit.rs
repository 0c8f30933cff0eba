use crate::shell::builtins::{self, prelude::*};

pub struct Quit;

impl builtins::BuiltinCommand for Quit {
    const NAME: &'static str = builtins::QUIT_NAME;

    const HELP: &'static str = "\
quit: quit
    Exit the shell with a status of 0.

    Background jobs keep running.

Usage:
    quit";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let _: NoArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;
        shell.request_exit();
        Ok(())
    }
}

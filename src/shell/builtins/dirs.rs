use std::env;
use std::path::PathBuf;

use log::info;
use serde_derive::Deserialize;

use crate::shell::builtins::{self, prelude::*};

pub struct Cd;

#[derive(Debug, Deserialize)]
struct CdArgs {
    arg_dir: Option<String>,
}

impl builtins::BuiltinCommand for Cd {
    const NAME: &'static str = builtins::CD_NAME;

    const HELP: &'static str = "\
cd: cd [<dir>]
    Change the shell working directory.

    Change the current directory to DIR. The default DIR is the home
    directory, and a leading ~ stands for it.

Usage:
    cd [<dir>]";

    fn run<T: AsRef<str>>(_shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let args: CdArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;

        let dir = match args.arg_dir.as_ref().map(String::as_str) {
            None | Some("~") => home_dir()?,
            Some(dir) if dir.starts_with("~/") => home_dir()?.join(&dir[2..]),
            Some(dir) => PathBuf::from(dir),
        };

        if let Err(e) = env::set_current_dir(&dir) {
            let message = format!("cd: {}: {}", dir.display(), e);
            return Err(Error::builtin_command(message, 1));
        }
        info!("changed directory to {}", dir.display());
        Ok(())
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| Error::builtin_command("cd: HOME not set", 1))
}

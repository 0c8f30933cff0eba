use std::path::PathBuf;
use std::process::{self, ExitStatus};

use docopt::Docopt;
use log::{debug, error};
use msh_rs::errors::*;
use msh_rs::{MshExitStatusExt, Shell, ShellConfig};
use nix::unistd::Pid;
use serde_derive::Deserialize;

const COMMAND_HISTORY_CAPACITY: usize = 10;
const LOG_FILE_NAME: &str = ".msh_log";

const USAGE: &str = "
msh.

Usage:
    msh [options]
    msh [options] -c <command>
    msh (-h | --help)
    msh --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -c              Run the command line given as argument, then exit.
    -d --debug      Trace forks, redirections and waits on stderr.
    --log=<path>    File to write log to, defaults to ~/.msh_log
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_debug: bool,
    flag_log: Option<String>,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if let Err(e) = init_logger(&args.flag_log) {
        display_error_and_exit(&e);
    }
    debug!("{:?}", args);

    if args.flag_version {
        println!("msh version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c {
        execute_from_command_string(&args);
    } else {
        execute_from_stdin(&args);
    }
}

fn init_logger(path: &Option<String>) -> Result<()> {
    let log_path = match *path {
        Some(ref path) => PathBuf::from(path),
        None => default_log_path()?,
    };
    let log_file = fern::log_file(&log_path)
        .chain_err(|| format!("failed to open log file {}", log_path.display()))?;

    let pid = Pid::this();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Trace)
        .chain(log_file)
        .apply()
        .chain_err(|| "failed to install logger")?;

    Ok(())
}

fn default_log_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(LOG_FILE_NAME))
        .ok_or_else(|| "unable to find home directory for the log file".into())
}

fn execute_from_command_string(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive().verbose(args.flag_debug);
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    if let Some(ref command) = args.arg_command {
        if let Err(e) = shell.execute_command_string(command) {
            shell.report_error(&e);
        }
    }

    shell.exit(None)
}

fn execute_from_stdin(args: &Args) -> ! {
    let shell_config =
        ShellConfig::interactive(COMMAND_HISTORY_CAPACITY).verbose(args.flag_debug);
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    if let Err(e) = shell.execute_from_stdin() {
        error!("reading input failed: {}", e.chain_message());
        eprintln!("msh: {}", e.chain_message());
    }
    shell.exit(None)
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to start shell: {}", error.chain_message());
    eprintln!("msh: {}", error.chain_message());
    process::exit(ExitStatus::from_failure().code().unwrap_or(1));
}

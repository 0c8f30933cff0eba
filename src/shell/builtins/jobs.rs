use log::debug;
use nix::unistd::Pid;
use serde_derive::Deserialize;

use crate::job_control::SignalKind;
use crate::shell::builtins::{self, prelude::*, BuiltinCommand};

pub struct Procs;

#[derive(Debug, Deserialize)]
struct PidArgs {
    arg_pid: String,
}

impl builtins::BuiltinCommand for Procs {
    const NAME: &'static str = builtins::PROCS_NAME;

    const HELP: &'static str = "\
procs: procs
    Display the background jobs started by the shell.

    Lists the process ID, program name and status of every job, oldest
    first. Terminated jobs are kept in the list.

Usage:
    procs";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let _: NoArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;
        write!(stdout, "{}", shell.jobs())?;
        Ok(())
    }
}

pub struct Stop;

impl builtins::BuiltinCommand for Stop {
    const NAME: &'static str = builtins::STOP_NAME;

    const HELP: &'static str = "\
stop: stop <pid>
    Suspend a background job.

    Sends SIGTSTP to the job PID. The job shows as Suspended until it is
    woken up or terminated.

Usage:
    stop <pid>";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        signal_job::<Self, T>(shell, args, SignalKind::Stop)
    }
}

pub struct Wake;

impl builtins::BuiltinCommand for Wake {
    const NAME: &'static str = builtins::WAKE_NAME;

    const HELP: &'static str = "\
wake: wake <pid>
    Resume a suspended background job.

    Sends SIGCONT to the job PID. The job keeps running in the background.

Usage:
    wake <pid>";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        signal_job::<Self, T>(shell, args, SignalKind::Continue)
    }
}

pub struct Term;

impl builtins::BuiltinCommand for Term {
    const NAME: &'static str = builtins::TERM_NAME;

    const HELP: &'static str = "\
term: term <pid>
    Terminate a background job.

    Sends SIGTERM to the job PID. A suspended job is resumed afterwards so
    that it can act on the signal.

Usage:
    term <pid>";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        signal_job::<Self, T>(shell, args, SignalKind::Terminate)
    }
}

fn signal_job<B, T>(shell: &mut Shell, args: &[T], kind: SignalKind) -> Result<()>
where
    B: BuiltinCommand,
    T: AsRef<str>,
{
    let args: PidArgs = parse_args(B::HELP, B::NAME, args.iter().map(AsRef::as_ref))?;
    let pid = parse_pid(B::NAME, &args.arg_pid)?;

    match shell.jobs_mut().signal(pid, kind) {
        Ok(job) => {
            debug!("{}: {} is now {}", B::NAME, pid, job.status());
            Ok(())
        }
        Err(e) => Err(Error::builtin_command(
            format!("{}: {}", B::NAME, e.chain_message()),
            1,
        )),
    }
}

/// Only positive pids name a single process; 0 and negatives would reach
/// whole process groups.
fn parse_pid(name: &str, arg: &str) -> Result<Pid> {
    match arg.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(Pid::from_raw(pid)),
        _ => Err(Error::builtin_command(
            format!("{}: {}: arguments must be process IDs", name, arg),
            1,
        )),
    }
}

//! Launching command lines as processes.
//!
//! Every stage of a command line is forked and exec'd by hand so that the
//! child can rewire its standard streams before the program image is
//! replaced. Pipes are created one stage at a time: at most two are open in
//! the shell at once, the read end feeding the next stage and the write end
//! being handed to the stage just forked.

use std::ffi::{CStr, CString};
use std::fmt;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::process::ExitStatus;

use log::{debug, warn};
use nix::{
    errno::Errno,
    fcntl::{self, OFlag},
    libc,
    sys::{
        signal::{self, SigHandler, Signal},
        stat::Mode,
        wait::{self, WaitPidFlag, WaitStatus},
    },
    unistd::{self, ForkResult, Pid},
};

use crate::{
    core::CommandLine,
    errors::{Error, Result, ResultExt},
    job_control::{JobStatus, JobTable, TERMINAL_SIGNALS},
    util::MshExitStatusExt,
};

/// Exit status of a child whose program could not be exec'd.
pub const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;
/// Exit status of a child whose redirection could not be opened.
pub const REDIRECT_FAILURE_EXIT_STATUS: i32 = 1;

/// What became of a launched command line.
#[derive(Debug, PartialEq)]
pub enum Launch {
    /// Every stage terminated. Holds the exit status of the last stage.
    Completed(ExitStatus),
    /// The stages were registered in the job table and left running.
    Background(Vec<Pid>),
    /// A foreground stage was stopped from the terminal. It and the stages
    /// after it were moved to the job table.
    Suspended(Vec<Pid>),
}

/// Forks, wires up and waits for the processes of a command line.
#[derive(Clone, Copy, Debug, Default)]
pub struct Executor {
    /// Trace forks, redirections and waits on stderr.
    verbose: bool,
}

/// A stage ready to be exec'd. Everything the child needs is allocated
/// before forking.
struct Stage<'a> {
    label: &'a str,
    argv: Vec<CString>,
    input: Option<CString>,
    output: Option<CString>,
}

/// Descriptors the child installs as stdin/stdout, and every pipe descriptor
/// the shell held at fork time.
struct ChildIo {
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    inherited: [Option<RawFd>; 3],
}

impl Executor {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Runs `command` and every stage piped after it.
    ///
    /// Blocking command lines return once all their stages have terminated
    /// (or one of them was stopped). Non-blocking ones are registered in
    /// `jobs` and return immediately.
    ///
    /// Failures of the programs themselves (not found, bad redirection,
    /// non-zero exit) only show in the exit status. An `Err` means the shell
    /// could not create a pipe or a process; stages launched before that
    /// point are still waited for or registered.
    pub fn execute(&self, command: &CommandLine, jobs: &mut JobTable) -> Result<Launch> {
        let stages = prepare_stages(command)?;

        let temp_result = io::stdout().flush();
        log_if_err!(temp_result, "failed to flush stdout before forking");

        let mut children = Vec::with_capacity(stages.len());
        let spawn_result = self.spawn_stages(&stages, command.blocking, &mut children);
        let launch = if command.blocking {
            self.wait_for_children(&children, jobs)
        } else {
            register_children(&children, jobs)
        };

        spawn_result?;
        Ok(launch)
    }

    fn spawn_stages<'a>(
        &self,
        stages: &[Stage<'a>],
        blocking: bool,
        children: &mut Vec<(Pid, &'a str)>,
    ) -> Result<()> {
        let last = stages.len() - 1;
        // Read end of the previous stage's pipe, stdin of the next stage.
        let mut current_input: Option<OwnedFd> = None;

        for (i, stage) in stages.iter().enumerate() {
            let pipe = if i < last { Some(create_pipe()?) } else { None };
            let (pipe_read, pipe_write) = match pipe {
                Some((ref read, ref write)) => (Some(read.as_raw_fd()), Some(write.as_raw_fd())),
                None => (None, None),
            };
            let stdin = current_input.as_ref().map(AsRawFd::as_raw_fd);
            let child_io = ChildIo {
                stdin,
                stdout: pipe_write,
                inherited: [stdin, pipe_read, pipe_write],
            };

            self.trace(format_args!("(parent_process>forking...)"));
            // The child only makes raw system calls until exec.
            let child = match unsafe { unistd::fork() } {
                Ok(ForkResult::Child) => self.exec_child(stage, &child_io, blocking),
                Ok(ForkResult::Parent { child }) => child,
                Err(e) => return Err(e).chain_err(|| format!("{}: fork failed", stage.label)),
            };
            self.trace(format_args!(
                "(parent_process>created process with id: {})",
                child
            ));
            debug!("forked {} for '{}'", child, stage.label);

            if !blocking {
                // Done in both parent and child, whichever runs first wins.
                let temp_result = unistd::setpgid(child, child);
                log_if_err!(temp_result, "failed to set pgid for pid ({})", child);
            }
            children.push((child, stage.label));

            if pipe.is_some() {
                self.trace(format_args!(
                    "(parent_process>closing the write end of the pipe...)"
                ));
            }
            // Dropping closes the previous read end and the new write end;
            // both now belong to the children alone.
            current_input = pipe.map(|(read, _write)| read);
        }

        if stages.len() > 1 {
            self.trace(format_args!(
                "(parent_process>closing the read end of the pipe...)"
            ));
        }

        Ok(())
    }

    /// Child side of a fork. Never returns.
    ///
    /// Runs between fork and exec, so it sticks to plain system calls: no
    /// logging and no locks, errors are written straight to fd 2.
    fn exec_child(&self, stage: &Stage<'_>, child_io: &ChildIo, blocking: bool) -> ! {
        // SIGPIPE is ignored by the Rust runtime and would stay ignored
        // across exec.
        for &sig in TERMINAL_SIGNALS.iter().chain(&[Signal::SIGPIPE]) {
            unsafe {
                let _ = signal::signal(sig, SigHandler::SigDfl);
            }
        }

        if !blocking {
            let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
        }

        if let Some(fd) = child_io.stdin {
            self.trace_child("(child>redirecting stdin to the read end of the pipe...)");
            if let Err(e) = unistd::dup2(fd, libc::STDIN_FILENO) {
                child_exit(stage.label.as_bytes(), e, REDIRECT_FAILURE_EXIT_STATUS);
            }
        }
        if let Some(fd) = child_io.stdout {
            self.trace_child("(child>redirecting stdout to the write end of the pipe...)");
            if let Err(e) = unistd::dup2(fd, libc::STDOUT_FILENO) {
                child_exit(stage.label.as_bytes(), e, REDIRECT_FAILURE_EXIT_STATUS);
            }
        }
        // A pipe only reports end of input once every copy of its write end
        // is closed, including the ones in unrelated stages.
        for &fd in child_io.inherited.iter().flatten() {
            if fd > libc::STDERR_FILENO {
                let _ = unistd::close(fd);
            }
        }

        if let Some(ref path) = stage.input {
            self.trace_child("(child>redirecting stdin to a file...)");
            if let Err(e) = apply_redirect(path, libc::STDIN_FILENO, OFlag::O_RDONLY) {
                child_exit(path.to_bytes(), e, REDIRECT_FAILURE_EXIT_STATUS);
            }
        }
        if let Some(ref path) = stage.output {
            self.trace_child("(child>redirecting stdout to a file...)");
            let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
            if let Err(e) = apply_redirect(path, libc::STDOUT_FILENO, flags) {
                child_exit(path.to_bytes(), e, REDIRECT_FAILURE_EXIT_STATUS);
            }
        }

        if self.verbose {
            write_stderr(b"(child>going to execute cmd: ");
            write_stderr(stage.label.as_bytes());
            write_stderr(b")\n");
        }
        let e = match unistd::execvp(&stage.argv[0], &stage.argv) {
            Err(e) => e,
            Ok(infallible) => match infallible {},
        };
        child_exit(stage.label.as_bytes(), e, COMMAND_NOT_FOUND_EXIT_STATUS)
    }

    fn wait_for_children(&self, children: &[(Pid, &str)], jobs: &mut JobTable) -> Launch {
        self.trace(format_args!(
            "(parent_process>waiting for child processes to terminate...)"
        ));

        let mut last_status = ExitStatus::from_success();
        for (i, &(pid, label)) in children.iter().enumerate() {
            match wait_for_process(pid) {
                Ok(Some(status)) => {
                    debug!("'{}' ({}) finished: {}", label, pid, status);
                    last_status = status;
                }
                Ok(None) => {
                    debug!("'{}' ({}) stopped", label, pid);
                    jobs.register_with_status(pid, label, JobStatus::Suspended);
                    let rest = &children[i + 1..];
                    for &(pid, label) in rest {
                        jobs.register(pid, label);
                    }
                    return Launch::Suspended(
                        children[i..].iter().map(|&(pid, _)| pid).collect(),
                    );
                }
                Err(e) => {
                    warn!("{}", e.chain_message());
                    last_status = ExitStatus::from_failure();
                }
            }
        }

        Launch::Completed(last_status)
    }

    fn trace(&self, message: fmt::Arguments<'_>) {
        if self.verbose {
            eprintln!("{}", message);
        }
    }

    fn trace_child(&self, message: &str) {
        if self.verbose {
            write_stderr(message.as_bytes());
            write_stderr(b"\n");
        }
    }
}

fn register_children(children: &[(Pid, &str)], jobs: &mut JobTable) -> Launch {
    for &(pid, label) in children {
        jobs.register(pid, label);
    }

    Launch::Background(children.iter().map(|&(pid, _)| pid).collect())
}

/// Blocks until `pid` terminates or is stopped. Returns `None` if it stopped.
fn wait_for_process(pid: Pid) -> Result<Option<ExitStatus>> {
    loop {
        match wait::waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(Some(ExitStatus::from_status(code))),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(Some(ExitStatus::from_signal(sig))),
            Ok(WaitStatus::Stopped(..)) => return Ok(None),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(e).chain_err(|| format!("failed to wait for {}", pid)),
        }
    }
}

/// Only the first stage's input redirection and the last stage's output
/// redirection are honoured.
fn prepare_stages<'a>(command: &'a CommandLine) -> Result<Vec<Stage<'a>>> {
    let last = command.stages().count() - 1;
    command
        .stages()
        .enumerate()
        .map(|(i, stage)| -> Result<Stage<'a>> {
            if stage.arguments.is_empty() {
                bail!(Error::syntax(if i == last { "newline" } else { "|" }));
            }
            let argv = stage.argv().ok_or_else(|| {
                Error::from(format!("{}: argument contains a nul byte", stage.program()))
            })?;

            if (i > 0 && stage.input_redirect.is_some())
                || (i < last && stage.output_redirect.is_some())
            {
                debug!("ignoring redirection on inner stage '{}'", stage.program());
            }
            let input = match stage.input_redirect {
                Some(ref path) if i == 0 => Some(path_to_cstring(path)?),
                _ => None,
            };
            let output = match stage.output_redirect {
                Some(ref path) if i == last => Some(path_to_cstring(path)?),
                _ => None,
            };

            Ok(Stage {
                label: stage.program(),
                argv,
                input,
                output,
            })
        })
        .collect()
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .chain_err(|| format!("{}: invalid file name", path.display()))
}

/// Replaces the calling process's `target` stream with the file at `path`.
///
/// Must only run in a forked child: it clobbers the process's own stdin or
/// stdout.
fn apply_redirect(path: &CStr, target: RawFd, flags: OFlag) -> nix::Result<()> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    let fd = fcntl::open(path, flags, mode)?;
    if fd != target {
        let result = unistd::dup2(fd, target);
        let _ = unistd::close(fd);
        result?;
    }

    Ok(())
}

/// Wraps `unistd::pipe2()` to return RAII structs instead of raw, owning file descriptors
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_pipe() -> Result<(OwnedFd, OwnedFd)> {
    // IMPORTANT: immediately pass the RawFds returned by unistd::pipe2()
    // into RAII structs. Every early return of the pipeline loop then closes
    // them. The OwnedFds are their only owners, so from_raw_fd is sound.
    // O_CLOEXEC keeps the ends out of processes launched by other command
    // lines; the copies a stage dup2s onto stdin/stdout do not inherit it.
    let (read_end_pipe, write_end_pipe) =
        unistd::pipe2(OFlag::O_CLOEXEC).chain_err(|| "pipe failed")?;
    unsafe {
        Ok((
            OwnedFd::from_raw_fd(read_end_pipe),
            OwnedFd::from_raw_fd(write_end_pipe),
        ))
    }
}

fn write_stderr(bytes: &[u8]) {
    let _ = unistd::write(libc::STDERR_FILENO, bytes);
}

/// Reports `msh: <subject>: <reason>` and ends the child without
/// allocating.
fn child_exit(subject: &[u8], e: Errno, code: i32) -> ! {
    let reason = match e {
        Errno::ENOENT if code == COMMAND_NOT_FOUND_EXIT_STATUS => "command not found",
        e => e.desc(),
    };
    write_stderr(b"msh: ");
    write_stderr(subject);
    write_stderr(b": ");
    write_stderr(reason.as_bytes());
    write_stderr(b"\n");
    unsafe { libc::_exit(code) }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;
    use std::time::{Duration, Instant};

    use tempdir::TempDir;

    use super::*;
    use crate::core::parser;

    fn command(line: &str) -> CommandLine {
        parser::parse(line)
            .expect("test command should parse")
            .expect("test command should not be blank")
    }

    fn run(line: &str, jobs: &mut JobTable) -> Launch {
        Executor::default()
            .execute(&command(line), jobs)
            .expect("execute failed")
    }

    fn exit_code(launch: Launch) -> Option<i32> {
        match launch {
            Launch::Completed(status) => status.code(),
            other => panic!("command did not complete: {:?}", other),
        }
    }

    fn kill_and_reap(pid: Pid) {
        let _ = signal::kill(pid, Signal::SIGKILL);
        let _ = wait::waitpid(pid, None);
    }

    #[test]
    fn test_blocking_command_waits() {
        let mut jobs = JobTable::new();
        let start = Instant::now();
        let code = exit_code(run("sleep 1", &mut jobs));
        assert_eq!(code, Some(0));
        assert!(start.elapsed() >= Duration::from_millis(900));
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_background_command_returns_immediately() {
        let mut jobs = JobTable::new();
        let start = Instant::now();
        let launch = run("sleep 30 &", &mut jobs);
        assert!(start.elapsed() < Duration::from_secs(5));

        let pids = match launch {
            Launch::Background(pids) => pids,
            other => panic!("expected a background launch, got {:?}", other),
        };
        assert_eq!(pids.len(), 1);
        let job = jobs.get(pids[0]).expect("job should be registered");
        assert_eq!(job.label(), "sleep");
        assert_eq!(job.status(), JobStatus::Running);

        kill_and_reap(pids[0]);
    }

    #[test]
    fn test_background_pipeline_registers_every_stage() {
        let mut jobs = JobTable::new();
        let launch = run("sleep 30 | cat &", &mut jobs);
        let pids = match launch {
            Launch::Background(pids) => pids,
            other => panic!("expected a background launch, got {:?}", other),
        };
        let labels: Vec<&str> = jobs.list().iter().map(|j| j.label()).collect();
        assert_eq!(labels, vec!["sleep", "cat"]);

        for pid in pids {
            kill_and_reap(pid);
        }
    }

    #[test]
    fn test_exit_status_of_last_stage() {
        let mut jobs = JobTable::new();
        assert_eq!(exit_code(run("true", &mut jobs)), Some(0));
        assert_eq!(exit_code(run("false", &mut jobs)), Some(1));
        assert_eq!(exit_code(run("false | true", &mut jobs)), Some(0));
        assert_eq!(exit_code(run("true | false", &mut jobs)), Some(1));
    }

    #[test]
    fn test_command_not_found() {
        let mut jobs = JobTable::new();
        let code = exit_code(run("msh-test-no-such-program --flag", &mut jobs));
        assert_eq!(code, Some(COMMAND_NOT_FOUND_EXIT_STATUS));
    }

    #[test]
    fn test_output_redirect_creates_and_truncates() {
        let dir = TempDir::new("msh").unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "stale contents that are longer\n").unwrap();

        let mut jobs = JobTable::new();
        let line = format!("echo hello > {}", out.display());
        assert_eq!(exit_code(run(&line, &mut jobs)), Some(0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
    }

    #[test]
    fn test_input_redirect() {
        let dir = TempDir::new("msh").unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        fs::write(&input, "a\nb\nc\n").unwrap();

        let mut jobs = JobTable::new();
        let line = format!("wc -l < {} > {}", input.display(), out.display());
        assert_eq!(exit_code(run(&line, &mut jobs)), Some(0));
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "3");
    }

    #[test]
    fn test_missing_input_file_fails_only_the_child() {
        let dir = TempDir::new("msh").unwrap();
        let line = format!("cat < {}", dir.path().join("missing").display());

        let mut jobs = JobTable::new();
        let code = exit_code(run(&line, &mut jobs));
        assert_eq!(code, Some(REDIRECT_FAILURE_EXIT_STATUS));
    }

    #[test]
    fn test_pipeline_preserves_lines() {
        let dir = TempDir::new("msh").unwrap();
        let out = dir.path().join("out.txt");

        let mut jobs = JobTable::new();
        let line = format!("seq 1 500 | cat | cat | cat > {}", out.display());
        assert_eq!(exit_code(run(&line, &mut jobs)), Some(0));

        let contents = fs::read_to_string(&out).unwrap();
        let expected: Vec<String> = (1..501).map(|i| i.to_string()).collect();
        assert_eq!(contents.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_pipeline_matches_direct_run() {
        let listed = TempDir::new("msh").unwrap();
        for name in &["alpha", "beta", "gamma", "delta"] {
            fs::write(listed.path().join(name), name).unwrap();
        }
        let scratch = TempDir::new("msh").unwrap();
        let out = scratch.path().join("out.txt");

        let mut jobs = JobTable::new();
        let line = format!(
            "ls -l {} | tail -n 2 > {}",
            listed.path().display(),
            out.display()
        );
        assert_eq!(exit_code(run(&line, &mut jobs)), Some(0));

        let ls = std::process::Command::new("ls")
            .arg("-l")
            .arg(listed.path())
            .output()
            .unwrap();
        let ls = String::from_utf8(ls.stdout).unwrap();
        let lines: Vec<&str> = ls.lines().collect();
        let expected: String = lines[lines.len() - 2..]
            .iter()
            .map(|l| format!("{}\n", l))
            .collect();
        assert_eq!(fs::read_to_string(&out).unwrap(), expected);
    }

    #[test]
    fn test_pipeline_with_failing_stage_still_terminates() {
        let dir = TempDir::new("msh").unwrap();
        let out = dir.path().join("out.txt");

        let mut jobs = JobTable::new();
        let line = format!(
            "seq 1 10 | msh-test-no-such-program | cat > {}",
            out.display()
        );
        assert_eq!(exit_code(run(&line, &mut jobs)), Some(0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn test_producer_stops_when_consumer_exits() {
        let dir = TempDir::new("msh").unwrap();
        let out = dir.path().join("out.txt");

        let mut jobs = JobTable::new();
        let line = format!("yes | head -n 3 > {}", out.display());
        assert_eq!(exit_code(run(&line, &mut jobs)), Some(0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "y\ny\ny\n");
    }

    #[test]
    fn test_inner_redirections_are_ignored() {
        let dir = TempDir::new("msh").unwrap();
        let inner = dir.path().join("inner.txt");
        let out = dir.path().join("out.txt");

        let mut jobs = JobTable::new();
        let line = format!(
            "echo piped > {} | cat > {}",
            inner.display(),
            out.display()
        );
        assert_eq!(exit_code(run(&line, &mut jobs)), Some(0));
        assert!(!inner.exists());
        assert_eq!(fs::read_to_string(&out).unwrap(), "piped\n");
    }

    #[test]
    fn test_background_job_can_be_signalled() {
        use crate::job_control::SignalKind;

        let mut jobs = JobTable::new();
        let pid = match run("sleep 30 &", &mut jobs) {
            Launch::Background(pids) => pids[0],
            other => panic!("expected a background launch, got {:?}", other),
        };

        assert_eq!(
            jobs.signal(pid, SignalKind::Stop).unwrap().status(),
            JobStatus::Suspended
        );
        assert_eq!(
            jobs.signal(pid, SignalKind::Continue).unwrap().status(),
            JobStatus::Running
        );
        assert_eq!(
            jobs.signal(pid, SignalKind::Terminate).unwrap().status(),
            JobStatus::Terminated
        );

        let deadline = Instant::now() + Duration::from_secs(10);
        while jobs.reap() == 0 {
            assert!(Instant::now() < deadline, "sleep ignored the terminate signal");
            thread::sleep(Duration::from_millis(10));
        }
        assert!(jobs.get(pid).unwrap().is_reaped());
    }

    #[test]
    fn test_stopped_foreground_command_becomes_suspended_job() {
        let mut jobs = JobTable::new();
        let command = CommandLine::new(&["sh", "-c", "kill -STOP $$"]);
        let launch = Executor::default()
            .execute(&command, &mut jobs)
            .expect("execute failed");

        let pids = match launch {
            Launch::Suspended(pids) => pids,
            other => panic!("expected a suspended launch, got {:?}", other),
        };
        assert_eq!(pids.len(), 1);
        let job = jobs.get(pids[0]).expect("job should be registered");
        assert_eq!(job.label(), "sh");
        assert_eq!(job.status(), JobStatus::Suspended);
        assert_eq!(unistd::getpgid(Some(pids[0])).unwrap(), unistd::getpgrp());

        kill_and_reap(pids[0]);
    }

    #[test]
    fn test_stages_after_a_stopped_one_keep_running() {
        let mut jobs = JobTable::new();
        let command =
            CommandLine::new(&["sh", "-c", "kill -STOP $$"]).pipe_to(CommandLine::new(&["cat"]));
        let launch = Executor::default()
            .execute(&command, &mut jobs)
            .expect("execute failed");

        let pids = match launch {
            Launch::Suspended(pids) => pids,
            other => panic!("expected a suspended launch, got {:?}", other),
        };
        let statuses: Vec<JobStatus> = jobs.list().iter().map(|j| j.status()).collect();
        assert_eq!(statuses, vec![JobStatus::Suspended, JobStatus::Running]);

        for pid in pids {
            kill_and_reap(pid);
        }
    }

    #[test]
    fn test_background_children_lead_their_own_process_group() {
        let mut jobs = JobTable::new();
        let pids = match run("sleep 30 | sleep 30 &", &mut jobs) {
            Launch::Background(pids) => pids,
            other => panic!("expected a background launch, got {:?}", other),
        };

        for &pid in &pids {
            assert_eq!(unistd::getpgid(Some(pid)).unwrap(), pid);
            assert_ne!(pid, unistd::getpgrp());
        }
        for pid in pids {
            kill_and_reap(pid);
        }
    }
}

//! MSH - Shell Module
//!
//! The Shell owns the job table and the command history, and decides for
//! every line whether it is a builtin or something to launch.

use std::env;
use std::fmt;
use std::io::{self, BufRead, StdinLock};
use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use log::{debug, error, info, warn};
use nix::sys::signal::Signal;

use crate::{
    core::{parser, CommandLine},
    editor::Editor,
    errors::{Error, ErrorKind, Result},
    execute_command::{Executor, Launch},
    history::HistoryBuffer,
    job_control::{self, JobTable},
    shell::builtins,
    util::{self, MshExitStatusExt},
};

const SYNTAX_ERROR_EXIT_STATUS: i32 = 2;

enum LineSource {
    Editor(Editor),
    Stdin(StdinLock<'static>),
}

/// MSH Shell
pub struct Shell {
    history: HistoryBuffer,
    jobs: JobTable,
    executor: Executor,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    /// Is `false` if stdin is not a terminal or if ignoring the terminal
    /// signals failed.
    is_interactive: bool,
    /// Set by `quit`, checked by the read-loop before every prompt.
    exit_requested: bool,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Result<Shell> {
        let mut shell = Shell {
            history: HistoryBuffer::with_capacity(config.command_history_capacity),
            jobs: JobTable::new(),
            executor: Executor::new(config.verbose),
            last_exit_status: ExitStatus::from_success(),
            config,
            is_interactive: config.enable_job_control && util::is_interactive(),
            exit_requested: false,
        };

        if shell.is_interactive {
            if let Err(e) = job_control::ignore_terminal_signals() {
                error!(
                    "failed to initialize shell for job control despite isatty: {}",
                    e
                );
                shell.is_interactive = false;
            }
        }

        info!("msh started up");
        Ok(shell)
    }

    pub fn is_interactive(&self) -> bool {
        self.is_interactive
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn jobs_mut(&mut self) -> &mut JobTable {
        &mut self.jobs
    }

    pub fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    /// Makes the read-loop stop before its next prompt.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Prompt showing the working directory, relative to home when inside it.
    pub fn prompt(&self) -> String {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("?"));
        let rel = match dirs::home_dir() {
            Some(ref home) => match cwd.strip_prefix(home) {
                Ok(rel) => Path::new("~").join(rel),
                Err(_) => cwd.clone(),
            },
            None => cwd.clone(),
        };

        format!("msh {}> ", rel.display())
    }

    /// Runs one line of input: history expansion, recording, parsing and
    /// dispatch. Blank lines are ignored.
    ///
    /// An `Err` is for the user to see. The shell itself is in a consistent
    /// state whatever the outcome.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }

        let line = match self.history.expand(input) {
            Ok(Some(expanded)) => {
                println!("{}", expanded);
                expanded
            }
            Ok(None) => input.to_string(),
            Err(e) => {
                self.last_exit_status = ExitStatus::from_failure();
                return Err(e);
            }
        };
        self.history.record(&line);

        let command = match parser::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(e) => {
                self.last_exit_status = ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS);
                return Err(e);
            }
        };

        self.execute_command(&command)
    }

    /// Runs a parsed command line, either as a builtin or through the executor.
    pub fn execute_command(&mut self, command: &CommandLine) -> Result<()> {
        if builtins::is_builtin(command.program()) {
            if command.is_pipeline()
                || command.input_redirect.is_some()
                || command.output_redirect.is_some()
                || !command.blocking
            {
                warn!(
                    "'{}' is a builtin, ignoring pipes, redirections and '&'",
                    command.program()
                );
            }

            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let (status, result) =
                builtins::run(self, command.program(), command.args(), &mut handle);
            self.last_exit_status = status;
            return result;
        }

        let launch = match self.executor.execute(command, &mut self.jobs) {
            Ok(launch) => launch,
            Err(e) => {
                self.last_exit_status = match *e.kind() {
                    ErrorKind::Syntax(_) => ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS),
                    _ => ExitStatus::from_failure(),
                };
                return Err(e);
            }
        };

        match launch {
            Launch::Completed(status) => {
                debug!("'{}' completed: {}", command.program(), status);
                self.last_exit_status = status;
            }
            Launch::Background(pids) => {
                for pid in pids {
                    if let Some(job) = self.jobs.get(pid) {
                        println!("[{}] {}", pid, job.label());
                    }
                }
                self.last_exit_status = ExitStatus::from_success();
            }
            Launch::Suspended(pids) => {
                println!();
                for pid in pids {
                    if let Some(job) = self.jobs.get(pid) {
                        println!("[{}] {}\t{}", pid, job.status(), job.label());
                    }
                }
                self.last_exit_status = ExitStatus::from_signal(Signal::SIGTSTP);
            }
        }

        Ok(())
    }

    /// Runs lines from stdin until end of input or `quit`.
    ///
    /// A terminal gets a prompt and line editing, anything else is read line
    /// by line.
    pub fn execute_from_stdin(&mut self) -> Result<()> {
        let mut input = if self.is_interactive {
            LineSource::Editor(Editor::with_capacity(self.config.command_history_capacity)?)
        } else {
            LineSource::Stdin(io::stdin().lock())
        };

        while !self.exit_requested {
            let reaped = self.jobs.reap();
            if reaped > 0 {
                debug!("reaped {} background job(s)", reaped);
            }

            let line = match self.read_line(&mut input) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => match *e.kind() {
                    ErrorKind::InvalidUtf8 => {
                        self.last_exit_status = ExitStatus::from_failure();
                        self.report_error(&e);
                        continue;
                    }
                    _ => return Err(e),
                },
            };

            if let Err(e) = self.execute_command_string(&line) {
                self.report_error(&e);
            }
        }

        Ok(())
    }

    /// Next line of input without its line terminator, `None` at end of input.
    fn read_line(&self, input: &mut LineSource) -> Result<Option<String>> {
        match *input {
            LineSource::Editor(ref mut editor) => {
                let line = editor.readline(&self.prompt())?;
                if let Some(ref line) = line {
                    editor.add_history_entry(line);
                }
                Ok(line)
            }
            LineSource::Stdin(ref mut stdin) => {
                let mut buf = Vec::new();
                if stdin.read_until(b'\n', &mut buf)? == 0 {
                    return Ok(None);
                }
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                String::from_utf8(buf)
                    .map(Some)
                    .map_err(|_| ErrorKind::InvalidUtf8.into())
            }
        }
    }

    /// Writes the single line diagnostic the user sees for `e`.
    pub fn report_error(&self, e: &Error) {
        match *e.kind() {
            ErrorKind::Syntax(_) | ErrorKind::BuiltinCommand(..) => debug!("{}", e),
            _ => warn!("{}", e.chain_message()),
        }
        eprintln!("msh: {}", e.chain_message());
    }

    /// Exit the shell with a status of `n`, or 0 if `n` is `None`.
    ///
    /// Background jobs are left running.
    pub fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        if self.config.display_messages && self.is_interactive {
            println!("exit");
        }

        let live = self.jobs.list().iter().filter(|j| !j.is_reaped()).count();
        if live > 0 {
            info!("leaving {} background job(s) behind", live);
        }

        let code = n
            .and_then(|status| status.code())
            .unwrap_or(0);
        info!("msh has shut down");
        process::exit(code);
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} jobs\n{:?}", self.jobs, self.history)
    }
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Number of entries to store in the shell's command history
    command_history_capacity: usize,

    /// Determines if the shell may take over terminal signals when stdin is a
    /// terminal.
    enable_job_control: bool,

    /// Determines if the executor traces forks, redirections and waits on
    /// stderr.
    verbose: bool,

    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, terminal signals
    ///
    /// # Complete List
    /// - Command History holds `command_history_capacity` entries
    /// - Terminal signals are ignored by the shell when stdin is a terminal
    /// - Some additional messages are displayed
    pub fn interactive(command_history_capacity: usize) -> ShellConfig {
        ShellConfig {
            command_history_capacity,
            enable_job_control: true,
            verbose: false,
            display_messages: true,
        }
    }

    /// Creates a noninteractive shell, e.g. no command history
    ///
    /// # Complete List
    /// - Command History is disabled. Nothing is recorded and history
    ///   references are invalid.
    /// - The shell keeps the default terminal signal handling.
    /// - Fewer messages are displayed
    pub fn noninteractive() -> ShellConfig {
        Default::default()
    }

    /// Sets the number of lines the command history keeps.
    pub fn history_capacity(mut self, capacity: usize) -> ShellConfig {
        self.command_history_capacity = capacity;
        self
    }

    /// Turns executor tracing on or off.
    pub fn verbose(mut self, verbose: bool) -> ShellConfig {
        self.verbose = verbose;
        self
    }
}

impl Default for ShellConfig {
    fn default() -> ShellConfig {
        ShellConfig {
            command_history_capacity: 0,
            enable_job_control: false,
            verbose: false,
            display_messages: false,
        }
    }
}

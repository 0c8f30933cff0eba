//! Background job bookkeeping.
//!
//! The job table remembers every process the shell left running in the
//! background and lets the user suspend, resume or terminate them by pid.
//! A record's status only changes when the shell successfully delivers a
//! signal; exits are noticed by [`JobTable::reap`] but never rewrite the
//! status, so `procs` shows what the user last asked for.

use std::fmt;

use log::{debug, info, warn};
use nix::{
    errno::Errno,
    sys::{
        signal::{self, SigHandler, Signal},
        wait::{self, WaitPidFlag, WaitStatus},
    },
    unistd::Pid,
};

use crate::errors::{ErrorKind, Result, ResultExt};

/// Terminal generated signals an interactive shell ignores. Children get the
/// default dispositions back before exec.
pub(crate) const TERMINAL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Keeps Ctrl-C and Ctrl-Z at the prompt from affecting the shell itself.
pub(crate) fn ignore_terminal_signals() -> Result<()> {
    for &sig in &TERMINAL_SIGNALS {
        unsafe { signal::signal(sig, SigHandler::SigIgn) }
            .chain_err(|| format!("failed to ignore {}", sig))?;
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Suspended,
    Terminated,
}

/// Job control requests available to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    /// `stop pid`
    Stop,
    /// `wake pid`
    Continue,
    /// `term pid`
    Terminate,
}

impl SignalKind {
    pub fn signal(self) -> Signal {
        match self {
            SignalKind::Stop => Signal::SIGTSTP,
            SignalKind::Continue => Signal::SIGCONT,
            SignalKind::Terminate => Signal::SIGTERM,
        }
    }

    /// Status of a job after the signal has been delivered.
    pub fn resulting_status(self) -> JobStatus {
        match self {
            SignalKind::Stop => JobStatus::Suspended,
            SignalKind::Continue => JobStatus::Running,
            SignalKind::Terminate => JobStatus::Terminated,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobRecord {
    pid: Pid,
    label: String,
    status: JobStatus,
    /// Set once a wait collected the process. The pid may have been reused
    /// by the OS from then on.
    reaped: bool,
}

impl JobRecord {
    fn new(pid: Pid, label: &str, status: JobStatus) -> Self {
        Self {
            pid,
            label: label.to_string(),
            status,
            reaped: false,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_reaped(&self) -> bool {
        self.reaped
    }
}

/// Background processes started by the shell, in launch order.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<JobRecord>,
}

impl JobTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Starts tracking a freshly launched background process.
    pub fn register(&mut self, pid: Pid, label: &str) {
        self.register_with_status(pid, label, JobStatus::Running);
    }

    /// Tracks a process whose state is already known, e.g. a foreground
    /// process stopped from the terminal.
    pub fn register_with_status(&mut self, pid: Pid, label: &str, status: JobStatus) {
        // A live child's pid can only match a record whose process was
        // already reaped, so that record is stale.
        if let Some(index) = self.find_job(pid) {
            warn!("pid {} reused, dropping stale job '{}'", pid, self.jobs[index].label);
            self.jobs.remove(index);
        }

        debug!("registering job {} ({}) as {}", pid, label, status);
        self.jobs.push(JobRecord::new(pid, label, status));
    }

    pub fn list(&self) -> &[JobRecord] {
        &self.jobs
    }

    pub fn get(&self, pid: Pid) -> Option<&JobRecord> {
        self.find_job(pid).map(|index| &self.jobs[index])
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Delivers the signal for `kind` to the job `pid` and updates its status.
    ///
    /// The status is left untouched if the job is unknown, already reaped or
    /// the signal cannot be delivered.
    pub fn signal(&mut self, pid: Pid, kind: SignalKind) -> Result<&JobRecord> {
        let index = self
            .find_job(pid)
            .ok_or_else(|| ErrorKind::NoSuchJob(pid.as_raw()))?;
        if self.jobs[index].reaped {
            bail!(ErrorKind::JobExited(pid.as_raw()));
        }

        let sig = kind.signal();
        signal::kill(pid, sig)
            .chain_err(|| format!("{}: failed to deliver {}", pid, sig.as_str()))?;
        info!("delivered {} to job {}", sig, pid);

        // A stopped process only acts on the terminate signal once resumed.
        if kind == SignalKind::Terminate && self.jobs[index].status == JobStatus::Suspended {
            let temp_result = signal::kill(pid, Signal::SIGCONT);
            log_if_err!(temp_result, "failed to resume terminated job {}", pid);
        }

        self.jobs[index].status = kind.resulting_status();
        Ok(&self.jobs[index])
    }

    /// Collects exit statuses of finished jobs without blocking, so they do
    /// not linger as zombies. Returns the number of jobs reaped by this call.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        for job in self.jobs.iter_mut().filter(|j| !j.reaped) {
            match wait::waitpid(job.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    debug!("job {} exited with {}", pid, code);
                    job.reaped = true;
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    debug!("job {} killed by {}", pid, sig);
                    job.reaped = true;
                }
                Ok(_) => continue,
                Err(Errno::ECHILD) => {
                    // Not our child anymore, someone else waited for it.
                    job.reaped = true;
                }
                Err(e) => {
                    warn!("waitpid({}) failed: {}", job.pid, e);
                    continue;
                }
            }
            reaped += 1;
        }

        reaped
    }

    fn find_job(&self, pid: Pid) -> Option<usize> {
        self.jobs.iter().position(|job| job.pid == pid)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Suspended => write!(f, "Suspended"),
            JobStatus::Terminated => write!(f, "Terminated"),
        }
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t\t{}\t\t{}", self.pid, self.label, self.status)
    }
}

impl fmt::Display for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PID\t\tCommand\t\tStatus")?;
        for job in &self.jobs {
            writeln!(f, "{}", job)?;
        }

        Ok(())
    }
}

//! MSH - Minimal Shell
//!
//! An execution and job-control engine with a small interactive shell around
//! it. Command lines are parsed into a chain of [`CommandLine`] stages, which
//! the [`Executor`] turns into processes connected by pipes. Background
//! processes are tracked in a [`JobTable`] and can be suspended, resumed and
//! terminated by pid.
//!
//! [`CommandLine`]: core::CommandLine
//! [`Executor`]: execute_command::Executor
//! [`JobTable`]: job_control::JobTable

#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;

#[macro_use]
mod util;

pub mod core;
pub mod editor;
pub mod errors;
pub mod execute_command;
pub mod history;
pub mod job_control;
pub mod shell;

pub use crate::shell::{Shell, ShellConfig};
pub use crate::util::MshExitStatusExt;

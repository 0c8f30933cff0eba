//! The interactive shell: read-loop, dispatch and builtins.

pub mod builtins;
mod shell;

pub use self::shell::{Shell, ShellConfig};

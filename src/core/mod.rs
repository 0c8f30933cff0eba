//! Command representation shared by the parser and the executor.

pub mod command;
pub mod parser;

pub use self::command::CommandLine;

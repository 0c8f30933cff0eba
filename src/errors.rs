//! Error module. See the [error-chain](https://crates.io/crates/error-chain) crate for details.

error_chain! {
    foreign_links {
        Docopt(::docopt::Error);
        Io(::std::io::Error);
        Nix(::nix::Error);
        Readline(::rustyline::error::ReadlineError);
    }

    errors {
        /// Generic syntax error containing offending line
        Syntax(line: String) {
            description("syntax error")
            display("syntax error near: {}", line)
        }

        /// Error raised by a builtin command, `code` becomes its exit status
        BuiltinCommand(message: String, code: i32) {
            description("builtin command failed")
            display("{}", message)
        }

        /// Job table has no record for the pid
        NoSuchJob(pid: i32) {
            description("no such job")
            display("{}: no such job", pid)
        }

        /// The job's process has been reaped, its pid may already belong to another process
        JobExited(pid: i32) {
            description("job has already exited")
            display("{}: process has already exited", pid)
        }

        /// History reference outside of the recorded range
        InvalidHistoryIndex(event: String) {
            description("invalid history index")
            display("{}: invalid history index", event)
        }

        /// Input line that is not UTF-8, the line is skipped
        InvalidUtf8 {
            description("input line is not valid UTF-8")
            display("input line is not valid UTF-8")
        }
    }
}

impl Error {
    pub(crate) fn syntax<T: AsRef<str>>(line: T) -> Error {
        ErrorKind::Syntax(line.as_ref().to_string()).into()
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
        ErrorKind::BuiltinCommand(message.as_ref().to_string(), code).into()
    }

    /// Single line made of this error and every error that caused it, e.g.
    /// `123: failed to deliver SIGTSTP: ESRCH: No such process`.
    pub fn chain_message(&self) -> String {
        self.iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_message_includes_causes() {
        let result: Result<()> = Err(nix::Error::ESRCH.into());
        let e = result.chain_err(|| "42: failed to deliver SIGCONT").unwrap_err();
        let message = e.chain_message();
        assert!(message.starts_with("42: failed to deliver SIGCONT: "));
        assert!(message.contains("ESRCH"));
    }

    #[test]
    fn domain_errors_display() {
        assert_eq!(
            Error::from(ErrorKind::NoSuchJob(7)).to_string(),
            "7: no such job"
        );
        assert_eq!(
            Error::from(ErrorKind::InvalidHistoryIndex("!11".into())).to_string(),
            "!11: invalid history index"
        );
        assert_eq!(Error::syntax("|").to_string(), "syntax error near: |");
        assert_eq!(
            Error::from(ErrorKind::InvalidUtf8).to_string(),
            "input line is not valid UTF-8"
        );
    }
}

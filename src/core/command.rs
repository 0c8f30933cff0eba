use std::ffi::CString;
use std::iter;
use std::path::PathBuf;

/// One stage of a command line, linked to the stage it pipes into.
///
/// The head of the chain owns every following stage, so dropping the head
/// releases the whole pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandLine {
    /// Program name followed by its arguments. Empty only if built by hand,
    /// such a stage is refused by the executor.
    pub arguments: Vec<String>,
    /// File to read stdin from. Only meaningful on the first stage.
    pub input_redirect: Option<PathBuf>,
    /// File to write stdout to. Only meaningful on the last stage.
    pub output_redirect: Option<PathBuf>,
    /// Run in the foreground, the shell waits for completion.
    pub blocking: bool,
    /// Stage reading this stage's stdout.
    pub next: Option<Box<CommandLine>>,
}

impl CommandLine {
    /// A blocking single stage with no redirections.
    ///
    /// # Panics
    /// Panics if `arguments` is empty.
    pub fn new<S: AsRef<str>>(arguments: &[S]) -> CommandLine {
        assert!(!arguments.is_empty(), "a command needs a program name");
        CommandLine {
            arguments: arguments.iter().map(|a| a.as_ref().to_string()).collect(),
            input_redirect: None,
            output_redirect: None,
            blocking: true,
            next: None,
        }
    }

    /// Program name, `""` for a stage without arguments.
    pub fn program(&self) -> &str {
        self.arguments.first().map_or("", String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.arguments.get(1..).unwrap_or(&[])
    }

    pub fn is_pipeline(&self) -> bool {
        self.next.is_some()
    }

    /// Iterates over this stage and every stage linked after it.
    pub fn stages(&self) -> impl Iterator<Item = &CommandLine> {
        iter::successors(Some(self), |stage| stage.next.as_deref())
    }

    /// `arguments` as null-terminated strings for exec, `None` if one of them
    /// contains a nul byte.
    pub fn argv(&self) -> Option<Vec<CString>> {
        self.arguments
            .iter()
            .map(|a| CString::new(a.as_bytes()).ok())
            .collect()
    }

    /// Builder-style helpers, handy when a caller has no parser at hand.
    pub fn with_input<P: Into<PathBuf>>(mut self, path: P) -> CommandLine {
        self.input_redirect = Some(path.into());
        self
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> CommandLine {
        self.output_redirect = Some(path.into());
        self
    }

    /// Marks every stage of the chain as non-blocking.
    pub fn in_background(mut self) -> CommandLine {
        self.set_blocking(false);
        self
    }

    /// Appends `next` at the end of the chain.
    pub fn pipe_to(mut self, next: CommandLine) -> CommandLine {
        let blocking = self.blocking;
        self.push_stage(next);
        self.set_blocking(blocking);
        self
    }

    fn push_stage(&mut self, stage: CommandLine) {
        match self.next {
            Some(ref mut next) => next.push_stage(stage),
            None => self.next = Some(Box::new(stage)),
        }
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
        if let Some(ref mut next) = self.next {
            next.set_blocking(blocking);
        }
    }
}

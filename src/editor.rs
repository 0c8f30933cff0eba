use std::fmt;

use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::{DefaultHistory, History},
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::{ErrorKind, Result};

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;
}

impl Highlighter for EditorHelper {}

impl Validator for EditorHelper {}

impl Helper for EditorHelper {}

/// Interactive line reader.
///
/// Keeps its own arrow-key recall list. The numbered history used by
/// `history` and `!n` lives in the shell.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper, DefaultHistory>,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Result<Editor> {
        let config = Config::builder()
            .max_history_size(history_capacity)?
            .history_ignore_space(true)
            .auto_add_history(false)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config)?;
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Ok(Editor { internal })
    }

    /// Returns `None` at end of input. Ctrl-C yields an empty line.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Io(ref e)) if e.kind() == std::io::ErrorKind::InvalidData => Err(ErrorKind::InvalidUtf8.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn add_history_entry(&mut self, line: &str) {
        let temp_result = self.internal.add_history_entry(line);
        log_if_err!(temp_result, "failed to add '{}' to the editor history", line);
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Editor {{ entries: {} }}", self.internal.history().len())
    }
}

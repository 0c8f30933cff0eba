use std::collections::VecDeque;
use std::fmt;

use crate::errors::{ErrorKind, Result};

/// Bounded list of previously entered command lines.
///
/// Entries are numbered from 1, oldest first. Recording a line past capacity
/// evicts the oldest entry, so numbers always describe the current contents.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<String>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn with_capacity(capacity: usize) -> HistoryBuffer {
        HistoryBuffer {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `line` without its line terminator.
    pub fn record(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }

        let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    /// Entry number `index`, starting at 1.
    pub fn recall(&self, index: usize) -> Result<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
            .ok_or_else(|| ErrorKind::InvalidHistoryIndex(format!("!{}", index)).into())
    }

    pub fn recall_last(&self) -> Result<&str> {
        self.recall(self.entries.len())
            .map_err(|_| ErrorKind::InvalidHistoryIndex("!!".to_string()).into())
    }

    /// Performs history expansion on the first word of `line`.
    ///
    /// !! -> the last entry
    /// !n -> entry number n (starting at 1)
    ///
    /// Words after the reference are appended to the recalled entry. Returns
    /// `Ok(None)` if `line` does not start with a history reference.
    pub fn expand(&self, line: &str) -> Result<Option<String>> {
        let line = line.trim();
        if !line.starts_with('!') {
            return Ok(None);
        }

        let (event, rest) = match line.find(char::is_whitespace) {
            Some(i) => (&line[..i], line[i..].trim_start()),
            None => (line, ""),
        };
        let entry = match &event[1..] {
            "!" => self.recall_last()?,
            n => match n.parse::<usize>() {
                Ok(n) => self.recall(n)?,
                Err(_) => bail!(ErrorKind::InvalidHistoryIndex(event.to_string())),
            },
        };

        let mut expanded = entry.to_string();
        if !rest.is_empty() {
            expanded.push(' ');
            expanded.push_str(rest);
        }
        Ok(Some(expanded))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries with their 1-based numbers, oldest first.
    pub fn enumerate(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i + 1, e.as_str()))
    }
}

impl fmt::Display for HistoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.enumerate() {
            writeln!(f, "{} {}", i, e)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc_history_state(capacity: usize, full: usize) -> HistoryBuffer {
        let mut state = HistoryBuffer::with_capacity(capacity);
        for i in 0..full {
            state.record(&format!("cmd{}\n", i));
        }
        state
    }

    fn is_invalid_index<T>(result: Result<T>) -> bool {
        match result {
            Err(e) => match *e.kind() {
                ErrorKind::InvalidHistoryIndex(_) => true,
                _ => false,
            },
            Ok(_) => false,
        }
    }

    #[test]
    fn init_with_capacity() {
        let state = HistoryBuffer::with_capacity(10);
        assert!(state.is_empty());
        assert_eq!(state.capacity(), 10);
    }

    #[test]
    fn record_strips_line_terminator() {
        let mut state = HistoryBuffer::with_capacity(2);
        state.record("ls -l\n");
        state.record("pwd\r\n");
        assert_eq!(state.recall(1).unwrap(), "ls -l");
        assert_eq!(state.recall(2).unwrap(), "pwd");
    }

    #[test]
    fn record_rollover_evicts_oldest() {
        let mut state = alloc_history_state(10, 10);
        state.record("cmd10");
        assert_eq!(state.len(), 10);
        assert_eq!(state.recall(1).unwrap(), "cmd1");
        assert_eq!(state.recall(10).unwrap(), "cmd10");
        assert_eq!(state.recall_last().unwrap(), "cmd10");
        let entries: Vec<&str> = state.enumerate().map(|(_, e)| e).collect();
        let expected: Vec<String> = (1..11).map(|i| format!("cmd{}", i)).collect();
        assert_eq!(entries, expected);
    }

    #[test]
    fn record_with_zero_capacity() {
        let mut state = HistoryBuffer::with_capacity(0);
        state.record("ls");
        assert!(state.is_empty());
        assert!(is_invalid_index(state.recall_last()));
    }

    #[test]
    fn recall_out_of_range() {
        let state = alloc_history_state(10, 3);
        assert!(is_invalid_index(state.recall(0)));
        assert!(is_invalid_index(state.recall(4)));
        assert_eq!(state.recall(3).unwrap(), "cmd2");
    }

    #[test]
    fn clear() {
        let mut state = alloc_history_state(10, 5);
        state.clear();
        assert!(state.is_empty());
        assert_eq!(state.capacity(), 10);
    }

    #[test]
    fn display_is_one_indexed() {
        let state = alloc_history_state(10, 2);
        assert_eq!(state.to_string(), "1 cmd0\n2 cmd1\n");
    }

    #[test]
    fn expand_not_a_reference() {
        let state = alloc_history_state(10, 2);
        assert_eq!(state.expand("ls -l").unwrap(), None);
        assert_eq!(state.expand("").unwrap(), None);
    }

    #[test]
    fn expand_empty_history() {
        let state = alloc_history_state(10, 0);
        assert!(is_invalid_index(state.expand("!!")));
        assert!(is_invalid_index(state.expand("!1")));
    }

    #[test]
    fn expand_positive_nth_command() {
        let (cap, full) = (10, 10);
        let state = alloc_history_state(cap, full);
        for i in 0..full {
            let expanded = state.expand(&format!("!{}", i + 1)).unwrap();
            assert_eq!(expanded, Some(format!("cmd{}", i)));
        }
        assert!(is_invalid_index(state.expand("!0")));
        assert!(is_invalid_index(state.expand("!11")));
        assert!(is_invalid_index(state.expand("!-1")));
        assert!(is_invalid_index(state.expand("!cmd")));
    }

    #[test]
    fn expand_last_with_trailing_words() {
        let state = alloc_history_state(10, 3);
        assert_eq!(state.expand("!!").unwrap(), Some("cmd2".to_string()));
        assert_eq!(
            state.expand("!1 | wc -l").unwrap(),
            Some("cmd0 | wc -l".to_string())
        );
    }
}

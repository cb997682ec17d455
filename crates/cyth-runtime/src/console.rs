use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Printed by the artifact.
    Output,
    /// A failed run; at most one per run.
    Error,
    /// Status text from the host itself.
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub text: String,
}

/// Append-only console contents for the current run.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    entries: VecDeque<LogEntry>,
    capacity: Option<usize>,
}

impl ConsoleLog {
    /// `capacity` bounds the retained entries; the oldest go first.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, kind: LogKind, text: impl Into<String>) {
        if self.capacity == Some(0) {
            return;
        }
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(LogEntry {
            kind,
            text: text.into(),
        });
    }

    pub fn output(&mut self, text: impl Into<String>) {
        self.push(LogKind::Output, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LogKind::Error, text);
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.push(LogKind::Notice, text);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |entry| entry.kind == kind)
            .map(|entry| entry.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

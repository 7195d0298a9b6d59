//! Operator-facing summary
//!
//! Every top-level operation owns one [`Summary`]. The forward sequence and
//! the rollback handler append to it through cheap clones of the same handle,
//! and the caller flushes it exactly once when the operation is over,
//! whichever way it ended.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

/// Severity of a summary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A single summary line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Default)]
struct SummaryState {
    entries: Vec<SummaryEntry>,
    flushed: bool,
}

/// Append-only accumulator of summary entries
#[derive(Debug, Clone, Default)]
pub struct Summary {
    state: Arc<Mutex<SummaryState>>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SummaryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        tracing::debug!(?severity, %message, "summary entry");
        self.lock().entries.push(SummaryEntry { message, severity });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(message, Severity::Info);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(message, Severity::Error);
    }

    /// Snapshot of the entries, in insertion order
    pub fn entries(&self) -> Vec<SummaryEntry> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lock().entries.iter().any(|e| e.message.contains(needle))
    }

    pub fn is_flushed(&self) -> bool {
        self.lock().flushed
    }

    /// Hand the entries to `render`, once.
    ///
    /// Returns `false` without calling `render` when the summary was already
    /// flushed. Entries appended after the flush are kept but never rendered.
    pub fn flush<F>(&self, render: F) -> bool
    where
        F: FnOnce(&[SummaryEntry]),
    {
        let entries = {
            let mut state = self.lock();
            if state.flushed {
                return false;
            }
            state.flushed = true;
            state.entries.clone()
        };
        render(&entries);
        true
    }
}

/// Render entries as plain text, one per line
pub fn render_plain(entries: &[SummaryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let marker = match entry.severity {
            Severity::Info => "*",
            Severity::Error => "!",
        };
        let _ = writeln!(out, "{marker} {}", entry.message);
    }
    out
}

//! Per-instance sinks for the human readable lines an element produces while
//! data flows through it.

use std::{
    io::Write,
    sync::{Arc, Mutex},
};

/// Receives one diagnostic line at a time.
///
/// Implementations are called from streaming threads and must not block for
/// long.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, line: &str);
}

/// Writes every line to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl DiagnosticSink for StdoutSink {
    fn report(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        // a closed stdout must not take the stream down with it
        let _ = writeln!(handle, "{}", line);
    }
}

/// Keeps every line in memory. Clones share the same storage.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_owned());
    }
}

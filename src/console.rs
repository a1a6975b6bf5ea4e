//! Console output for sandbox progress and package manager output.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for user-visible text.
pub trait Console: Send + Sync {
    /// Writes raw text without a trailing newline.
    fn write(&self, text: &str);

    /// Writes a full line.
    fn write_line(&self, line: &str) {
        self.write(&format!("{}\n", line));
    }
}

/// Console that writes to the process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // Best-effort: a closed stdout is ignored.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// Console that keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct CaptureConsole {
    buffer: Arc<Mutex<String>>,
}

impl CaptureConsole {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far.
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// Returns the captured text split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Console for CaptureConsole {
    fn write(&self, text: &str) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push_str(text);
        }
    }
}

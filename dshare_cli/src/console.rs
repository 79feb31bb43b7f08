use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use dshare_core::{Notifier, ProgressSurface};
use tracing::debug;

/// Terminal notification and progress surface.
///
/// Messages go to stdout (success) and stderr (errors). The busy label is
/// redrawn in place on stderr when it is a terminal.
#[derive(Debug)]
pub struct ConsoleSignals {
    interactive: bool,
    line_open: AtomicBool,
}

impl Default for ConsoleSignals {
    fn default() -> Self {
        Self {
            interactive: std::io::stderr().is_terminal(),
            line_open: AtomicBool::new(false),
        }
    }
}

impl ConsoleSignals {
    fn draw(&self, label: &str) {
        if !self.interactive {
            debug!(label, "busy");
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{label}");
        let _ = stderr.flush();
        self.line_open.store(true, Ordering::Relaxed);
    }

    fn close_line(&self) {
        if self.line_open.swap(false, Ordering::Relaxed) {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "\r\x1b[2K");
            let _ = stderr.flush();
        }
    }
}

impl Notifier for ConsoleSignals {
    fn notify_success(&self, message: &str) {
        self.close_line();
        println!("{message}");
    }

    fn notify_error(&self, message: &str) {
        self.close_line();
        eprintln!("Error: {message}");
    }
}

impl ProgressSurface for ConsoleSignals {
    fn set_busy(&self, label: &str) {
        self.draw(label);
    }

    fn update_busy(&self, label: &str) {
        self.draw(label);
    }

    fn clear_busy(&self) {
        self.close_line();
    }
}

//! User-facing terminal output
//!
//! The workflow reports progress through the [`Output`] trait so it can run
//! against a real terminal, a silent sink, or a recording fake in tests.

mod progress;

pub use progress::{format_duration, Progress, SpinnerProgress};

use colored::Colorize;
use std::io::IsTerminal;

/// Sink for status messages and progress indicators
pub trait Output: Send + Sync {
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
    /// Banner printed once at the start of a run
    fn header(&self, text: &str);
    /// Phase heading
    fn section(&self, text: &str);
    /// Start a spinner for a long-running operation
    fn start_progress(&self, message: &str) -> Box<dyn Progress>;
}

/// Output written to stdout, colored only when attached to a terminal
#[derive(Debug, Clone)]
pub struct TerminalOutput {
    is_tty: bool,
}

impl TerminalOutput {
    pub fn new() -> Self {
        Self {
            is_tty: std::io::stdout().is_terminal(),
        }
    }

    fn symbol(&self, symbol: &str, paint: fn(&str) -> colored::ColoredString) -> String {
        if self.is_tty {
            paint(symbol).to_string()
        } else {
            symbol.to_string()
        }
    }
}

impl Default for TerminalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Output for TerminalOutput {
    fn info(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{} {}", self.symbol("✓", |s| s.green()), message);
    }

    fn warning(&self, message: &str) {
        println!("{} {}", self.symbol("⚠", |s| s.yellow()), message);
    }

    fn error(&self, message: &str) {
        println!("{} {}", self.symbol("✗", |s| s.red()), message);
    }

    fn header(&self, text: &str) {
        let text_width = text.chars().count();
        let width = if self.is_tty { 60.max(text_width) } else { text_width + 4 };
        let border = "═".repeat(width);
        let padding = " ".repeat((width - text_width) / 2);

        println!("\n{}", border);
        println!("{}{}", padding, text);
        println!("{}\n", border);
    }

    fn section(&self, text: &str) {
        if self.is_tty {
            println!("\n{}", text.bold());
        } else {
            println!("\n{}", text);
        }
        println!("{}\n", "─".repeat(text.chars().count()));
    }

    fn start_progress(&self, message: &str) -> Box<dyn Progress> {
        Box::new(SpinnerProgress::start(message, self.is_tty))
    }
}

/// Output that discards everything; used for JSON output mode and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentOutput;

struct SilentProgress;

impl Progress for SilentProgress {
    fn update(&self, _message: &str) {}
    fn success(self: Box<Self>, _message: &str) {}
    fn fail(self: Box<Self>, _message: &str) {}
}

impl Output for SilentOutput {
    fn info(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn header(&self, _text: &str) {}
    fn section(&self, _text: &str) {}

    fn start_progress(&self, _message: &str) -> Box<dyn Progress> {
        Box::new(SilentProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_output_accepts_everything() {
        let output = SilentOutput;
        output.header("Launch Kit");
        output.section("Phase 1");
        output.info("info");
        let progress = output.start_progress("working");
        progress.update("still working");
        progress.success("done");
    }

    #[test]
    fn test_terminal_output_without_tty() {
        let output = TerminalOutput { is_tty: false };
        assert_eq!(output.symbol("✓", |s| s.green()), "✓");
        output.section("Deployment File Generation");
        let progress = output.start_progress("Waiting");
        progress.fail("failed");
    }
}

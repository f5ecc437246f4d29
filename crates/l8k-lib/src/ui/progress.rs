//! Spinner for long-running operations

use colored::Colorize;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Operations running longer than this show their elapsed time
const ELAPSED_THRESHOLD: Duration = Duration::from_secs(30);

const TICK_STRINGS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "];

/// Handle to an in-flight progress indicator
///
/// Finishing consumes the handle, so a spinner can never report twice.
pub trait Progress: Send {
    fn update(&self, message: &str);
    fn success(self: Box<Self>, message: &str);
    fn fail(self: Box<Self>, message: &str);
}

/// `indicatif` spinner on a terminal, plain line output otherwise
pub struct SpinnerProgress {
    bar: Option<ProgressBar>,
    started: Instant,
    color: bool,
}

impl SpinnerProgress {
    pub fn start(message: &str, is_tty: bool) -> Self {
        let bar = is_tty.then(|| {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .tick_strings(TICK_STRINGS)
                .template("{spinner} {msg}{elapsed_suffix}")
                .map(|style| {
                    style.with_key(
                        "elapsed_suffix",
                        |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                            if state.elapsed() > ELAPSED_THRESHOLD {
                                let _ = write!(w, " ({})", format_duration(state.elapsed()));
                            }
                        },
                    )
                });
            if let Ok(style) = style {
                bar.set_style(style);
            }
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });

        Self {
            bar,
            started: Instant::now(),
            color: is_tty,
        }
    }

    fn finish(&mut self, symbol: colored::ColoredString, message: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }

        let elapsed = self.started.elapsed();
        let mut line = if self.color {
            format!("{} {}", symbol, message)
        } else {
            format!("{} {}", symbol.clear(), message)
        };
        if elapsed > ELAPSED_THRESHOLD {
            let _ = write!(line, " ({})", format_duration(elapsed));
        }
        println!("{}", line);
    }
}

impl Progress for SpinnerProgress {
    fn update(&self, message: &str) {
        match &self.bar {
            Some(bar) => bar.set_message(message.to_string()),
            None => println!("  {}", message),
        }
    }

    fn success(mut self: Box<Self>, message: &str) {
        self.finish("✓".green(), message);
    }

    fn fail(mut self: Box<Self>, message: &str) {
        self.finish("✗".red(), message);
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Render a duration as `1m5s` or `5s`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let minutes = total / 60;
    let seconds = total % 60;
    if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

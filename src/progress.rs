use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressStyle};

/// A spinner for the indexing stages.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.dim} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message.into());
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Print a `✔ message` line above the spinner and keep spinning.
    pub fn step(&self, message: impl Into<String>) {
        self.bar
            .println(format!("{} {}", "✔".green(), message.into()));
    }

    /// Clear the spinner and print a `✔ message` line to stderr.
    pub fn finish(self, message: impl Into<String>) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", "✔".green(), message.into());
    }

    /// Clear the spinner without printing anything.
    pub fn abandon(self) {
        self.bar.finish_and_clear();
    }
}

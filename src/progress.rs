//! Download progress display.
//!
//! One byte bar per entry, drawn on stderr below the `+`/`*` status lines.
//! Bars are hidden when stderr is not a terminal so piped output stays clean.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

use crate::protocol::timeouts;

#[derive(Clone, Copy, Debug)]
pub struct Progress {
    enabled: bool,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Enabled only when stderr is a terminal.
    pub fn auto() -> Self {
        Self::new(std::io::stderr().is_terminal())
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A fresh byte bar; its length is set once the entry size is known.
    pub fn bar(&self) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(timeouts::PROGRESS_TICK_MS));
        bar
    }
}

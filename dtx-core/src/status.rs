//! Status indicator text

use crate::results::OutcomeSummary;

/// One-line summary of what the explorer is doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBar {
    base: String,
    text: String,
}

impl StatusBar {
    /// Starts out discovering
    pub fn new() -> Self {
        let mut status = Self {
            base: String::new(),
            text: String::new(),
        };
        status.discovering();
        status
    }

    pub fn discovering(&mut self) {
        self.base.clear();
        self.text = "Discovering tests".to_string();
    }

    pub fn discovered(&mut self, test_count: usize) {
        self.base = format!("{} tests", test_count);
        self.text = self.base.clone();
    }

    pub fn running(&mut self, running_count: usize) {
        self.text = format!("{} (Running {} tests)", self.base, running_count);
    }

    /// Show the outcome counts of the last delivered results
    pub fn finished(&mut self, summary: OutcomeSummary) {
        self.text = format!(
            "{} ({} passed | {} failed | {} not executed)",
            self.base, summary.passed, summary.failed, summary.not_executed
        );
    }

    /// Drop any run information
    pub fn idle(&mut self) {
        self.text = self.base.clone();
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Default for StatusBar {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatusBar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

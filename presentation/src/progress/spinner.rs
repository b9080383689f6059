//! Spinner shown while the model is working

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// One spinner at a time; starting a new one replaces the old.
pub struct ModelSpinner {
    enabled: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ModelSpinner {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            bar: Mutex::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg:.dimmed} {elapsed:.dimmed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    pub fn start(&self, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(Self::style());
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(100));

        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.replace(bar) {
            old.finish_and_clear();
        }
    }

    pub fn stop(&self) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(|e| e.into_inner()).take() {
            bar.finish_and_clear();
        }
    }

    pub fn is_running(&self) -> bool {
        self.bar
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Drop for ModelSpinner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_spinner_never_runs() {
        let spinner = ModelSpinner::new(false);
        spinner.start("thinking");
        assert!(!spinner.is_running());
    }

    #[test]
    fn test_start_and_stop() {
        let spinner = ModelSpinner::new(true);
        spinner.start("thinking");
        spinner.start("still thinking");
        assert!(spinner.is_running());
        spinner.stop();
        assert!(!spinner.is_running());
    }
}

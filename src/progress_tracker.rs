use indicatif::{ProgressBar, ProgressStyle};

/// Batch progress bar. Status lines are printed with the bar suspended so they
/// do not tear it.
pub(crate) struct ProgressTracker {
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    pub(crate) fn new(len: usize) -> Self {
        let progress_bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            progress_bar.set_style(style.progress_chars("#>-"));
        }

        Self { progress_bar }
    }

    pub(crate) fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.progress_bar.suspend(f)
    }

    pub(crate) fn inc(&self) {
        self.progress_bar.inc(1);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> u64 {
        self.progress_bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_advances() {
        let tracker = ProgressTracker::new(3);
        let value = tracker.suspend(|| 42);
        tracker.inc();
        tracker.inc();

        assert_eq!(value, 42);
        assert_eq!(tracker.position(), 2);
        tracker.finish();
    }
}

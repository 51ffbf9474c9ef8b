//! Progress reporting for bulk operations

/// Receives progress from a running operation
pub trait ProgressReporter {
    /// `percent` is 0-100
    fn update(&self, percent: u8, message: &str);

    fn complete(&self, message: &str);

    fn error(&self, message: &str);
}

/// Writes progress to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn update(&self, percent: u8, message: &str) {
        log::info!("[{:>3}%] {}", percent, message);
    }

    fn complete(&self, message: &str) {
        log::info!("[done] {}", message);
    }

    fn error(&self, message: &str) {
        log::error!("[failed] {}", message);
    }
}

/// Maps `done` of `total` onto the `from..=to` percent band
pub(crate) fn scaled(from: u8, to: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return to;
    }
    let span = usize::from(to.saturating_sub(from));
    from + (span * done.min(total) / total) as u8
}

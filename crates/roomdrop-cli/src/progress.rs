//! Download progress display with progress bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress bar for one download
pub struct TransferProgress {
    bar: ProgressBar,
    total_bytes: u64,
}

impl TransferProgress {
    /// Create a bar for `filename` under `multi`
    #[must_use]
    pub fn new(multi: &MultiProgress, total_bytes: u64, filename: &str) -> Self {
        let bar = multi.add(ProgressBar::new(total_bytes));

        let style = ProgressStyle::default_bar()
            .template("{msg:24} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message(filename.to_string());

        Self { bar, total_bytes }
    }

    /// Update from a percentage
    pub fn set_percent(&self, percent: u8) {
        let percent = u64::from(percent.min(100));
        self.bar.set_position(self.total_bytes * percent / 100);
    }

    /// Finish with a message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.set_position(self.total_bytes);
        self.bar.finish_with_message(msg);
    }

    /// Abandon the bar (for failures)
    pub fn abandon_with_message(&self, msg: String) {
        self.bar.abandon_with_message(msg);
    }
}

/// Format bytes in human-readable format
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

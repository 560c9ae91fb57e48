//! Severity-styled notifications.

use console::{StyledObject, style};
use indicatif::MultiProgress;
use roomdrop_core::{FileDescriptor, RoomEvent, Severity};

/// Prints notifications above any active progress bars
#[derive(Clone)]
pub struct Notifier {
    multi: MultiProgress,
}

impl Notifier {
    /// Create a notifier drawing through `multi`
    #[must_use]
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }

    /// Show a room event; progress updates are left to the bars
    pub fn event(&self, who: &str, event: &RoomEvent) {
        if matches!(event, RoomEvent::DownloadProgress { .. }) {
            return;
        }
        self.notify(event.severity(), who, &event.to_string());
    }

    /// Show a message
    pub fn notify(&self, severity: Severity, who: &str, message: &str) {
        let line = format!("{} {} {}", badge(severity), style(format!("[{who}]")).dim(), message);
        if self.multi.println(&line).is_err() {
            println!("{line}");
        }
    }
}

fn badge(severity: Severity) -> StyledObject<&'static str> {
    match severity {
        Severity::Success => style("ok  ").green().bold(),
        Severity::Info => style("info").cyan(),
        Severity::Warning => style("warn").yellow().bold(),
        Severity::Error => style("err ").red().bold(),
    }
}

/// Render descriptors as the peer's file table
#[must_use]
pub fn catalog_table(files: &[FileDescriptor]) -> String {
    let width = files
        .iter()
        .map(|f| f.stem().chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    let mut out = format!(
        "{}\n",
        style(format!("{:>3}  {:<width$}  {:<9}  {:>8}", "#", "Name", "Extension", "Size")).bold()
    );
    for (index, file) in files.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<width$}  {:<9}  {:>5} KB\n",
            index,
            file.stem(),
            file.extension(),
            file.size_kib()
        ));
    }
    if files.is_empty() {
        out.push_str("     (no files)\n");
    }
    out
}

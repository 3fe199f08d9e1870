//! Terminal output

use crossterm::style::Stylize;

use kubesift_logs::{FailureSink, LogEntry, RetrievalFailure};

/// Prints non-fatal retrieval failures in red on stderr
pub struct ConsoleSink;

impl FailureSink for ConsoleSink {
    fn report(&self, failure: &RetrievalFailure) {
        eprintln!("{}", format!("Error: {}", failure).red());
    }
}

/// Print every entry as `timestamp | pod | container | content`
pub fn print_raw(entries: &[LogEntry]) {
    for entry in entries {
        println!("{}", raw_line(entry));
    }
}

fn raw_line(entry: &LogEntry) -> String {
    format!(
        "{} | {} | {} | {}",
        entry.timestamp_rfc3339().green(),
        entry.pod_name.as_str().blue(),
        entry.container.as_str().magenta(),
        entry.content
    )
}

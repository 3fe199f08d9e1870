use chrono::Utc;

use kubesift_types::LogEntry;

/// Split a raw container log into entries, one per non-empty line
///
/// Invalid UTF-8 is replaced rather than rejected. Every line of one read
/// gets the same ingestion timestamp.
pub fn split_lines(raw: &[u8], namespace: &str, pod: &str, container: &str) -> Vec<LogEntry> {
    let text = String::from_utf8_lossy(raw);
    let now = Utc::now();

    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| LogEntry::new(namespace, pod, container, line).with_timestamp(now))
        .collect()
}

use std::fmt::Write;

use kubesift_types::LogEntry;

use crate::LogAnalysis;

const NO_CRITICAL_EVENTS: &str = "- No critical events detected.\n";
const NO_PERFORMANCE_ISSUES: &str = "- No significant performance issues detected.\n";

impl LogAnalysis {
    /// Render the analysis as a Markdown report
    ///
    /// The output depends only on the analysis, so equal analyses give
    /// byte-identical reports.
    pub fn report(&self) -> String {
        let mut out = String::from("### Kubernetes Log Analysis Report\n\n");
        let _ = writeln!(out, "- **Total Log Entries:** {}", self.total);
        let _ = writeln!(out, "- **Error Count:** {}", self.error_count);
        let _ = writeln!(out, "- **Warning Count:** {}\n", self.warning_count);

        out.push_str("#### Critical Events\n");
        write_events(&mut out, &self.critical_events, NO_CRITICAL_EVENTS);

        out.push_str("\n#### Performance Issues\n");
        write_events(&mut out, &self.performance_issues, NO_PERFORMANCE_ISSUES);

        out
    }
}

fn write_events(out: &mut String, events: &[LogEntry], placeholder: &str) {
    if events.is_empty() {
        out.push_str(placeholder);
        return;
    }
    for event in events {
        let _ = writeln!(
            out,
            "- `{} | {} | {}`: {}",
            event.timestamp_rfc3339(),
            event.pod_name,
            event.container,
            event.content
        );
    }
}

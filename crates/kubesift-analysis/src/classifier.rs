use regex::Regex;
use serde::Deserialize;

use kubesift_types::LogEntry;

/// Content prefix of restart lines listed among the critical events
pub const RESTART_PREFIX: &str = "Restart Event: ";

/// Pattern sources for each category, matched case-insensitively
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PatternSet {
    pub error: String,
    pub warning: String,
    pub performance: String,
    pub restart: String,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self {
            error: "error|critical|fatal|panic".to_string(),
            warning: "warning|warn".to_string(),
            performance: "timeout|latency|slow|high load".to_string(),
            restart: r"(pod|container).*restart|restart\w*.*(pod|container)".to_string(),
        }
    }
}

/// Classification bucket, in priority order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Error,
    Warning,
    Performance,
    Restart,
}

/// Rule-based classifier over log line content
///
/// Rules are tried in [`Category`] order and the first match wins, so a
/// line is never counted in two categories.
#[derive(Clone, Debug)]
pub struct Classifier {
    error: Regex,
    warning: Regex,
    performance: Regex,
    restart: Regex,
}

impl Classifier {
    /// Compile a pattern set
    pub fn new(patterns: &PatternSet) -> Result<Self, regex::Error> {
        Ok(Self {
            error: case_insensitive(&patterns.error)?,
            warning: case_insensitive(&patterns.warning)?,
            performance: case_insensitive(&patterns.performance)?,
            restart: case_insensitive(&patterns.restart)?,
        })
    }

    /// Category of a single line, if any rule matches
    pub fn categorize(&self, content: &str) -> Option<Category> {
        if self.error.is_match(content) {
            Some(Category::Error)
        } else if self.warning.is_match(content) {
            Some(Category::Warning)
        } else if self.performance.is_match(content) {
            Some(Category::Performance)
        } else if self.restart.is_match(content) {
            Some(Category::Restart)
        } else {
            None
        }
    }

    /// Classify a batch of entries from scratch
    pub fn analyze(&self, entries: &[LogEntry]) -> LogAnalysis {
        let mut analysis = LogAnalysis {
            total: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            match self.categorize(&entry.content) {
                Some(Category::Error) => {
                    analysis.error_count += 1;
                    analysis.critical_events.push(entry.clone());
                }
                Some(Category::Warning) => analysis.warning_count += 1,
                Some(Category::Performance) => analysis.performance_issues.push(entry.clone()),
                Some(Category::Restart) => analysis
                    .critical_events
                    .push(entry.with_content_prefix(RESTART_PREFIX)),
                None => {}
            }
        }

        analysis
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i){}", pattern))
}

/// Result of classifying one batch of entries
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogAnalysis {
    /// Number of entries analysed
    pub total: usize,
    pub error_count: usize,
    pub warning_count: usize,
    /// Error lines and restart lines, in input order
    pub critical_events: Vec<LogEntry>,
    /// Latency and load related lines, in input order
    pub performance_issues: Vec<LogEntry>,
}

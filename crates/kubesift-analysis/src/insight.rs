use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kubesift_types::LogEntry;

use crate::LogAnalysis;

/// System prompt sent along with every analysis
pub const ANALYSIS_PROMPT: &str = "\
You are an experienced Kubernetes operator reviewing container logs. Read the \
analysis below and explain what is going on. Cover:
1. Errors and warnings: the failures or problems they point to.
2. Patterns: repeated messages or sequences that hint at a systemic cause or a misconfiguration.
3. System events: startups, shutdowns, restarts and other state changes.
4. Performance: timeouts, latency and load problems.
5. Recommendations: concrete next steps to fix the issues or improve stability.

Answer with these sections:
* **Summary of Key Events**
* **Detected Issues and Errors**
* **Pattern Observations**
* **Actionable Recommendations**";

/// Settings for the insight service
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Base URL of the Azure OpenAI resource
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Model deployment name
    pub deployment: Option<String>,
    pub api_version: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Inputs longer than this are cut before sending
    pub max_input_bytes: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: None,
            api_version: "2024-02-01".to_string(),
            max_tokens: 750,
            timeout_secs: 30,
            max_input_bytes: 10_000,
        }
    }
}

impl InsightConfig {
    pub const API_KEY_VAR: &'static str = "AZURE_API_KEY";
    pub const ENDPOINT_VAR: &'static str = "AZURE_API_BASE";
    pub const DEPLOYMENT_VAR: &'static str = "AZURE_DEPLOYMENT_NAME";

    /// Override credentials from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };
        set(&mut self.api_key, Self::API_KEY_VAR);
        set(&mut self.endpoint, Self::ENDPOINT_VAR);
        set(&mut self.deployment, Self::DEPLOYMENT_VAR);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for InsightConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_input_bytes", &self.max_input_bytes)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("missing insight service setting {0}")]
    MissingConfig(&'static str),

    #[error("insight service request failed")]
    Http(#[from] reqwest::Error),

    #[error("insight service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no insights generated")]
    Empty,

    #[error("insight service did not answer within {0:?}")]
    Timeout(Duration),
}

/// External service turning an analysis into prose
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, input: &str) -> Result<String, InsightError>;
}

/// Build the text sent to the insight service, capped at `max_bytes`
pub fn compose_insight_input(analysis: &LogAnalysis, max_bytes: usize) -> String {
    let mut input = format!(
        "Detailed Report:\n{}\n\nCritical Events:\n{}\n\nPerformance Issues:\n{}",
        analysis.report(),
        excerpt(&analysis.critical_events),
        excerpt(&analysis.performance_issues),
    );

    if input.len() > max_bytes {
        let cut = floor_char_boundary(&input, max_bytes);
        input.truncate(cut);
    }
    input
}

fn excerpt(entries: &[LogEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "{} | {} | {} | {}",
                e.timestamp_rfc3339(),
                e.namespace,
                e.pod_name,
                e.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the largest valid char boundary <= the given byte index
fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Ask `generator` for insights on `analysis`, giving up after the configured timeout
pub async fn generate_insights(
    generator: &dyn InsightGenerator,
    analysis: &LogAnalysis,
    config: &InsightConfig,
) -> Result<String, InsightError> {
    let input = compose_insight_input(analysis, config.max_input_bytes);
    let deadline = config.timeout();
    debug!(bytes = input.len(), timeout = ?deadline, "requesting insights");

    let insights = tokio::time::timeout(deadline, generator.generate(&input))
        .await
        .map_err(|_| InsightError::Timeout(deadline))??;

    info!(bytes = insights.len(), "insights received");
    Ok(insights)
}

// ============================================================================
// Azure OpenAI
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions client for an Azure OpenAI deployment
pub struct AzureOpenAiGenerator {
    http: reqwest::Client,
    url: String,
    api_key: String,
    api_version: String,
    max_tokens: u32,
}

impl AzureOpenAiGenerator {
    /// Create a client; endpoint, key and deployment are required
    pub fn new(config: &InsightConfig) -> Result<Self, InsightError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or(InsightError::MissingConfig(InsightConfig::ENDPOINT_VAR))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or(InsightError::MissingConfig(InsightConfig::API_KEY_VAR))?;
        let deployment = config
            .deployment
            .as_deref()
            .ok_or(InsightError::MissingConfig(InsightConfig::DEPLOYMENT_VAR))?;

        Ok(Self {
            http: reqwest::Client::builder().build()?,
            url: format!(
                "{}/openai/deployments/{}/chat/completions",
                endpoint.trim_end_matches('/'),
                deployment
            ),
            api_key,
            api_version: config.api_version.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl InsightGenerator for AzureOpenAiGenerator {
    async fn generate(&self, input: &str) -> Result<String, InsightError> {
        let question = format!(
            "Analyze the following Kubernetes log analysis and provide strategic insights and recommendations:\n\n{}",
            input
        );
        let request = ChatRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: ANALYSIS_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &question,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InsightError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(InsightError::Empty)
    }
}

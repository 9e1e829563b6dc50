//! Alignment analyzer: outbound call to the language-model endpoint that
//! judges whether a push drifts from the workspace's stated feature goals.
//!
//! The upstream is slow and occasionally unavailable, so the contract is
//! strict: a hard request timeout, at most one retry on transient failure,
//! and a deterministic neutral verdict when both attempts fail. The caller
//! gates invocations per workspace through a sliding-window limiter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What the analyzer is asked to judge.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentRequest {
    pub branch: String,
    pub commit_hash: String,
    pub modified_files: Vec<String>,
    pub feature_names: Vec<String>,
}

/// Analyzer verdict. The neutral fallback reports no drift so an upstream
/// outage can never manufacture blockers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlignmentVerdict {
    pub drift: bool,
    #[serde(default)]
    pub summary: String,
}

impl AlignmentVerdict {
    pub fn neutral() -> Self {
        Self {
            drift: false,
            summary: String::new(),
        }
    }
}

#[async_trait]
pub trait AlignmentAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AlignmentRequest) -> AlignmentVerdict;
}

#[derive(Debug, Clone)]
pub struct AlignmentSettings {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// HTTP implementation over the configured LM endpoint.
pub struct HttpAlignmentAnalyzer {
    client: reqwest::Client,
    settings: AlignmentSettings,
}

impl std::fmt::Debug for HttpAlignmentAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAlignmentAnalyzer")
            .field("endpoint", &self.settings.endpoint)
            .field("model", &self.settings.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeBody<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a AlignmentRequest,
}

impl HttpAlignmentAnalyzer {
    pub fn new(settings: AlignmentSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self { client, settings })
    }

    async fn attempt(&self, request: &AlignmentRequest) -> anyhow::Result<AlignmentVerdict> {
        let body = AnalyzeBody {
            model: &self.settings.model,
            request,
        };

        let response = self
            .client
            .post(&self.settings.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<AlignmentVerdict>().await?)
    }
}

#[async_trait]
impl AlignmentAnalyzer for HttpAlignmentAnalyzer {
    async fn analyze(&self, request: &AlignmentRequest) -> AlignmentVerdict {
        let mut attempts = 0;
        loop {
            match self.attempt(request).await {
                Ok(verdict) => {
                    debug!(
                        branch = %request.branch,
                        drift = verdict.drift,
                        "alignment verdict received"
                    );
                    return verdict;
                }
                Err(e) if attempts < self.settings.max_retries => {
                    attempts += 1;
                    warn!(
                        branch = %request.branch,
                        attempt = attempts,
                        error = %e,
                        "alignment call failed, retrying"
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => {
                    warn!(
                        branch = %request.branch,
                        error = %e,
                        "alignment unavailable, falling back to neutral verdict"
                    );
                    return AlignmentVerdict::neutral();
                }
            }
        }
    }
}

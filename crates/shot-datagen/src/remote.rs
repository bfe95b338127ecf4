//! LLM-backed generation over a chat-completions API
//!
//! The requested count is split into round-trips of `per_request` examples.
//! Round-trips run with bounded concurrency; each is retried with exponential
//! backoff on transient failure and otherwise skipped and reported. Results
//! are reassembled in request order so the artifact does not depend on
//! completion timing.

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use shot_schema::{parse_example_values, validate_records, RecordRejection, TrainingExample};
use tracing::{debug, info, instrument, warn};

use crate::error::{DatagenError, GenerationError, Result};
use crate::provider::ProviderConfig;
use crate::report::GenerationReport;
use crate::templates::{remote_system_prompt, remote_user_prompt, MOODS, TARGETS};

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Characters of an error body kept in reports.
const BODY_EXCERPT_CHARS: usize = 200;

/// Tuning knobs for a remote run
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Examples asked for per round-trip
    pub per_request: usize,
    /// Round-trips in flight at once
    pub concurrency: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time
    pub retry_backoff: Duration,
    /// Seed for theme hints
    pub seed: Option<u64>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        RemoteOptions {
            per_request: 1,
            concurrency: 4,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            seed: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        ChatMessage {
            role: role.to_string(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Generator backed by a remote chat-completions provider
pub struct RemoteGenerator {
    config: ProviderConfig,
    options: RemoteOptions,
    http_client: reqwest::Client,
}

impl RemoteGenerator {
    pub fn new(config: ProviderConfig, options: RemoteOptions) -> Result<Self> {
        if options.per_request == 0 {
            return Err(DatagenError::Configuration(
                "per_request must be at least 1".to_string(),
            ));
        }
        if options.concurrency == 0 {
            return Err(DatagenError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("shot-datagen/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(RemoteGenerator {
            config,
            options,
            http_client,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Generate up to `count` examples.
    ///
    /// Individual round-trip failures are reported, not raised. A credential
    /// rejected by the provider aborts the run with a configuration error.
    #[instrument(skip(self), fields(provider = %self.config.provider, model = %self.config.model))]
    pub async fn generate(&self, count: usize) -> Result<(Vec<TrainingExample>, GenerationReport)> {
        let per_request = self.options.per_request;
        let plan: Vec<usize> = (0..count)
            .step_by(per_request)
            .map(|start| per_request.min(count - start))
            .collect();

        let mut rng = StdRng::seed_from_u64(self.options.seed.unwrap_or_else(rand::random));
        let themes: Vec<(&str, &str)> = plan
            .iter()
            .map(|_| {
                (
                    MOODS[rng.gen_range(0..MOODS.len())],
                    TARGETS[rng.gen_range(0..TARGETS.len())],
                )
            })
            .collect();

        info!(
            requested = count,
            requests = plan.len(),
            concurrency = self.options.concurrency,
            "Starting remote generation"
        );

        // A rejected credential ends the stream at once; later requests are
        // never sent and in-flight ones are dropped.
        let mut outcomes: Vec<(usize, std::result::Result<Vec<serde_json::Value>, GenerationError>)> =
            stream::iter(plan.iter().copied().zip(themes).enumerate())
                .map(|(request, (want, (mood, target)))| async move {
                    match self.run_request(request, want, mood, target).await {
                        Err(GenerationError::Unauthorized { status, .. }) => {
                            Err(self.credential_rejected(status))
                        }
                        outcome => Ok((request, outcome)),
                    }
                })
                .buffer_unordered(self.options.concurrency)
                .try_collect()
                .await?;
        outcomes.sort_by_key(|(request, _)| *request);

        let mut report = GenerationReport {
            mode: self.config.provider.to_string(),
            requested: count,
            requests: plan.len(),
            ..Default::default()
        };
        let mut examples = Vec::with_capacity(count);
        let mut returned = 0;

        for (request, outcome) in outcomes {
            match outcome {
                Ok(values) => {
                    let base = returned;
                    returned += values.len();
                    let (valid, dataset_report) = validate_records(values);
                    report.rejected_records.extend(dataset_report.rejected.into_iter().map(
                        |rejection| RecordRejection {
                            index: base + rejection.index,
                            reason: format!("request {request}: {}", rejection.reason),
                        },
                    ));
                    examples.extend(valid);
                }
                Err(err) => {
                    report.failed_requests += 1;
                    report.errors.push(err);
                }
            }
        }

        examples.truncate(count);
        report.produced = examples.len();

        info!(
            produced = report.produced,
            failed_requests = report.failed_requests,
            rejected_records = report.rejected_records.len(),
            "Remote generation finished"
        );
        Ok((examples, report))
    }

    fn credential_rejected(&self, status: u16) -> DatagenError {
        DatagenError::Configuration(format!(
            "{} rejected the API key (HTTP {status}); check {}",
            self.config.provider,
            self.config.provider.api_key_var()
        ))
    }

    async fn run_request(
        &self,
        request: usize,
        want: usize,
        mood: &str,
        target: &str,
    ) -> std::result::Result<Vec<serde_json::Value>, GenerationError> {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(request, want, mood, target).await {
                Ok(values) => {
                    debug!(request, returned = values.len(), "Provider request succeeded");
                    return Ok(values);
                }
                Err(err) if err.is_retryable() && attempt < self.options.max_retries => {
                    let delay = backoff(self.options.retry_backoff, attempt);
                    warn!(
                        event = "generation.request_retry",
                        request,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying provider request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        event = "generation.request_failed",
                        request,
                        attempts = attempt + 1,
                        error = %err,
                        "Provider request failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: usize,
        want: usize,
        mood: &str,
        target: &str,
    ) -> std::result::Result<Vec<serde_json::Value>, GenerationError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage::new("system", remote_system_prompt(want)),
                ChatMessage::new(
                    "user",
                    remote_user_prompt(request + 1, want, mood, target),
                ),
            ],
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network {
                request,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited { request });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GenerationError::Unauthorized {
                request,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                request,
                status: status.as_u16(),
                body: text.chars().take(BODY_EXCERPT_CHARS).collect(),
            });
        }

        let completion: ChatCompletion =
            response
                .json()
                .await
                .map_err(|e| GenerationError::Unparseable {
                    request,
                    reason: format!("invalid response body: {e}"),
                })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Unparseable {
                request,
                reason: "response has no message content".to_string(),
            })?;

        let values = parse_example_values(&content).map_err(|e| GenerationError::Unparseable {
            request,
            reason: e.to_string(),
        })?;
        if values.is_empty() {
            return Err(GenerationError::Unparseable {
                request,
                reason: "no examples".to_string(),
            });
        }
        Ok(values)
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

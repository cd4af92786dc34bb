//! Capability client trait and implementations.
//!
//! A capability is either a reasoning agent (streamed response with trace
//! events) or a processing function (single structured value). The client
//! normalizes both behind one trait so the executor never touches transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::error::{CapabilityError, Result, from_reqwest};
use crate::stream::{collect_invocation, decode_frame_stream};
use crate::types::{AgentInput, CapabilityInvocation};

/// Default ceiling for one invocation. Agent invocations routinely run for
/// minutes, so this is generous.
const DEFAULT_TIMEOUT_SECS: u64 = 900;

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors; everything else returns immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    capability: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        capability = capability,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Invocation failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap())
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Invokes named remote capabilities and normalizes their responses.
#[async_trait]
pub trait CapabilityClient: Send + Sync {
    /// Invoke an agent-type capability, consuming its response stream.
    ///
    /// Cancellation must propagate into the in-flight stream consumption.
    async fn invoke_agent(
        &self,
        capability_id: &str,
        input: AgentInput,
        cancel: &CancellationToken,
    ) -> Result<CapabilityInvocation>;

    /// Invoke a function-type capability: single structured request/response.
    async fn invoke_function(
        &self,
        capability_id: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value>;
}

/// A client that can be shared across executor instances.
pub type SharedCapabilityClient = Arc<dyn CapabilityClient>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the HTTP capability client.
#[derive(Debug, Clone)]
pub struct CapabilityConfig {
    /// Base URL of the capability gateway.
    pub base_url: String,

    /// Per-invocation ceiling.
    pub timeout: Duration,

    /// Maximum retries for transient function-call errors. Agent invocations
    /// are never auto-retried here; the executor owns retry policy for them.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
}

impl CapabilityConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────────────────────────

/// Capability client speaking HTTP to a capability gateway.
///
/// Agent invocations stream newline-delimited frames; function invocations
/// are plain JSON request/response.
pub struct HttpCapabilityClient {
    client: Client,
    config: CapabilityConfig,
}

impl HttpCapabilityClient {
    pub fn new(config: CapabilityConfig) -> Result<Self> {
        // No client-level timeout: it would cap the whole stream. The
        // per-invocation ceiling is enforced with tokio::time::timeout.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                CapabilityError::unavailable("gateway", format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    fn agent_url(&self, capability_id: &str) -> String {
        format!("{}/v1/agents/{}/invoke", self.config.base_url, capability_id)
    }

    fn function_url(&self, capability_id: &str) -> String {
        format!(
            "{}/v1/functions/{}/invoke",
            self.config.base_url, capability_id
        )
    }

    async fn check_status(capability_id: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            Err(CapabilityError::unavailable(
                capability_id,
                format!("HTTP {}: {}", status, body),
            ))
        } else {
            Err(CapabilityError::invalid_response(
                capability_id,
                format!("HTTP {}: {}", status, body),
            ))
        }
    }
}

#[async_trait]
impl CapabilityClient for HttpCapabilityClient {
    async fn invoke_agent(
        &self,
        capability_id: &str,
        input: AgentInput,
        cancel: &CancellationToken,
    ) -> Result<CapabilityInvocation> {
        tracing::info!(
            capability = %capability_id,
            session = %input.session_id,
            "Invoking agent capability"
        );

        let invoke = async {
            let response = self
                .client
                .post(self.agent_url(capability_id))
                .json(&input)
                .send()
                .await
                .map_err(|e| from_reqwest(capability_id, e))?;

            let response = Self::check_status(capability_id, response).await?;
            let frames = decode_frame_stream(capability_id.to_string(), response.bytes_stream());
            collect_invocation(capability_id, frames, cancel).await
        };

        match tokio::time::timeout(self.config.timeout, invoke).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::timeout(
                capability_id,
                self.config.timeout.as_secs(),
            )),
        }
    }

    async fn invoke_function(
        &self,
        capability_id: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        tracing::info!(capability = %capability_id, "Invoking function capability");

        let invoke = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            capability_id,
            || async {
                let response = self
                    .client
                    .post(self.function_url(capability_id))
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| from_reqwest(capability_id, e))?;

                let response = Self::check_status(capability_id, response).await?;
                response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| CapabilityError::invalid_response(capability_id, e.to_string()))
            },
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(CapabilityError::cancelled(capability_id)),
            result = tokio::time::timeout(self.config.timeout, invoke) => match result {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::timeout(
                    capability_id,
                    self.config.timeout.as_secs(),
                )),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock client
// ─────────────────────────────────────────────────────────────────────────────

/// What a mock invocation was asked to do.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub capability_id: String,
    /// Instruction text for agents, payload JSON for functions.
    pub input: String,
}

/// A scripted capability client for deterministic executor tests.
///
/// Responses queue per capability id and are returned in order; running out
/// is an error so tests fail loudly on unexpected extra invocations.
#[derive(Default)]
pub struct MockCapabilityClient {
    agents: std::sync::Mutex<std::collections::HashMap<String, std::collections::VecDeque<Result<CapabilityInvocation>>>>,
    functions: std::sync::Mutex<std::collections::HashMap<String, std::collections::VecDeque<Result<serde_json::Value>>>>,
    requests: std::sync::Mutex<Vec<RecordedRequest>>,
}

impl MockCapabilityClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full agent invocation result.
    pub fn push_agent(&self, capability_id: &str, result: Result<CapabilityInvocation>) {
        self.agents
            .lock()
            .unwrap()
            .entry(capability_id.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queue a text-only agent response.
    pub fn push_agent_text(&self, capability_id: &str, text: impl Into<String>) {
        self.push_agent(
            capability_id,
            Ok(CapabilityInvocation::with_text(capability_id, text)),
        );
    }

    /// Queue a function invocation result.
    pub fn push_function(&self, capability_id: &str, result: Result<serde_json::Value>) {
        self.functions
            .lock()
            .unwrap()
            .entry(capability_id.to_string())
            .or_default()
            .push_back(result);
    }

    /// All requests made so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CapabilityClient for MockCapabilityClient {
    async fn invoke_agent(
        &self,
        capability_id: &str,
        input: AgentInput,
        cancel: &CancellationToken,
    ) -> Result<CapabilityInvocation> {
        if cancel.is_cancelled() {
            return Err(CapabilityError::cancelled(capability_id));
        }

        self.requests.lock().unwrap().push(RecordedRequest {
            capability_id: capability_id.to_string(),
            input: input.instruction,
        });

        self.agents
            .lock()
            .unwrap()
            .get_mut(capability_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(CapabilityError::unavailable(
                    capability_id,
                    "mock: no scripted agent response",
                ))
            })
    }

    async fn invoke_function(
        &self,
        capability_id: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        if cancel.is_cancelled() {
            return Err(CapabilityError::cancelled(capability_id));
        }

        self.requests.lock().unwrap().push(RecordedRequest {
            capability_id: capability_id.to_string(),
            input: payload.to_string(),
        });

        self.functions
            .lock()
            .unwrap()
            .get_mut(capability_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(CapabilityError::unavailable(
                    capability_id,
                    "mock: no scripted function response",
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TraceEvent;

    #[tokio::test]
    async fn test_mock_agent_responses_in_order() {
        let mock = MockCapabilityClient::new();
        mock.push_agent_text("scanner", "first");
        mock.push_agent_text("scanner", "second");

        let cancel = CancellationToken::new();
        let r1 = mock
            .invoke_agent("scanner", AgentInput::new("go", "s1"), &cancel)
            .await
            .unwrap();
        let r2 = mock
            .invoke_agent("scanner", AgentInput::new("go", "s1"), &cancel)
            .await
            .unwrap();

        assert_eq!(r1.final_text, "first");
        assert_eq!(r2.final_text, "second");
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_exhausted_is_error() {
        let mock = MockCapabilityClient::new();
        let cancel = CancellationToken::new();
        let result = mock
            .invoke_agent("scanner", AgentInput::new("go", "s1"), &cancel)
            .await;
        assert!(matches!(result, Err(CapabilityError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_mock_respects_cancellation() {
        let mock = MockCapabilityClient::new();
        mock.push_agent_text("scanner", "never seen");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = mock
            .invoke_agent("scanner", AgentInput::new("go", "s1"), &cancel)
            .await;
        assert!(matches!(result, Err(CapabilityError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_mock_agent_with_trace() {
        let mock = MockCapabilityClient::new();
        let mut inv = CapabilityInvocation::with_text("pr", "opened");
        inv.trace_events.push(TraceEvent::new("create-branch", 201));
        mock.push_agent("pr", Ok(inv));

        let got = mock
            .invoke_agent("pr", AgentInput::new("publish", "s1"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(got.succeeded_operations(), vec!["create-branch"]);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_on_permanent_errors() {
        let mut calls = 0;
        let result: Result<()> = with_retry(3, Duration::from_millis(1), "cap", || {
            calls += 1;
            async { Err(CapabilityError::invalid_response("cap", "bad")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_with_retry_retries_transient_errors() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), "cap", || {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CapabilityError::unavailable("cap", "flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}

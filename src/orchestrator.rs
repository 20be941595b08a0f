//! Fallback chain orchestrator.
//!
//! ## Responsibility
//! Try the configured remote backends in fixed priority order, stop at the
//! first valid report, and degrade to the local heuristic when every remote
//! stage is exhausted.
//!
//! ## Guarantees
//! - Total: every call returns an [`AnalysisResult`], never an error
//! - Ordered: primary is always attempted before secondary, one call each
//! - Stateless: nothing is carried between requests
//!
//! ## NOT Responsible For
//! - Input validation (see `web_api`)
//! - Reading credentials (see [`BrokerConfig::resolve_credentials`])

use crate::backend::{BackendOutcome, ChatBackend, ComplexityBackend, GeminiBackend};
use crate::config::BrokerConfig;
use crate::heuristic;
use crate::metrics;
use crate::report::ComplexityReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Which stage of the chain produced a result.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// The primary remote backend.
    Primary,
    /// The secondary remote backend.
    Secondary,
    /// The local heuristic analyzer.
    Fallback,
}

impl Source {
    /// Lowercase label, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Secondary => "secondary",
            Source::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the heuristic analyzer produced the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Neither remote backend has credentials.
    MissingApiKey,
    /// Both remote backends were attempted and neither produced a report.
    BothFailed,
    /// Primary was attempted and failed; secondary has no credentials.
    PrimaryFailed,
    /// Primary has no credentials; secondary was attempted and failed.
    SecondaryFailed,
    /// Something unexpected happened while processing the request.
    Exception(String),
}

impl FallbackReason {
    /// Derive the reason from which remote stages were actually attempted.
    pub fn from_attempts(primary_attempted: bool, secondary_attempted: bool) -> Self {
        match (primary_attempted, secondary_attempted) {
            (false, false) => FallbackReason::MissingApiKey,
            (true, true) => FallbackReason::BothFailed,
            (true, false) => FallbackReason::PrimaryFailed,
            (false, true) => FallbackReason::SecondaryFailed,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::MissingApiKey => f.write_str("Missing API key"),
            FallbackReason::BothFailed => f.write_str("Both primary and secondary failed"),
            FallbackReason::PrimaryFailed => {
                f.write_str("Primary failed and secondary is not configured")
            }
            FallbackReason::SecondaryFailed => {
                f.write_str("Secondary failed and primary is not configured")
            }
            FallbackReason::Exception(detail) => {
                write!(f, "Exception during processing: {detail}")
            }
        }
    }
}

/// Response envelope returned to the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Two-line `Time Complexity` / `Space Complexity` block.
    pub result: String,
    /// `true` only when a remote backend produced the report.
    pub success: bool,
    /// Stage that produced the result.
    pub source: Source,
    /// Present only when `source` is [`Source::Fallback`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AnalysisResult {
    /// Envelope for a report produced by a remote backend.
    pub fn from_backend(source: Source, report: &ComplexityReport) -> Self {
        Self {
            result: report.to_string(),
            success: true,
            source,
            reason: None,
        }
    }

    /// Envelope for the heuristic analysis of `code`.
    pub fn fallback(code: &str, reason: FallbackReason) -> Self {
        Self {
            result: heuristic::analyze(code).to_string(),
            success: false,
            source: Source::Fallback,
            reason: Some(reason.to_string()),
        }
    }
}

enum Stage {
    TryPrimary,
    TrySecondary { primary_attempted: bool },
    UseHeuristic(FallbackReason),
    Done(AnalysisResult),
}

/// Runs the primary → secondary → heuristic chain.
///
/// Holds only immutable state, so a single instance is shared as
/// `Arc<Orchestrator>` across all requests.
pub struct Orchestrator {
    primary: Option<Arc<dyn ComplexityBackend>>,
    secondary: Option<Arc<dyn ComplexityBackend>>,
    deadline: Option<Duration>,
}

impl Orchestrator {
    /// Build from explicit backend slots. `None` marks a stage as not configured.
    pub fn new(
        primary: Option<Arc<dyn ComplexityBackend>>,
        secondary: Option<Arc<dyn ComplexityBackend>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            deadline: None,
        }
    }

    /// Bound the whole chain by `deadline` in [`Orchestrator::resolve_with_deadline`].
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build from a config whose credentials have already been resolved.
    pub fn from_config(config: &BrokerConfig) -> Self {
        let primary = GeminiBackend::from_config(&config.primary)
            .map(|b| Arc::new(b) as Arc<dyn ComplexityBackend>);
        let secondary = ChatBackend::from_config(&config.secondary)
            .map(|b| Arc::new(b) as Arc<dyn ComplexityBackend>);

        info!(
            primary_configured = primary.is_some(),
            secondary_configured = secondary.is_some(),
            "orchestrator configured"
        );

        Self {
            primary,
            secondary,
            deadline: config.server.request_deadline_ms.map(Duration::from_millis),
        }
    }

    /// Whether the primary stage will be attempted.
    pub fn primary_configured(&self) -> bool {
        self.primary.is_some()
    }

    /// Whether the secondary stage will be attempted.
    pub fn secondary_configured(&self) -> bool {
        self.secondary.is_some()
    }

    /// Run the chain for `code`.
    pub async fn resolve(&self, code: &str) -> AnalysisResult {
        let mut stage = Stage::TryPrimary;
        loop {
            stage = match stage {
                Stage::TryPrimary => match &self.primary {
                    Some(backend) => {
                        match self.attempt(backend.as_ref(), Source::Primary, code).await {
                            Some(result) => Stage::Done(result),
                            None => Stage::TrySecondary {
                                primary_attempted: true,
                            },
                        }
                    }
                    None => {
                        debug!("primary not configured, skipping");
                        Stage::TrySecondary {
                            primary_attempted: false,
                        }
                    }
                },
                Stage::TrySecondary { primary_attempted } => match &self.secondary {
                    Some(backend) => {
                        match self.attempt(backend.as_ref(), Source::Secondary, code).await {
                            Some(result) => Stage::Done(result),
                            None => Stage::UseHeuristic(FallbackReason::from_attempts(
                                primary_attempted,
                                true,
                            )),
                        }
                    }
                    None => {
                        debug!("secondary not configured, skipping");
                        Stage::UseHeuristic(FallbackReason::from_attempts(
                            primary_attempted,
                            false,
                        ))
                    }
                },
                Stage::UseHeuristic(reason) => {
                    info!(reason = %reason, "using heuristic analyzer");
                    Stage::Done(AnalysisResult::fallback(code, reason))
                }
                Stage::Done(result) => {
                    metrics::inc_request(result.source.as_str());
                    return result;
                }
            };
        }
    }

    /// Run the chain, bounded by the configured deadline if any.
    ///
    /// When the deadline elapses the in-flight backend call is dropped and
    /// the heuristic result is returned with an `Exception` reason.
    pub async fn resolve_with_deadline(&self, code: &str) -> AnalysisResult {
        let Some(deadline) = self.deadline else {
            return self.resolve(code).await;
        };

        match tokio::time::timeout(deadline, self.resolve(code)).await {
            Ok(result) => result,
            Err(_) => {
                let millis = deadline.as_millis();
                warn!(deadline_ms = millis as u64, "analysis deadline exceeded");
                let result = AnalysisResult::fallback(
                    code,
                    FallbackReason::Exception(format!(
                        "analysis deadline of {millis}ms exceeded"
                    )),
                );
                metrics::inc_request(result.source.as_str());
                result
            }
        }
    }

    /// Run the chain on its own task so a panic inside a backend still
    /// yields a heuristic result instead of tearing down the connection.
    pub async fn resolve_isolated(self: Arc<Self>, code: String) -> AnalysisResult {
        let task_code = code.clone();
        let orchestrator = Arc::clone(&self);
        let handle = tokio::spawn(
            async move { orchestrator.resolve_with_deadline(&task_code).await }.in_current_span(),
        );

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "analysis task failed");
                let result = AnalysisResult::fallback(
                    &code,
                    FallbackReason::Exception(format!("analysis task failed: {e}")),
                );
                metrics::inc_request(result.source.as_str());
                result
            }
        }
    }

    async fn attempt(
        &self,
        backend: &dyn ComplexityBackend,
        source: Source,
        code: &str,
    ) -> Option<AnalysisResult> {
        let start = Instant::now();
        let outcome = backend.invoke(code).await;
        let elapsed = start.elapsed();

        metrics::record_backend_call(backend.name(), outcome.label(), elapsed);
        let latency_ms = elapsed.as_millis() as u64;

        match outcome {
            BackendOutcome::Success(report) => {
                info!(
                    backend = backend.name(),
                    source = %source,
                    latency_ms,
                    "backend produced a report"
                );
                Some(AnalysisResult::from_backend(source, &report))
            }
            BackendOutcome::Invalid(raw) => {
                warn!(
                    backend = backend.name(),
                    outcome = "invalid",
                    latency_ms,
                    raw_len = raw.len(),
                    "backend response failed the report contract"
                );
                None
            }
            BackendOutcome::Failure(e) => {
                warn!(
                    backend = backend.name(),
                    outcome = "failure",
                    latency_ms,
                    error = %e,
                    "backend call failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrokerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Report,
        Invalid,
        Fail,
    }

    struct Scripted {
        name: &'static str,
        reply: Reply,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn arc(name: &'static str, reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ComplexityBackend for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn invoke(&self, _code: &str) -> BackendOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Report => {
                    BackendOutcome::Success(ComplexityReport::new("O(n)", "O(n)"))
                }
                Reply::Invalid => BackendOutcome::Invalid("no marker".into()),
                Reply::Fail => BackendOutcome::Failure(BrokerError::Backend("503".into())),
            }
        }
    }

    fn slot(b: &Arc<Scripted>) -> Option<Arc<dyn ComplexityBackend>> {
        Some(Arc::clone(b) as Arc<dyn ComplexityBackend>)
    }

    #[test]
    fn test_reason_messages() {
        assert_eq!(FallbackReason::MissingApiKey.to_string(), "Missing API key");
        assert_eq!(
            FallbackReason::Exception("boom".into()).to_string(),
            "Exception during processing: boom"
        );
    }

    #[test]
    fn test_reason_from_attempts_covers_all_combinations() {
        assert_eq!(
            FallbackReason::from_attempts(false, false),
            FallbackReason::MissingApiKey
        );
        assert_eq!(
            FallbackReason::from_attempts(true, true),
            FallbackReason::BothFailed
        );
        assert_eq!(
            FallbackReason::from_attempts(true, false),
            FallbackReason::PrimaryFailed
        );
        assert_eq!(
            FallbackReason::from_attempts(false, true),
            FallbackReason::SecondaryFailed
        );
    }

    #[test]
    fn test_envelope_omits_reason_when_absent() {
        let result =
            AnalysisResult::from_backend(Source::Primary, &ComplexityReport::new("O(1)", "O(1)"));
        let json = serde_json::to_value(&result).expect("test: serialize");
        assert_eq!(json["source"], "primary");
        assert_eq!(json["success"], true);
        assert!(json.get("reason").is_none());
    }

    #[tokio::test]
    async fn test_primary_success_short_circuits() {
        let primary = Scripted::arc("p", Reply::Report);
        let secondary = Scripted::arc("s", Reply::Report);
        let orch = Orchestrator::new(slot(&primary), slot(&secondary));

        let result = orch.resolve("x = 1").await;
        assert_eq!(result.source, Source::Primary);
        assert!(result.success);
        assert_eq!(result.result, "Time Complexity: O(n)\nSpace Complexity: O(n)");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_primary_falls_through_to_secondary() {
        let primary = Scripted::arc("p", Reply::Invalid);
        let secondary = Scripted::arc("s", Reply::Report);
        let orch = Orchestrator::new(slot(&primary), slot(&secondary));

        let result = orch.resolve("x = 1").await;
        assert_eq!(result.source, Source::Secondary);
        assert!(result.reason.is_none());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_failing_uses_heuristic() {
        let primary = Scripted::arc("p", Reply::Fail);
        let secondary = Scripted::arc("s", Reply::Invalid);
        let orch = Orchestrator::new(slot(&primary), slot(&secondary));

        let result = orch.resolve("x = 1").await;
        assert_eq!(result.source, Source::Fallback);
        assert!(!result.success);
        assert_eq!(result.result, "Time Complexity: O(1)\nSpace Complexity: O(1)");
        assert_eq!(
            result.reason.as_deref(),
            Some("Both primary and secondary failed")
        );
    }

    #[tokio::test]
    async fn test_nothing_configured_reports_missing_key() {
        let orch = Orchestrator::new(None, None);
        assert!(!orch.primary_configured());
        assert!(!orch.secondary_configured());

        let result = orch.resolve("x = 1").await;
        assert_eq!(result.reason.as_deref(), Some("Missing API key"));
    }

    #[tokio::test]
    async fn test_only_secondary_configured_and_failing() {
        let secondary = Scripted::arc("s", Reply::Fail);
        let orch = Orchestrator::new(None, slot(&secondary));

        let result = orch.resolve("x = 1").await;
        assert_eq!(
            result.reason.as_deref(),
            Some("Secondary failed and primary is not configured")
        );
    }

    #[tokio::test]
    async fn test_resolve_with_deadline_without_deadline_is_plain_resolve() {
        let primary = Scripted::arc("p", Reply::Report);
        let orch = Orchestrator::new(slot(&primary), None);
        let result = orch.resolve_with_deadline("x = 1").await;
        assert_eq!(result.source, Source::Primary);
    }

    #[test]
    fn test_from_default_config_has_no_backends() {
        let orch = Orchestrator::from_config(&BrokerConfig::default());
        assert!(!orch.primary_configured());
        assert!(!orch.secondary_configured());
    }
}

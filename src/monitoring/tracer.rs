/*!
 * Structured Tracing
 * Subscriber setup and timed operation spans using the tracing crate
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Environment variable switching the subscriber to JSON output
pub const TRACE_JSON_ENV: &str = "DEVFLEET_TRACE_JSON";

const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(100);

/// Install the global subscriber
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - DEVFLEET_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(TRACE_JSON_ENV)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Generate a unique trace ID for correlating one operation's records
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Timed span around one operation
///
/// Logs completion on drop and warns when the operation outlived its slow
/// threshold.
pub struct OperationSpan {
    span: Span,
    start: Instant,
    trace_id: String,
    operation: String,
    slow_threshold: Duration,
}

impl OperationSpan {
    pub fn new(operation: &str) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "operation",
            trace_id = %trace_id,
            operation = operation,
            subject = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        span.in_scope(|| debug!(operation = operation, trace_id = %trace_id, "operation started"));

        Self {
            span,
            start: Instant::now(),
            trace_id,
            operation: operation.to_string(),
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        }
    }

    /// Warn on drop only past `threshold`
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Name what the operation acts on, e.g. a build id
    pub fn with_subject(self, subject: &str) -> Self {
        self.span.record("subject", subject);
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
        self.span.record("result", "error");
    }

    /// Underlying span, for instrumenting futures with `Instrument`
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let duration_ms = duration.as_millis() as u64;
        self.span.record("duration_ms", duration_ms);
        let _entered = self.span.enter();

        if duration > self.slow_threshold {
            warn!(
                trace_id = %self.trace_id,
                operation = %self.operation,
                duration_ms = duration_ms,
                slow = true,
                "slow operation detected"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                operation = %self.operation,
                duration_ms = duration_ms,
                "operation completed"
            );
        }
    }
}

/// Helper to create an operation span
#[inline]
pub fn span_operation(name: &str) -> OperationSpan {
    OperationSpan::new(name)
}

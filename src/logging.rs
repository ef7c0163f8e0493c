/// Structured logging for the monitoring service.
///
/// Console output goes through `tracing`; fields carry the server, page and
/// station so that log lines can be filtered per data source. Transport
/// failures are classified before logging so that an offline station does
/// not look like a broken deployment.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::FetchError;

// ---------------------------------------------------------------------------
// Initialisation
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given log level.
/// `RUST_LOG`, when set, takes precedence.
pub fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Server announced it is temporarily unavailable.
    Expected,
    /// Server answered with something we cannot use.
    Unexpected,
    /// Server unreachable or slow; may be offline, may be a network issue.
    Unknown,
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a failed request to a telemetry server.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::Http(503) => FailureType::Expected,
        FetchError::Http(_) | FetchError::Decode(_) => FailureType::Unexpected,
        FetchError::Timeout(_) | FetchError::Connect(_) | FetchError::Request(_) => {
            FailureType::Unknown
        }
    }
}

/// Log a failed request. The caller continues with an empty result.
pub fn log_fetch_failure(url: &str, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    match failure_type {
        FailureType::Expected => debug!(url, failure = %failure_type, error = %err, "fetch failed"),
        FailureType::Unexpected => error!(url, failure = %failure_type, error = %err, "fetch failed"),
        FailureType::Unknown => warn!(url, failure = %failure_type, error = %err, "fetch failed"),
    }
}

// ---------------------------------------------------------------------------
// Operation timing
// ---------------------------------------------------------------------------

/// Log the completion of a significant operation (term scan, catalog build,
/// reconciliation pass).
pub fn log_operation_end(operation: &str, start_time: Instant, items: usize) {
    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    info!(operation, duration_ms, items, "operation completed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            classify_fetch_failure(&FetchError::Timeout("1s".to_string())),
            FailureType::Unknown
        );
        assert_eq!(
            classify_fetch_failure(&FetchError::Connect("refused".to_string())),
            FailureType::Unknown
        );
        assert_eq!(classify_fetch_failure(&FetchError::Http(503)), FailureType::Expected);
        assert_eq!(classify_fetch_failure(&FetchError::Http(500)), FailureType::Unexpected);
        assert_eq!(
            classify_fetch_failure(&FetchError::Decode("expected value".to_string())),
            FailureType::Unexpected
        );
    }

    #[test]
    fn test_logging_without_subscriber_does_not_panic() {
        log_fetch_failure("http://127.0.0.1:9/get", &FetchError::Http(500));
        log_operation_end("test_operation", Instant::now(), 0);
    }
}

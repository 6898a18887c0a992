//! Run fault taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason a run ended in failure.
///
/// Recoverable faults (tool execution errors, malformed tool arguments) never
/// reach this enum; they are folded into message content and the run goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model stream itself failed.
    UpstreamFault,
    /// An event could not be attributed to any known sub-computation.
    CorrelationFault,
}

/// A fatal fault raised by the producer or the adapter.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// Model stream failure.
    #[error("model stream failed: {0}")]
    Upstream(String),

    /// Event attribution failure.
    #[error("event correlation failed: {0}")]
    Correlation(String),
}

impl GraphError {
    /// The failure kind reported to the client.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            GraphError::Upstream(_) => FailureKind::UpstreamFault,
            GraphError::Correlation(_) => FailureKind::CorrelationFault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_one_to_one() {
        assert_eq!(
            GraphError::Upstream("boom".into()).failure_kind(),
            FailureKind::UpstreamFault
        );
        assert_eq!(
            GraphError::Correlation("orphan".into()).failure_kind(),
            FailureKind::CorrelationFault
        );
    }

    #[test]
    fn kind_wire_encoding_is_snake_case() {
        let json = serde_json::to_value(FailureKind::UpstreamFault).unwrap();
        assert_eq!(json, "upstream_fault");
    }
}

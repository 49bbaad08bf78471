//! Error types for agent telemetry.

use fleetpanel_state::NodeId;
use thiserror::Error;

/// Why a telemetry fetch failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    /// Timeout, refused connection, TLS handshake failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx status or a body that is not the expected JSON.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The node cannot be contacted as configured (no token, bad address).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The per-node task died before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TelemetryError {
    /// Whether retrying without operator action can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TelemetryError::Configuration(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryError::Transport(_) => "transport",
            TelemetryError::Protocol(_) => "protocol",
            TelemetryError::Configuration(_) => "configuration",
            TelemetryError::Internal(_) => "internal",
        }
    }
}

/// A failed fetch, tagged with the node it was for.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("node {node_id}: {cause}")]
pub struct FetchFailure {
    pub node_id: NodeId,
    pub cause: TelemetryError,
}

impl FetchFailure {
    pub fn new(node_id: NodeId, cause: TelemetryError) -> Self {
        Self { node_id, cause }
    }
}

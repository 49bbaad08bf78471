//! Bearer credentials for node agents.

use fleetpanel_state::{DaemonToken, NodeRecord};

use crate::error::TelemetryError;

/// Supplies the bearer token used to call a node's agent.
pub trait CredentialProvider: Send + Sync + 'static {
    fn bearer_token(&self, node: &NodeRecord) -> Result<DaemonToken, TelemetryError>;
}

/// Reads the token stored on the node record itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCredentials;

impl CredentialProvider for RecordCredentials {
    fn bearer_token(&self, node: &NodeRecord) -> Result<DaemonToken, TelemetryError> {
        if node.daemon_token.is_empty() {
            return Err(TelemetryError::Configuration(format!(
                "node {} has no daemon token",
                node.id
            )));
        }
        Ok(node.daemon_token.clone())
    }
}

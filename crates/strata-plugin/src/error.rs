//! Plugin subsystem errors.

use strata_core::{ServiceKind, StrataError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ServiceKind, id: String },
    #[error("failed to construct {kind} {id}: {reason}")]
    Construction {
        kind: ServiceKind,
        id: String,
        reason: String,
    },
    #[error("invalid plugin: {0}")]
    Invalid(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PluginError> for StrataError {
    fn from(err: PluginError) -> Self {
        StrataError::Factory(err.to_string())
    }
}

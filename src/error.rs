//! Error types surfaced by the converter.

use thiserror::Error;

/// An inconsistency in the net under construction.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A node id that should have been registered earlier is absent.
    #[error("petri node `{0}` not found")]
    MissingNode(String),
}

/// Fatal conversion failures. Recoverable anomalies (dangling flows,
/// unresolved deferred links) are logged and skipped instead.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Complex gateways have no sound Petri-net reading.
    #[error("complex gateway `{id}` is not supported")]
    UnsupportedGateway { id: String },

    /// A sequence flow could not be converted.
    #[error("process `{process}`: failed to convert flow `{flow}`")]
    Flow {
        process: String,
        flow: String,
        #[source]
        source: ModelError,
    },

    /// A message flow could not be converted.
    #[error("failed to convert message flow `{flow}`")]
    MessageFlow {
        flow: String,
        #[source]
        source: ModelError,
    },
}

use thiserror::Error;

use crate::types::{EdgeId, NodeId, RunId};

#[derive(Debug, Error)]
pub enum FluxError {
    // Precondition violations: an identifier that does not belong to the loaded flow set
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Unknown edge: {0}")]
    UnknownEdge(EdgeId),

    #[error("Unknown flow run: {0}")]
    UnknownRun(RunId),

    // Flow set construction errors
    #[error("Inconsistent flow {flow}: {message}")]
    InconsistentFlow { flow: String, message: String },

    #[error("Duplicate flow name: {0}")]
    DuplicateFlow(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),
}

pub type Result<T> = std::result::Result<T, FluxError>;

use thiserror::Error;

/// Errors that can occur while building a diagram's block graph from JSON.
///
/// A build failure leaves any previously loaded diagram for the same tab
/// untouched and running.
#[derive(Error, Debug, Clone)]
pub enum BuildError {
    #[error("failed to parse diagram JSON: {0}")]
    JsonParse(String),

    #[error("diagram JSON has no 'target.blocks' object")]
    MissingTarget,

    #[error("block '{block_id}' is missing the mandatory '{key}' marker")]
    MissingBlockKey { block_id: String, key: String },
}

/// Errors that can occur while executing blocks.
///
/// None of these terminate the hosting process; each aborts only the
/// offending task or evaluation and is surfaced through the notification
/// sink, tagged with the block's extension and opcode.
#[derive(Error, Debug, Clone)]
pub enum RunError {
    #[error("no extension '<{0}>' registered")]
    UnknownExtension(String),

    #[error("no block '<{opcode}>' found in extension '<{extension_id}>'")]
    UnknownOpcode {
        extension_id: String,
        opcode: String,
    },

    #[error("block '{block_id}': unable to resolve input '{key}': {reason}")]
    UnresolvedInput {
        block_id: String,
        key: String,
        reason: String,
    },

    #[error("handler '{extension_id}_{opcode}' failed: {reason}")]
    HandlerFailure {
        extension_id: String,
        opcode: String,
        reason: String,
    },

    #[error("diagram was cancelled")]
    Cancelled,
}

impl RunError {
    pub fn unresolved(
        block_id: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        RunError::UnresolvedInput {
            block_id: block_id.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

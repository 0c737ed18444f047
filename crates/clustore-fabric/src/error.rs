use clustore_types::TypeError;

/// Errors produced by the invalidation fabric.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    /// A wire message could not be parsed.
    #[error("malformed invalidation message '{line}': {reason}")]
    Malformed { line: String, reason: String },

    /// The item or path inside a message is invalid.
    #[error(transparent)]
    Invalid(#[from] TypeError),

    /// Envelope JSON could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The bus has been shut down and accepts no more messages.
    #[error("invalidation bus is shut down")]
    Shutdown,
}

/// Convenience alias used throughout the fabric crate.
pub type FabricResult<T> = std::result::Result<T, FabricError>;

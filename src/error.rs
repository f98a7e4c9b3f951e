//! Error types for the war ledger
//!
//! Errors propagate as `anyhow::Error`; the variants below are the domain
//! failures callers are expected to match on (via `downcast_ref`).

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Domain errors raised by the ledger, roster and season operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Player not found: {name}")]
    PlayerNotFound { name: String },

    #[error("Season not found: {season}")]
    SeasonNotFound { season: u32 },

    #[error("War {war} not found in season {season}")]
    WarNotFound { season: u32, war: u32 },

    #[error("Node not found: {node}")]
    NodeNotFound { node: u8 },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid record '{key}': {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Sheet import failed: {reason}")]
    Import { reason: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl LedgerError {
    /// Whether the error means the addressed entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::PlayerNotFound { .. }
                | LedgerError::SeasonNotFound { .. }
                | LedgerError::WarNotFound { .. }
                | LedgerError::NodeNotFound { .. }
        )
    }
}

//! Error taxonomy for the synchronization engine.
//!
//! Connection-level failures are recoverable (the liveness check retries) and
//! are mostly absorbed into the `connected` observable. Auth and validation
//! failures are returned to the caller as explicit results. A `RemoteAck`
//! failure means the optimistic local mutation already happened and is kept.

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transport failed to establish or dropped mid-session.
    #[error("connection failed: {0}")]
    Connection(String),

    /// An outbound command was attempted without a live transport handle.
    #[error("not connected")]
    NotConnected,

    /// Login rejected, or the persisted identity blob is malformed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Input rejected before any mutation (e.g. progress out of range).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote confirmation for an optimistic command failed.
    /// Local state is NOT rolled back; it reconciles on the next full sync.
    #[error("remote ack failed: {0}")]
    RemoteAck(String),

    /// Reading or writing the persisted session blob failed (not a parse error).
    #[error("session storage failed: {0}")]
    Storage(String),

    /// Configuration could not be loaded or extracted.
    #[error("config error: {0}")]
    Config(#[from] figment::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

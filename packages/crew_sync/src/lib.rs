//! crew_sync — client-side real-time state synchronization for a shared
//! task board.
//!
//! One admin and many employees share live state (chat messages, task
//! assignments, per-user progress, presence, chat-viewing focus) over a
//! persistent bidirectional event channel. The engine keeps a locally
//! consistent, eventually-reconciled view across reconnects: idempotent
//! event application, a deterministic progress aggregator that matches the
//! server bit for bit, monotonic read receipts, and presence tracking used
//! to suppress notifications.
//!
//! The [`session::Session`] facade is the sole mutation point; collaborators
//! (transport, API client, notifier, session store) are injected traits so
//! hosts and tests can substitute their own.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod presence;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod store;
pub mod tasks;
pub mod transport;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use session::{ChangeEvent, Session, SessionCommand};

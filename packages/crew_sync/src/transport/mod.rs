//! Transport boundary: the seam between the session and the wire.
//!
//! `Transport` produces handles; a handle is one live connection. The traits
//! are object-safe so tests can substitute a channel-backed double for the
//! real websocket.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::UserId;
use crate::protocol::{ClientCommand, TransportEvent};

pub mod ws;

/// Everything the transport needs to establish a connection for a user.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    pub user_id: UserId,
    /// Opaque API token from login; forwarded for server-side auth.
    pub token: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection. Implementations own their retry policy; a
    /// returned error means the bounded attempts were exhausted.
    async fn connect(&self, ctx: &ConnectContext) -> Result<Box<dyn TransportHandle>>;
}

#[async_trait]
pub trait TransportHandle: Send {
    /// Queue an outbound command. Fails with `NotConnected` once the
    /// underlying connection is gone.
    async fn emit(&mut self, command: ClientCommand) -> Result<()>;

    /// Next inbound event, in delivery order. `None` means the handle is
    /// finished and will yield nothing more.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&mut self);
}

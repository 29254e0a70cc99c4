//! Connection lifecycle: at most one live transport handle per session.
//!
//! `connect` unconditionally closes any prior handle first, so the periodic
//! liveness check and an explicit reconnect may race without ever producing
//! two live handles. Disconnecting flips the observable but never touches the
//! data collections — session data survives transient drops.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::protocol::{ClientCommand, TransportEvent};
use crate::transport::{ConnectContext, Transport, TransportHandle};

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    handle: Option<Box<dyn TransportHandle>>,
    connected: watch::Sender<bool>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            transport,
            handle: None,
            connected,
        }
    }

    /// Connect, closing any existing handle first. On success announces the
    /// user as online to the remote party and flips the observable.
    pub async fn connect(&mut self, ctx: &ConnectContext) -> Result<()> {
        if let Some(mut old) = self.handle.take() {
            debug!("closing previous transport handle before reconnect");
            old.close().await;
            self.connected.send_replace(false);
        }

        let mut handle = self.transport.connect(ctx).await?;
        handle
            .emit(ClientCommand::UserOnline {
                user_id: ctx.user_id,
            })
            .await?;

        self.handle = Some(handle);
        self.connected.send_replace(true);
        info!(user = ctx.user_id, "connected and announced online");
        Ok(())
    }

    /// Close the handle if any and flip the observable. Data collections are
    /// left alone.
    pub async fn disconnect(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close().await;
        }
        self.connected.send_replace(false);
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Observable for the UI boundary.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub async fn emit(&mut self, command: ClientCommand) -> Result<()> {
        match &mut self.handle {
            Some(handle) => handle.emit(command).await,
            None => Err(SyncError::NotConnected),
        }
    }

    /// Next inbound event. Pends forever while no handle exists, which makes
    /// it safe to park inside a select loop. A `Disconnected` event (or the
    /// handle's stream ending) drops the handle and flips the observable.
    pub async fn next_event(&mut self) -> TransportEvent {
        let Some(handle) = self.handle.as_mut() else {
            return std::future::pending().await;
        };
        match handle.next_event().await {
            Some(event) => {
                if matches!(event, TransportEvent::Disconnected { .. }) {
                    self.handle = None;
                    self.connected.send_replace(false);
                }
                event
            }
            None => {
                self.handle = None;
                self.connected.send_replace(false);
                TransportEvent::Disconnected {
                    reason: "event channel closed".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        live: Arc<AtomicUsize>,
    }

    struct CountingHandle {
        live: Arc<AtomicUsize>,
        closed: bool,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn connect(&self, _ctx: &ConnectContext) -> Result<Box<dyn TransportHandle>> {
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingHandle {
                live: self.live.clone(),
                closed: false,
            }))
        }
    }

    #[async_trait]
    impl TransportHandle for CountingHandle {
        async fn emit(&mut self, _command: ClientCommand) -> Result<()> {
            Ok(())
        }

        async fn next_event(&mut self) -> Option<TransportEvent> {
            std::future::pending().await
        }

        async fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn ctx() -> ConnectContext {
        ConnectContext {
            user_id: 4,
            token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn connect_twice_never_leaves_two_live_handles() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut manager = ConnectionManager::new(Arc::new(CountingTransport { live: live.clone() }));

        manager.connect(&ctx()).await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(live.load(Ordering::SeqCst), 1);

        manager.connect(&ctx()).await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_flips_observable_and_is_idempotent() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut manager = ConnectionManager::new(Arc::new(CountingTransport { live: live.clone() }));
        let mut watch = manager.watch_connected();

        manager.connect(&ctx()).await.unwrap();
        assert!(*watch.borrow_and_update());

        manager.disconnect().await;
        assert!(!manager.is_connected());
        assert!(!*watch.borrow_and_update());
        assert_eq!(live.load(Ordering::SeqCst), 0);

        manager.disconnect().await;
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn emit_without_handle_is_not_connected() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut manager = ConnectionManager::new(Arc::new(CountingTransport { live }));
        let err = manager
            .emit(ClientCommand::UserOnline { user_id: 4 })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConnected));
    }
}

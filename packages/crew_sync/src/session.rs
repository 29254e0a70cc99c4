//! Session facade: the single mutation point for all shared state.
//!
//! The session composes the connection manager, presence tracker, message
//! ledger, and task board, and is mutated only by its own command methods and
//! its inbound dispatch — never directly by the UI or the transport. `run`
//! drives everything on one task: transport events, UI commands, and the
//! periodic liveness check are serialized through a single select loop, so
//! every handler runs to completion before the next event is processed.
//!
//! Outbound commands are two-phase: the local mutation is applied
//! synchronously, then the remote intent is emitted. A failed ack is reported
//! to the caller but never rolled back — local state stays at the user's last
//! known intent and reconciles on the next full sync.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::connection::ConnectionManager;
use crate::error::{Result, SyncError};
use crate::ledger::MessageLedger;
use crate::models::{
    Location, Message, MessageId, PresenceRecord, StoredIdentity, Task, TaskId, User, UserId,
};
use crate::notify::{Notifier, message_notification, task_notification};
use crate::presence::PresenceTracker;
use crate::progress::ProgressSummary;
use crate::protocol::{ClientCommand, ServerEvent, TransportEvent};
use crate::tasks::TaskBoard;
use crate::transport::{ConnectContext, Transport};

/// Which slice of session state changed; the UI re-reads the getters it
/// cares about. No implicit dependency tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    User,
    Connection,
    Messages,
    Tasks,
    Presence,
    Viewing,
    Locations,
}

/// Commands the UI boundary sends into the run loop.
#[derive(Debug)]
pub enum SessionCommand {
    MarkMessagesAsRead {
        sender_id: UserId,
        /// `None` means "all unread from this sender"; resolved to a concrete
        /// id set before anything goes on the wire.
        message_ids: Option<Vec<MessageId>>,
    },
    SetTaskProgress {
        task_id: TaskId,
        user_id: UserId,
        progress: u8,
    },
    SetViewingChat {
        partner_id: UserId,
        is_viewing: bool,
    },
    SendLocation {
        location: Location,
    },
    Logout,
}

#[derive(Debug, Clone, PartialEq)]
enum SessionState {
    Anonymous,
    Authenticated(User),
}

pub struct Session {
    config: SyncConfig,
    state: SessionState,
    connection: ConnectionManager,
    presence: PresenceTracker,
    ledger: MessageLedger,
    board: TaskBoard,
    /// Remote chat-viewing flags, keyed by user id. Not persisted.
    viewing: HashMap<UserId, bool>,
    locations: HashMap<UserId, Location>,
    /// Partner whose chat the local user currently has focused, if any.
    /// Gates new-message notifications.
    local_viewing: Option<UserId>,
    /// Guards the one-time connect on first identity adoption.
    initialized: bool,
    token: Option<String>,
    api: Arc<dyn ApiClient>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn crate::store::SessionStore>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Session {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        api: Arc<dyn ApiClient>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn crate::store::SessionStore>,
    ) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            config,
            state: SessionState::Anonymous,
            connection: ConnectionManager::new(transport),
            presence: PresenceTracker::new(),
            ledger: MessageLedger::new(),
            board: TaskBoard::new(),
            viewing: HashMap::new(),
            locations: HashMap::new(),
            local_viewing: None,
            initialized: false,
            token: None,
            api,
            notifier,
            store,
            changes,
        }
    }

    // ── identity lifecycle ─────────────────────────────────────────────

    /// Authenticate against the external API, persist the identity, and
    /// adopt it.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<User> {
        let (user, token) = self.api.login(email, password).await?;
        self.token = Some(token.clone());
        if let Err(e) = self.store.save(&StoredIdentity {
            user: user.clone(),
            token,
        }) {
            warn!(error = %e, "failed to persist identity; session continues in-memory");
        }
        self.set_user(user.clone()).await;
        Ok(user)
    }

    /// Adopt an identity. Re-entering with the same id is a no-op (so a
    /// redundant call can't reset the socket). A different id taking over
    /// first tears everything down — no data may leak between identities
    /// sharing a client.
    pub async fn set_user(&mut self, new_user: User) {
        if let SessionState::Authenticated(current) = &self.state {
            if current.id == new_user.id {
                debug!(user = new_user.id, "set_user with same id is a no-op");
                return;
            }
            info!(
                from = current.id,
                to = new_user.id,
                "different user taking over; tearing down session state"
            );
            self.teardown().await;
        }

        self.state = SessionState::Authenticated(new_user);
        self.changed(ChangeEvent::User);

        if !self.initialized {
            self.initialized = true;
            if let Err(e) = self.connect().await {
                warn!(error = %e, "initial connect failed; liveness check will retry");
            }
        }
    }

    /// Restore a persisted identity if one exists. A malformed blob forces a
    /// logout. Returns whether an active identity was restored.
    pub async fn check_auth(&mut self) -> bool {
        match self.store.load() {
            Ok(Some(identity)) => {
                self.token = Some(identity.token.clone());
                self.set_user(identity.user).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "persisted identity unusable; forcing logout");
                self.logout().await;
                false
            }
        }
    }

    /// Disconnect, clear everything, forget the persisted identity.
    /// Idempotent.
    pub async fn logout(&mut self) {
        self.teardown().await;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear persisted identity");
        }
        self.token = None;
        self.state = SessionState::Anonymous;
        self.changed(ChangeEvent::User);
    }

    async fn teardown(&mut self) {
        self.connection.disconnect().await;
        self.ledger.clear();
        self.board.clear();
        self.presence.clear();
        self.viewing.clear();
        self.locations.clear();
        self.local_viewing = None;
        self.initialized = false;
        self.changed(ChangeEvent::Connection);
        self.changed(ChangeEvent::Messages);
        self.changed(ChangeEvent::Tasks);
        self.changed(ChangeEvent::Presence);
    }

    // ── connection ─────────────────────────────────────────────────────

    /// (Re)connect the transport for the current user. Safe to call while
    /// already connected: the previous handle is closed first.
    pub async fn connect(&mut self) -> Result<()> {
        let user_id = self.require_user_id()?;
        let ctx = ConnectContext {
            user_id,
            token: self.token.clone().unwrap_or_default(),
        };
        self.connection.connect(&ctx).await?;

        // Reflect our own announcement locally so derived presence views
        // agree before the next roster push arrives.
        self.presence
            .apply_merge(HashMap::from([(user_id, PresenceRecord::online(Utc::now()))]));
        self.changed(ChangeEvent::Connection);
        self.changed(ChangeEvent::Presence);
        Ok(())
    }

    /// Recovery path for silent failures the transport's own retry missed:
    /// reconnect whenever we are authenticated but the observable says
    /// disconnected. Connection errors are absorbed here, never propagated.
    pub async fn liveness_tick(&mut self) {
        if self.is_authenticated() && !self.connection.is_connected() {
            debug!("liveness check found a dead connection; reconnecting");
            if let Err(e) = self.connect().await {
                warn!(error = %e, "liveness reconnect failed; will retry");
            }
        }
    }

    // ── inbound dispatch ───────────────────────────────────────────────

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Push(event) => self.dispatch(event),
            TransportEvent::Disconnected { reason } => {
                info!(%reason, "transport disconnected; data retained");
                self.changed(ChangeEvent::Connection);
            }
            TransportEvent::ConnectError { message } => {
                warn!(%message, "transport connect error");
                self.changed(ChangeEvent::Connection);
            }
        }
    }

    fn dispatch(&mut self, event: ServerEvent) {
        let me = match &self.state {
            SessionState::Authenticated(user) => user.clone(),
            SessionState::Anonymous => {
                debug!("dropping event received while anonymous");
                return;
            }
        };

        match event {
            ServerEvent::NewMessage(message) => self.on_new_message(message, &me),
            ServerEvent::UserStatusUpdate { online_users } => {
                self.presence.apply_snapshot(online_users);
                self.changed(ChangeEvent::Presence);
            }
            ServerEvent::MessagesRead {
                reader_id,
                message_ids,
            } => {
                let flipped =
                    self.ledger
                        .apply_read_receipt(reader_id, &message_ids, me.id, Utc::now());
                if flipped > 0 {
                    self.changed(ChangeEvent::Messages);
                }
            }
            ServerEvent::ChatViewingStatus {
                user_id,
                partner_id,
                is_viewing,
            } => {
                debug!(user_id, partner_id, is_viewing, "chat viewing status");
                self.viewing.insert(user_id, is_viewing);
                self.changed(ChangeEvent::Viewing);
            }
            ServerEvent::TaskCreated(task) => {
                let title = task.title.clone();
                let assigner = task.assigned_by.clone();
                if self.board.insert_created(task, &me) {
                    self.changed(ChangeEvent::Tasks);
                    // Employees get a ping for each task landing on their
                    // board; the admin assigned it and needs no echo.
                    if !me.is_admin() {
                        let assigner = assigner.unwrap_or_else(|| "admin".to_string());
                        let (title, body) = task_notification(&title, &assigner);
                        self.notifier.notify(&title, &body, "/tasks");
                    }
                }
            }
            ServerEvent::TaskUpdated(task) => {
                if self.board.apply_updated(task, &me) {
                    self.changed(ChangeEvent::Tasks);
                }
            }
            ServerEvent::TaskProgress {
                task_id,
                user_id,
                progress,
            } => match self.board.set_progress(task_id, user_id, progress) {
                Ok(_) => self.changed(ChangeEvent::Tasks),
                Err(e) => debug!(task_id, error = %e, "dropping progress push"),
            },
            ServerEvent::LocationUpdate { user_id, location } => {
                self.locations.insert(user_id, location);
                self.changed(ChangeEvent::Locations);
            }
            ServerEvent::Unknown => debug!("ignoring unknown event kind"),
        }
    }

    fn on_new_message(&mut self, message: Message, me: &User) {
        let addressed_to_me = message.receiver_id == me.id;
        let sender_id = message.sender_id;
        let notify = addressed_to_me && !message.read && self.local_viewing != Some(sender_id);
        let sender = message
            .sender_name
            .clone()
            .unwrap_or_else(|| format!("user {sender_id}"));
        let content = message.content.clone();

        if !self.ledger.append(message) {
            return;
        }
        self.changed(ChangeEvent::Messages);

        if notify {
            let (title, body) = message_notification(&sender, &content);
            self.notifier
                .notify(&title, &body, &format!("/chat/{sender_id}"));
        }
    }

    /// Apply a full message-history fetch. Locally read messages stay read.
    pub fn apply_message_history(&mut self, messages: Vec<Message>) {
        self.ledger.replace_all(messages);
        self.changed(ChangeEvent::Messages);
    }

    /// Apply a full task fetch: relevance-filtered, derived fields recomputed.
    pub fn apply_task_snapshot(&mut self, tasks: Vec<Task>) {
        let me = match &self.state {
            SessionState::Authenticated(user) => user.clone(),
            SessionState::Anonymous => return,
        };
        self.board.clear();
        for task in tasks {
            self.board.insert_created(task, &me);
        }
        self.changed(ChangeEvent::Tasks);
    }

    // ── outbound commands (optimistic, two-phase) ──────────────────────

    /// Mark messages from `sender_id` as read: local mutation first, then the
    /// intent goes to the server with a concrete id set. Returns how many
    /// messages were flipped locally; an emit failure is reported but the
    /// local reads stand.
    pub async fn mark_messages_as_read(
        &mut self,
        sender_id: UserId,
        message_ids: Option<Vec<MessageId>>,
    ) -> Result<usize> {
        let me = self.require_user_id()?;
        let ids = match message_ids {
            Some(ids) => ids,
            None => self.ledger.resolve_unread_ids(sender_id, me),
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let id_set: HashSet<MessageId> = ids.iter().cloned().collect();
        let flipped = self.ledger.mark_read(&id_set, sender_id, me, Utc::now());
        if !flipped.is_empty() {
            self.changed(ChangeEvent::Messages);
        }

        self.connection
            .emit(ClientCommand::MarkMessagesAsRead {
                user_id: me,
                sender_id,
                message_ids: ids,
            })
            .await
            .map_err(|e| SyncError::RemoteAck(e.to_string()))?;
        Ok(flipped.len())
    }

    /// Record one assignee's progress: validate, mutate, recompute, then
    /// emit the socket intent and confirm over the API. Neither remote
    /// failure rolls the local mutation back.
    pub async fn set_task_progress(
        &mut self,
        task_id: TaskId,
        user_id: UserId,
        progress: u8,
    ) -> Result<ProgressSummary> {
        self.require_user_id()?;
        let summary = self.board.set_progress(task_id, user_id, progress)?;
        self.changed(ChangeEvent::Tasks);

        if let Err(e) = self
            .connection
            .emit(ClientCommand::TaskProgress {
                task_id,
                progress,
                user_id,
            })
            .await
        {
            warn!(task_id, error = %e, "progress emit failed; keeping optimistic state");
            return Err(SyncError::RemoteAck(e.to_string()));
        }
        if let Err(e) = self.api.update_task_progress(task_id, user_id, progress).await {
            warn!(task_id, error = %e, "progress ack failed; keeping optimistic state");
            return Err(e);
        }
        Ok(summary)
    }

    /// Record which chat the local user has focused and tell the server, so
    /// the remote party can time read receipts and suppress its own pings.
    pub async fn set_viewing_chat(&mut self, partner_id: UserId, is_viewing: bool) -> Result<()> {
        let me = self.require_user_id()?;
        self.local_viewing = if is_viewing { Some(partner_id) } else { None };
        self.viewing.insert(me, is_viewing);
        self.changed(ChangeEvent::Viewing);

        self.connection
            .emit(ClientCommand::UserViewingChat {
                user_id: me,
                partner_id,
                is_viewing,
            })
            .await
            .map_err(|e| SyncError::RemoteAck(e.to_string()))
    }

    /// Share the local user's location.
    pub async fn send_location(&mut self, location: Location) -> Result<()> {
        let me = self.require_user_id()?;
        self.locations.insert(me, location.clone());
        self.changed(ChangeEvent::Locations);

        self.connection
            .emit(ClientCommand::UserLocation {
                user_id: me,
                location,
            })
            .await
            .map_err(|e| SyncError::RemoteAck(e.to_string()))
    }

    // ── getters for the UI boundary ────────────────────────────────────

    pub fn current_user(&self) -> Option<&User> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            SessionState::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    pub fn is_admin(&self) -> bool {
        self.current_user().is_some_and(User::is_admin)
    }

    pub fn ledger(&self) -> &MessageLedger {
        &self.ledger
    }

    pub fn tasks(&self) -> &TaskBoard {
        &self.board
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn is_viewing_chat(&self, user_id: UserId) -> bool {
        self.viewing.get(&user_id).copied().unwrap_or(false)
    }

    pub fn location(&self, user_id: UserId) -> Option<&Location> {
        self.locations.get(&user_id)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connection.watch_connected()
    }

    /// Explicit notify mechanism for the UI: a change event names the slice
    /// that changed, the UI re-reads via the getters.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn changed(&self, event: ChangeEvent) {
        // No receivers is fine; headless operation is supported.
        let _ = self.changes.send(event);
    }

    fn require_user_id(&self) -> Result<UserId> {
        match &self.state {
            SessionState::Authenticated(user) => Ok(user.id),
            SessionState::Anonymous => Err(SyncError::Auth("not authenticated".to_string())),
        }
    }

    // ── event loop ─────────────────────────────────────────────────────

    /// Drive the session until shutdown: transport events, UI commands, and
    /// the liveness timer, all serialized on this task. Handlers run to
    /// completion before the next input is taken.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        shutdown: CancellationToken,
    ) {
        enum Input {
            Shutdown,
            Tick,
            Event(TransportEvent),
            Command(Option<SessionCommand>),
        }

        let mut liveness = tokio::time::interval(self.config.liveness.interval());
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let input = tokio::select! {
                _ = shutdown.cancelled() => Input::Shutdown,
                _ = liveness.tick() => Input::Tick,
                event = self.connection.next_event() => Input::Event(event),
                command = commands.recv() => Input::Command(command),
            };

            match input {
                Input::Shutdown => break,
                Input::Tick => self.liveness_tick().await,
                Input::Event(event) => self.handle_transport_event(event).await,
                Input::Command(Some(command)) => self.handle_command(command).await,
                Input::Command(None) => break,
            }
        }

        self.connection.disconnect().await;
        debug!("session loop finished");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        let result = match command {
            SessionCommand::MarkMessagesAsRead {
                sender_id,
                message_ids,
            } => self
                .mark_messages_as_read(sender_id, message_ids)
                .await
                .map(drop),
            SessionCommand::SetTaskProgress {
                task_id,
                user_id,
                progress,
            } => self
                .set_task_progress(task_id, user_id, progress)
                .await
                .map(drop),
            SessionCommand::SetViewingChat {
                partner_id,
                is_viewing,
            } => self.set_viewing_chat(partner_id, is_viewing).await,
            SessionCommand::SendLocation { location } => self.send_location(location).await,
            SessionCommand::Logout => {
                self.logout().await;
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "session command failed");
        }
    }
}

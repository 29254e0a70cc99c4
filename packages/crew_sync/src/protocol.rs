//! Wire protocol for the bidirectional event channel.
//!
//! Both directions are internally tagged JSON objects (`"type"` field,
//! camelCase names). Unknown inbound event kinds deserialize to
//! `ServerEvent::Unknown` and are ignored by the dispatcher rather than
//! treated as errors — the server may grow new event kinds before clients do.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{
    Location, Message, MessageId, PresenceRecord, Task, TaskId, UserId, deserialize_user_keyed_map,
};

/// Commands emitted by this client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Announce the local user as online; sent after every successful connect.
    UserOnline { user_id: UserId },
    /// Mark messages from `sender_id` as read. The id set is always concrete:
    /// "all unread" is resolved locally before emission so both sides agree
    /// on exactly which ids were marked.
    MarkMessagesAsRead {
        user_id: UserId,
        sender_id: UserId,
        message_ids: Vec<MessageId>,
    },
    UserViewingChat {
        user_id: UserId,
        partner_id: UserId,
        is_viewing: bool,
    },
    UserLocation { user_id: UserId, location: Location },
    TaskProgress {
        task_id: TaskId,
        progress: u8,
        user_id: UserId,
    },
}

/// Pushes delivered by the server to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    NewMessage(Message),
    /// Full presence roster; replaces local presence state wholesale.
    UserStatusUpdate {
        #[serde(deserialize_with = "deserialize_user_keyed_map")]
        online_users: HashMap<UserId, PresenceRecord>,
    },
    /// Read receipt: `reader_id` has read `message_ids`.
    MessagesRead {
        reader_id: UserId,
        message_ids: Vec<MessageId>,
    },
    ChatViewingStatus {
        user_id: UserId,
        partner_id: UserId,
        is_viewing: bool,
    },
    TaskCreated(Task),
    TaskUpdated(Task),
    TaskProgress {
        task_id: TaskId,
        user_id: UserId,
        progress: u8,
    },
    LocationUpdate { user_id: UserId, location: Location },
    /// Any event kind this client does not know about.
    #[serde(other)]
    Unknown,
}

/// What a transport handle yields to the session loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound server push, delivered in FIFO order.
    Push(ServerEvent),
    /// The connection dropped. Data collections are untouched; the liveness
    /// check reconnects.
    Disconnected { reason: String },
    /// The transport reported an error while (re)establishing.
    ConnectError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_command_wire_names_are_camel_case() {
        let json = serde_json::to_value(ClientCommand::UserOnline { user_id: 3 }).unwrap();
        assert_eq!(json["type"], "userOnline");
        assert_eq!(json["userId"], 3);

        let json = serde_json::to_value(ClientCommand::MarkMessagesAsRead {
            user_id: 2,
            sender_id: 1,
            message_ids: vec![MessageId::Int(10), MessageId::from("tmp-1")],
        })
        .unwrap();
        assert_eq!(json["type"], "markMessagesAsRead");
        assert_eq!(json["senderId"], 1);
        assert_eq!(json["messageIds"][0], 10);
        assert_eq!(json["messageIds"][1], "tmp-1");
    }

    #[test]
    fn server_event_round_trips_task_created() {
        let raw = r#"{"type":"taskCreated","id":5,"title":"Restock","assignedTo":[7],"individualProgress":{}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::TaskCreated(task) => {
                assert_eq!(task.id, 5);
                assert_eq!(task.assigned_to, vec![7]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn task_created_parses_string_progress_keys() {
        // Progress maps come over the wire with string keys; the tagged enum
        // must still land them on integer user ids.
        let raw = r#"{"type":"taskCreated","id":5,"title":"Restock","assignedTo":[7,8],"individualProgress":{"7":60,"8":100}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::TaskCreated(task) => {
                assert_eq!(task.user_progress(7), 60);
                assert_eq!(task.user_progress(8), 100);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_kind_is_tolerated() {
        let raw = r#"{"type":"serverMaintenance","startsAt":"soon"}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn user_status_update_parses_roster() {
        let raw = r#"{"type":"userStatusUpdate","onlineUsers":{"1":{"status":"online","lastSeen":"2026-03-10T12:00:00Z"},"4":{"status":"offline"}}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::UserStatusUpdate { online_users } => {
                assert!(online_users[&1].is_online());
                assert!(!online_users[&4].is_online());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn viewing_status_round_trip() {
        let raw = r#"{"type":"chatViewingStatus","userId":4,"partnerId":1,"isViewing":true}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event,
            ServerEvent::ChatViewingStatus {
                user_id: 4,
                partner_id: 1,
                is_viewing: true
            }
        );
    }
}

//! Core data model shared by the wire protocol and the session state.
//!
//! Wire shapes use camelCase field names. `Task::assigned_to` is normalized
//! on deserialization: the server may send a single id, a stringified id, or
//! a list mixing both; internally it is always an ordered `Vec<UserId>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type UserId = i64;
pub type TaskId = i64;

/// Role of a user. Exactly one admin exists per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Message ids are integers from the database, but optimistic local sends use
/// string ids until the server assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Int(i64),
    Str(String),
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        MessageId::Int(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId::Str(id.to_string())
    }
}

/// A chat message. `read` is monotonic: once true, nothing sets it false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// A task on the shared board. `progress` and `status` are derived outputs;
/// only the aggregator writes them (see `progress::recompute_into`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_assigned_to")]
    pub assigned_to: Vec<UserId>,
    /// Display name of whoever assigned the task, if the server sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    #[serde(default, deserialize_with = "deserialize_user_keyed_map")]
    pub individual_progress: BTreeMap<UserId, u8>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Recorded progress for one assignee; missing entries read as 0.
    pub fn user_progress(&self, user_id: UserId) -> u8 {
        self.individual_progress.get(&user_id).copied().unwrap_or(0)
    }

    /// A task is overdue when its due date has passed (by calendar day) and
    /// it is not completed. Tasks without a due date are never overdue.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) => due.date_naive() < now.date_naive() && self.status != TaskStatus::Completed,
            None => false,
        }
    }
}

/// Accepts `3`, `"3"`, `[3, "4"]`, or null for `assignedTo`.
fn deserialize_assigned_to<'de, D>(deserializer: D) -> Result<Vec<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdLike {
        Int(i64),
        Str(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(IdLike),
        Many(Vec<IdLike>),
    }

    fn resolve<E: serde::de::Error>(id: IdLike) -> Result<UserId, E> {
        match id {
            IdLike::Int(n) => Ok(n),
            IdLike::Str(s) => s
                .parse::<i64>()
                .map_err(|_| E::custom(format!("malformed user id in assignment: {s:?}"))),
        }
    }

    match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(OneOrMany::One(id)) => Ok(vec![resolve(id)?]),
        Some(OneOrMany::Many(ids)) => ids.into_iter().map(resolve).collect(),
    }
}

/// Maps keyed by user id arrive with JSON string keys (`"1": …`). Internally
/// tagged enums buffer their payload through serde's content machinery, which
/// skips serde_json's numeric map-key coercion, so the keys are parsed here
/// instead of relying on the format.
pub(crate) fn deserialize_user_keyed_map<'de, D, V, M>(deserializer: D) -> Result<M, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
    M: FromIterator<(UserId, V)>,
{
    use serde::de::Error;

    let raw = Option::<HashMap<String, V>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(key, value)| {
            key.parse::<UserId>()
                .map(|id| (id, value))
                .map_err(|_| D::Error::custom(format!("malformed user id key: {key:?}")))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    #[default]
    Offline,
}

/// Presence state for one user. Keyed by user id in the tracker, so the id
/// itself is not repeated here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    #[serde(default)]
    pub status: PresenceStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl PresenceRecord {
    pub fn online(now: DateTime<Utc>) -> Self {
        PresenceRecord {
            status: PresenceStatus::Online,
            last_seen: Some(now),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }
}

/// A reported geolocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// The persisted identity blob: who was logged in, plus the opaque API token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub user: User,
    pub token: String,
}

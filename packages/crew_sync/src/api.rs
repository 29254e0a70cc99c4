//! External API collaborator: login and the progress-ack round trip.
//!
//! Failures surface as explicit errors. A failed progress ack is a
//! `RemoteAck` error — the caller keeps its optimistic local state.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::{Task, TaskId, User, UserId};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait ApiClient: Send + Sync {
    /// `POST /auth/login`. Returns the authenticated user and opaque token.
    async fn login(&self, email: &str, password: &str) -> Result<(User, String)>;

    /// `PUT /tasks/{task_id}/progress/{user_id}`. Returns the server's view
    /// of the task as an ack.
    async fn update_task_progress(
        &self,
        task_id: TaskId,
        user_id: UserId,
        progress: u8,
    ) -> Result<Task>;
}

pub struct HttpApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            base_url: config.server.api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| SyncError::Auth(e.to_string()))?;

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("malformed login response: {e}")))?;

        if !body.success {
            return Err(SyncError::Auth(
                body.message.unwrap_or_else(|| "login rejected".to_string()),
            ));
        }
        match (body.user, body.token) {
            (Some(user), Some(token)) => Ok((user, token)),
            _ => Err(SyncError::Auth(
                "login response missing user or token".to_string(),
            )),
        }
    }

    async fn update_task_progress(
        &self,
        task_id: TaskId,
        user_id: UserId,
        progress: u8,
    ) -> Result<Task> {
        let response = self
            .client
            .put(format!(
                "{}/tasks/{}/progress/{}",
                self.base_url, task_id, user_id
            ))
            .json(&serde_json::json!({ "progress": progress }))
            .send()
            .await
            .map_err(|e| SyncError::RemoteAck(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::RemoteAck(format!(
                "progress update returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::RemoteAck(format!("malformed progress ack: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_tolerates_missing_fields() {
        let body: LoginResponse =
            serde_json::from_str(r#"{"success":false,"message":"bad password"}"#).unwrap();
        assert!(!body.success);
        assert!(body.user.is_none());
        assert_eq!(body.message.as_deref(), Some("bad password"));
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let mut config = SyncConfig::default();
        config.server.api_base = "http://localhost:3000/api/".to_string();
        let client = HttpApiClient::new(&config);
        assert_eq!(client.base_url, "http://localhost:3000/api");
    }
}

//! Notification collaborator boundary.
//!
//! The engine only decides WHEN to notify (suppression by chat-viewing focus
//! lives in the session); the host environment decides HOW. The collaborator
//! consumes `(title, body, target_url)` and emits nothing back.

/// Notification sink. Implemented by the host UI; `NoopNotifier` for
/// headless use and tests.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str, target_url: &str);
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _title: &str, _body: &str, _target_url: &str) {}
}

/// Bodies longer than this are truncated with an ellipsis.
const MAX_BODY_CHARS: usize = 100;

/// Title and body for a task-assignment notification.
pub fn task_notification(task_title: &str, assigned_by: &str) -> (String, String) {
    let title = "New task assigned".to_string();
    let body = format!("\"{task_title}\" - assigned by {assigned_by}");
    (title, body)
}

/// Title and body for a new-message notification.
pub fn message_notification(sender: &str, content: &str) -> (String, String) {
    let title = format!("New message from {sender}");
    let body = if content.chars().count() > MAX_BODY_CHARS {
        let truncated: String = content.chars().take(MAX_BODY_CHARS).collect();
        format!("{truncated}...")
    } else {
        content.to_string()
    };
    (title, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_passes_through() {
        let (title, body) = message_notification("Ana", "lunch?");
        assert_eq!(title, "New message from Ana");
        assert_eq!(body, "lunch?");
    }

    #[test]
    fn task_body_names_title_and_assigner() {
        let (title, body) = task_notification("Restock shelves", "Admin");
        assert_eq!(title, "New task assigned");
        assert_eq!(body, "\"Restock shelves\" - assigned by Admin");
    }

    #[test]
    fn long_body_is_truncated_at_char_boundary() {
        let content = "á".repeat(150);
        let (_, body) = message_notification("Ana", &content);
        assert_eq!(body.chars().count(), MAX_BODY_CHARS + 3);
        assert!(body.ends_with("..."));
    }
}

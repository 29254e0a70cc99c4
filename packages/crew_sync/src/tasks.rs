//! Task board: relevance-filtered task collection with derived progress.
//!
//! All progress writes route through the aggregator so `progress`/`status`
//! never drift from what `individual_progress` implies. The relevance filter
//! is applied at the insertion boundary: the admin sees every task, an
//! employee only tasks whose assignment list contains them.

use tracing::debug;

use crate::error::{Result, SyncError};
use crate::models::{Task, TaskId, User, UserId};
use crate::progress::{MAX_PROGRESS, ProgressSummary, recompute_into};

/// Whether an inbound task event is retained by this viewer.
pub fn is_relevant(task: &Task, viewer: &User) -> bool {
    viewer.is_admin() || task.assigned_to.contains(&viewer.id)
}

#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: Vec<Task>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a `taskCreated` push. Irrelevant tasks are silently dropped and
    /// duplicate ids are ignored rather than overwriting. Returns whether the
    /// board changed.
    pub fn insert_created(&mut self, mut task: Task, viewer: &User) -> bool {
        if !is_relevant(&task, viewer) {
            debug!(task = task.id, viewer = viewer.id, "dropping irrelevant task");
            return false;
        }
        if self.tasks.iter().any(|t| t.id == task.id) {
            debug!(task = task.id, "duplicate taskCreated ignored");
            return false;
        }
        recompute_into(&mut task);
        self.tasks.push(task);
        true
    }

    /// Handle a `taskUpdated` push. Replaces any existing copy; a task
    /// reassigned away from this viewer is removed instead of kept stale.
    /// Returns whether the board changed.
    pub fn apply_updated(&mut self, mut task: Task, viewer: &User) -> bool {
        if !is_relevant(&task, viewer) {
            let before = self.tasks.len();
            self.tasks.retain(|t| t.id != task.id);
            return self.tasks.len() != before;
        }
        recompute_into(&mut task);
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
        true
    }

    /// Record one assignee's progress and recompute the derived fields.
    /// The value is validated before any mutation; a rejected write leaves
    /// the task untouched.
    pub fn set_progress(
        &mut self,
        task_id: TaskId,
        user_id: UserId,
        value: u8,
    ) -> Result<ProgressSummary> {
        if value > MAX_PROGRESS {
            return Err(SyncError::Validation(format!(
                "progress {value} out of range 0..=100"
            )));
        }
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| SyncError::Validation(format!("unknown task {task_id}")))?;
        task.individual_progress.insert(user_id, value);
        Ok(recompute_into(task))
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

//! Task progress aggregation.
//!
//! This function runs independently on every replica (this client, other
//! clients, the server) from the same inputs and must converge bit-identically,
//! so it uses only integer arithmetic. Both the numerator and the denominator
//! range over the full assignment list: a 3-person task where one person
//! reported 100 averages to 33, not 100.

use crate::models::{Task, TaskStatus};

pub const MAX_PROGRESS: u8 = 100;

/// Output of one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub progress: u8,
    pub status: TaskStatus,
    pub all_completed: bool,
    pub completed_count: usize,
    pub total_assigned: usize,
}

impl Default for ProgressSummary {
    fn default() -> Self {
        ProgressSummary {
            progress: 0,
            status: TaskStatus::Pending,
            all_completed: false,
            completed_count: 0,
            total_assigned: 0,
        }
    }
}

/// Pure aggregation over a task's assignment list and per-user progress map.
/// Missing map entries read as 0; duplicate assignees are tolerated.
pub fn recompute(task: &Task) -> ProgressSummary {
    let total_assigned = task.assigned_to.len();
    if total_assigned == 0 {
        return ProgressSummary::default();
    }

    let mut total_progress: u64 = 0;
    let mut completed_count = 0usize;
    let mut any_progress = false;

    // Raw map values, never clamped: the server averages whatever was
    // stored, and every derived field here must read the same value or the
    // counters drift apart on out-of-range input.
    for user_id in &task.assigned_to {
        let p = task.user_progress(*user_id);
        total_progress += u64::from(p);
        if p == MAX_PROGRESS {
            completed_count += 1;
        }
        if p > 0 {
            any_progress = true;
        }
    }

    // Round half up; equal to the server's Math.round(sum / n) since both
    // operands are non-negative. Ties only occur with even denominators.
    let n = total_assigned as u64;
    let average = ((total_progress + n / 2) / n) as u8;

    // Exact equality with 100, not >=, and every assignee must have reported.
    let all_completed = task
        .assigned_to
        .iter()
        .all(|id| task.individual_progress.get(id).copied() == Some(MAX_PROGRESS));

    let status = if all_completed {
        TaskStatus::Completed
    } else if average > 0 || any_progress {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    };

    ProgressSummary {
        // Guard against rounding producing 99 when everyone is in fact at 100.
        progress: if all_completed { MAX_PROGRESS } else { average },
        status,
        all_completed,
        completed_count,
        total_assigned,
    }
}

/// Recompute and write the derived fields back onto the task, so `progress`
/// and `status` never drift from what the current map implies.
pub fn recompute_into(task: &mut Task) -> ProgressSummary {
    let summary = recompute(task);
    task.progress = summary.progress;
    task.status = summary.status;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn task(assigned: &[i64], progress: &[(i64, u8)]) -> Task {
        let mut task: Task = serde_json::from_str(r#"{"id":1,"title":"t"}"#).unwrap();
        task.assigned_to = assigned.to_vec();
        task.individual_progress = progress.iter().copied().collect();
        task
    }

    #[test]
    fn divides_by_full_assignment_list() {
        let summary = recompute(&task(&[1, 2, 3], &[(1, 100)]));
        assert_eq!(summary.progress, 33);
        assert_eq!(summary.status, TaskStatus::InProgress);
        assert!(!summary.all_completed);
        assert_eq!(summary.completed_count, 1);
        assert_eq!(summary.total_assigned, 3);
    }

    #[test]
    fn all_completed() {
        let summary = recompute(&task(&[1, 2], &[(1, 100), (2, 100)]));
        assert_eq!(summary.progress, 100);
        assert_eq!(summary.status, TaskStatus::Completed);
        assert!(summary.all_completed);
        assert_eq!(summary.completed_count, 2);
    }

    #[test]
    fn no_assignees_is_pending_zero() {
        let summary = recompute(&task(&[], &[(1, 100)]));
        assert_eq!(summary, ProgressSummary::default());
    }

    #[test]
    fn missing_entries_read_as_zero() {
        let summary = recompute(&task(&[1, 2], &[]));
        assert_eq!(summary.progress, 0);
        assert_eq!(summary.status, TaskStatus::Pending);
    }

    #[test]
    fn any_recorded_progress_means_in_progress() {
        // Average rounds to 0 but one assignee has a nonzero entry.
        let summary = recompute(&task(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], &[(1, 4)]));
        assert_eq!(summary.progress, 0);
        assert_eq!(summary.status, TaskStatus::InProgress);
    }

    #[test]
    fn rounds_half_up_like_the_server() {
        // 25 / 2 = 12.5 -> 13 under Math.round
        let summary = recompute(&task(&[1, 2], &[(1, 25)]));
        assert_eq!(summary.progress, 13);
        // 100 / 3 = 33.33 -> 33
        let summary = recompute(&task(&[1, 2, 3], &[(2, 100)]));
        assert_eq!(summary.progress, 33);
    }

    #[test]
    fn ninety_nine_stays_in_progress() {
        let summary = recompute(&task(&[1, 2], &[(1, 100), (2, 98)]));
        assert_eq!(summary.progress, 99);
        assert_eq!(summary.status, TaskStatus::InProgress);
        assert!(!summary.all_completed);
    }

    #[test]
    fn out_of_range_wire_values_average_unclamped() {
        // A stored 150 averages as-is, counts as neither completed nor a
        // completion for `all_completed` — the counters always agree.
        let summary = recompute(&task(&[1, 2], &[(1, 150)]));
        assert_eq!(summary.progress, 75);
        assert_eq!(summary.completed_count, 0);
        assert!(!summary.all_completed);
        assert_eq!(summary.status, TaskStatus::InProgress);
    }

    #[test]
    fn duplicate_assignees_are_tolerated() {
        let summary = recompute(&task(&[1, 1, 2], &[(1, 100), (2, 100)]));
        assert!(summary.all_completed);
        assert_eq!(summary.progress, 100);
        assert_eq!(summary.total_assigned, 3);
    }

    #[test]
    fn recompute_into_writes_derived_fields() {
        let mut t = task(&[1, 2], &[(1, 40), (2, 60)]);
        t.progress = 7; // stale derived value
        t.status = TaskStatus::Completed;
        let summary = recompute_into(&mut t);
        assert_eq!(t.progress, 50);
        assert_eq!(t.status, TaskStatus::InProgress);
        assert_eq!(summary.progress, 50);
    }
}

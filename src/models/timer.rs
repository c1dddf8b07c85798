use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::task::Task;

/// Timer state of one task, stored next to the task under `timer:<id>`.
///
/// Always derived from the task record at the moment of a transition; the
/// task stays the source of truth.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub task_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,
    /// Elapsed minutes as of the last transition
    #[serde(default)]
    pub elapsed_time: f64,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time: Option<f64>,
}

impl Timer {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            start_time: task.start_time.filter(|_| task.is_running),
            elapsed_time: task.elapsed_time,
            is_running: task.is_running,
            target_time: task.target_time,
        }
    }

    pub fn live_elapsed(&self, now: Timestamp) -> f64 {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => self.elapsed_time + crate::clock::minutes_between(start, now),
            _ => self.elapsed_time,
        }
    }

    pub fn is_over_target(&self, now: Timestamp) -> bool {
        self.target_time
            .is_some_and(|target| self.live_elapsed(now) > target)
    }
}

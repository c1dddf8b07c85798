use jiff::civil::{Date, Time};
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::minutes_between;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// UUID to identify the task
    pub id: Uuid,
    /// Title of the task
    pub title: String,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Category of this task, `None` when uncategorized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    /// Time budget in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time: Option<f64>,
    /// Minutes accumulated over all finished run segments
    #[serde(default)]
    pub elapsed_time: f64,
    /// Whether a run segment is open
    #[serde(default)]
    pub is_running: bool,
    /// When the open run segment began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Deadline>,
    /// Display position within the task's category
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
    /// When the task was completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Minutes in the open run segment, zero when stopped.
    pub fn running_minutes(&self, now: Timestamp) -> f64 {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => minutes_between(start, now),
            _ => 0.0,
        }
    }

    /// Stored elapsed time plus the open segment. Read-only: callers render
    /// this, nothing persists it.
    pub fn live_elapsed(&self, now: Timestamp) -> f64 {
        self.elapsed_time + self.running_minutes(now)
    }

    pub fn is_over_target(&self, now: Timestamp) -> bool {
        self.target_time
            .is_some_and(|target| self.live_elapsed(now) > target)
    }

    /// Minutes left before the target is reached; negative once over.
    pub fn remaining(&self, now: Timestamp) -> Option<f64> {
        self.target_time
            .map(|target| target - self.live_elapsed(now))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub date: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Time>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    Expired,
    DueToday,
    DueTomorrow,
    Later,
}

impl Deadline {
    pub fn new(date: Date, time: Option<Time>) -> Self {
        Self { date, time }
    }

    /// Instant the deadline passes in `tz`. Without a time of day that is the
    /// last instant of `date`.
    pub fn expires_at(&self, tz: &TimeZone) -> Option<Timestamp> {
        let time = self.time.unwrap_or(Time::MAX);
        self.date
            .to_datetime(time)
            .to_zoned(tz.clone())
            .ok()
            .map(|zoned| zoned.timestamp())
    }

    pub fn status(&self, now: Timestamp, tz: &TimeZone) -> DeadlineStatus {
        let Some(expires_at) = self.expires_at(tz) else {
            return DeadlineStatus::Later;
        };

        let left = expires_at.duration_since(now);
        if left < SignedDuration::ZERO {
            DeadlineStatus::Expired
        } else if left < SignedDuration::from_hours(24) {
            DeadlineStatus::DueToday
        } else if left < SignedDuration::from_hours(48) {
            DeadlineStatus::DueTomorrow
        } else {
            DeadlineStatus::Later
        }
    }
}

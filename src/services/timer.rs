use log::{debug, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    clock::Clock,
    models::{task::Task, timer::Timer},
    services::{task_key, timer_key},
    storage::{Batch, KeyValueStore, StorageError, load_record},
};

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Task '{0}' not found")]
    NotFound(Uuid),

    #[error("Timer of task '{0}' is not running")]
    NotRunning(Uuid),

    #[error("Timer of task '{0}' is already running")]
    AlreadyRunning(Uuid),

    #[error("Task '{0}' is completed")]
    Completed(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Start/stop/reset transitions of the timer embedded in a task.
///
/// Every transition writes the task and its `timer:<id>` projection in one
/// batch, guarded by the task record that was read, so a concurrent writer
/// makes the transition fail with a conflict instead of losing a segment.
pub struct TimerEngine<'a, S: ?Sized> {
    kv: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: KeyValueStore + ?Sized> TimerEngine<'a, S> {
    pub fn new(kv: &'a S, clock: &'a dyn Clock) -> Self {
        Self { kv, clock }
    }

    pub fn get(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        load_record::<Task, _>(self.kv, &task_key(task_id))?
            .map(|(task, _)| Timer::from_task(&task))
            .ok_or(TimerError::NotFound(task_id))
    }

    /// Open a run segment at "now". Refused while a segment is already open
    /// or once the task is completed.
    pub fn start(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        let key = task_key(task_id);
        let (mut task, raw) =
            load_record::<Task, _>(self.kv, &key)?.ok_or(TimerError::NotFound(task_id))?;

        if task.is_running {
            return Err(TimerError::AlreadyRunning(task_id));
        }
        if task.is_completed() {
            return Err(TimerError::Completed(task_id));
        }

        let now = self.clock.now();
        task.is_running = true;
        task.start_time = Some(now);
        task.updated_at = now;

        let timer = self.write(&key, raw, None, &task)?;
        debug!("started timer of task {task_id}");
        Ok(timer)
    }

    /// Close the open segment and add its length to the elapsed time.
    pub fn stop(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        let key = task_key(task_id);
        let projection_key = timer_key(task_id);

        let (mut task, raw) =
            load_record::<Task, _>(self.kv, &key)?.ok_or(TimerError::NotFound(task_id))?;
        let Some(projection) = self.kv.get(&projection_key)? else {
            if task.is_running {
                warn!(
                    "task {task_id} is marked running but has no '{projection_key}' record; \
                     reset its timer to clear the state"
                );
            }
            return Err(TimerError::NotRunning(task_id));
        };
        if !task.is_running {
            return Err(TimerError::NotRunning(task_id));
        }

        let now = self.clock.now();
        task.elapsed_time += task.running_minutes(now);
        task.is_running = false;
        task.start_time = None;
        task.updated_at = now;

        let timer = self.write(&key, raw, Some(projection), &task)?;
        debug!(
            "stopped timer of task {task_id} at {:.2} minutes",
            timer.elapsed_time
        );
        Ok(timer)
    }

    /// Back to zero and stopped, whatever the current state.
    pub fn reset(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        let key = task_key(task_id);
        let (mut task, raw) =
            load_record::<Task, _>(self.kv, &key)?.ok_or(TimerError::NotFound(task_id))?;

        task.elapsed_time = 0.0;
        task.is_running = false;
        task.start_time = None;
        task.updated_at = self.clock.now();

        let timer = self.write(&key, raw, None, &task)?;
        debug!("reset timer of task {task_id}");
        Ok(timer)
    }

    fn write(
        &self,
        key: &str,
        raw: serde_json::Value,
        projection: Option<serde_json::Value>,
        task: &Task,
    ) -> Result<Timer, TimerError> {
        let timer = Timer::from_task(task);
        let projection_key = timer_key(task.id);

        let mut batch = Batch::new();
        batch.expect(key, Some(raw)).put(key, task)?;
        if let Some(projection) = projection {
            batch.expect(&projection_key, Some(projection));
        }
        batch.put(&projection_key, &timer)?;
        self.kv.apply(batch)?;

        Ok(timer)
    }
}

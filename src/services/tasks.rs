use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    clock::Clock,
    models::{
        task::{Deadline, Task},
        timer::Timer,
    },
    services::{ALL_TASKS_KEY, present, task_key, timer_key},
    storage::{Batch, KeyValueStore, StorageError, load_record},
    validation::{FieldErrors, validate_task_fields},
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task: {0}")]
    Validation(FieldErrors),

    #[error("Task '{0}' not found")]
    NotFound(Uuid),

    #[error("Task '{0}' has a running timer, stop it first")]
    Running(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateTaskParameters {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub target_time: Option<f64>,
    #[serde(default)]
    pub deadline: Option<Deadline>,
    #[serde(default)]
    pub order: i64,
}

/// Partial update of a task. For clearable fields the outer `Option` says
/// whether the field is touched and the inner one carries the new value, so
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateTaskParameters {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub category_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "present")]
    pub target_time: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub deadline: Option<Option<Deadline>>,
    #[serde(default)]
    pub elapsed_time: Option<f64>,
    #[serde(default)]
    pub order: Option<i64>,
}

impl UpdateTaskParameters {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        validate_task_fields(
            self.title.as_deref(),
            self.target_time.flatten(),
            self.elapsed_time,
        )
    }

    fn touches_timer(&self) -> bool {
        self.target_time.is_some() || self.elapsed_time.is_some()
    }

    fn apply_to(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(category_id) = self.category_id {
            task.category_id = category_id;
        }
        if let Some(target_time) = self.target_time {
            task.target_time = target_time;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(elapsed_time) = self.elapsed_time {
            task.elapsed_time = elapsed_time;
        }
        if let Some(order) = self.order {
            task.order = order;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderOutcome {
    /// Ids whose `order` was written, in sequence order
    pub updated: Vec<Uuid>,
    /// Ids that are not live tasks
    pub skipped: Vec<Uuid>,
}

pub struct TaskStore<'a, S: ?Sized> {
    kv: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: KeyValueStore + ?Sized> TaskStore<'a, S> {
    pub fn new(kv: &'a S, clock: &'a dyn Clock) -> Self {
        Self { kv, clock }
    }

    pub fn create(&self, parameters: CreateTaskParameters) -> Result<Task, TaskError> {
        validate_task_fields(Some(&parameters.title), parameters.target_time, None)
            .map_err(TaskError::Validation)?;

        let now = self.clock.now();
        let task = Task {
            id: Uuid::new_v4(),
            title: parameters.title,
            description: parameters.description,
            category_id: parameters.category_id,
            target_time: parameters.target_time,
            elapsed_time: 0.0,
            is_running: false,
            start_time: None,
            deadline: parameters.deadline,
            order: parameters.order,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut batch = Batch::new();
        batch
            .put(&task_key(task.id), &task)?
            .add_to_set(ALL_TASKS_KEY, &task.id.to_string());
        self.kv.apply(batch)?;

        debug!("created task {} '{}'", task.id, task.title);
        Ok(task)
    }

    pub fn get(&self, id: Uuid) -> Result<Task, TaskError> {
        load_record::<Task, _>(self.kv, &task_key(id))?
            .map(|(task, _)| task)
            .ok_or(TaskError::NotFound(id))
    }

    pub fn update(&self, id: Uuid, parameters: UpdateTaskParameters) -> Result<Task, TaskError> {
        let key = task_key(id);
        let (mut task, raw) =
            load_record::<Task, _>(self.kv, &key)?.ok_or(TaskError::NotFound(id))?;

        parameters.validate().map_err(TaskError::Validation)?;

        let touches_timer = parameters.touches_timer();
        parameters.apply_to(&mut task);
        task.updated_at = self.clock.now();

        let mut batch = Batch::new();
        batch.expect(&key, Some(raw)).put(&key, &task)?;

        // Keep an existing timer projection in step with the task.
        let projection_key = timer_key(id);
        if touches_timer && self.kv.get(&projection_key)?.is_some() {
            batch.put(&projection_key, &Timer::from_task(&task))?;
        }

        self.kv.apply(batch)?;

        debug!("updated task {id}");
        Ok(task)
    }

    /// Deleting a task that doesn't exist succeeds.
    pub fn delete(&self, id: Uuid) -> Result<(), TaskError> {
        let mut batch = Batch::new();
        batch
            .delete(&task_key(id))
            .delete(&timer_key(id))
            .remove_from_set(ALL_TASKS_KEY, &id.to_string());
        self.kv.apply(batch)?;

        debug!("deleted task {id}");
        Ok(())
    }

    /// Every live task, in no particular order.
    pub fn list_all(&self) -> Result<Vec<Task>, TaskError> {
        Ok(self.load_all()?.into_iter().map(|(task, _)| task).collect())
    }

    /// Give each listed task its position in `task_ids` as `order`, in one
    /// batch. Ids that are not live tasks are skipped and reported; when an id
    /// repeats, its last position wins.
    pub fn reorder(&self, task_ids: &[Uuid]) -> Result<ReorderOutcome, TaskError> {
        let mut slots: HashMap<Uuid, usize> = HashMap::with_capacity(task_ids.len());
        let mut sequence: Vec<(Uuid, i64)> = Vec::with_capacity(task_ids.len());
        for (position, id) in task_ids.iter().enumerate() {
            let position = position as i64;
            match slots.get(id).copied() {
                Some(slot) => sequence[slot].1 = position,
                None => {
                    slots.insert(*id, sequence.len());
                    sequence.push((*id, position));
                }
            }
        }

        let index: HashSet<String> = self.kv.list_set(ALL_TASKS_KEY)?.into_iter().collect();
        let mut outcome = ReorderOutcome::default();
        let mut batch = Batch::new();

        for (id, position) in sequence {
            let key = task_key(id);
            let record = if index.contains(&id.to_string()) {
                load_record::<Task, _>(self.kv, &key)?
            } else {
                None
            };
            let Some((mut task, raw)) = record else {
                outcome.skipped.push(id);
                continue;
            };

            task.order = position;
            batch.expect(&key, Some(raw)).put(&key, &task)?;
            outcome.updated.push(id);
        }

        if !outcome.skipped.is_empty() {
            warn!(
                "reorder skipped {} unknown task id(s): {:?}",
                outcome.skipped.len(),
                outcome.skipped
            );
        }

        self.kv.apply(batch)?;

        debug!("reordered {} task(s)", outcome.updated.len());
        Ok(outcome)
    }

    /// Mark a task completed. A running task must be stopped first; a task
    /// that is already completed keeps its first completion time.
    pub fn complete(&self, id: Uuid) -> Result<Task, TaskError> {
        let key = task_key(id);
        let (mut task, raw) =
            load_record::<Task, _>(self.kv, &key)?.ok_or(TaskError::NotFound(id))?;

        if task.is_running {
            return Err(TaskError::Running(id));
        }
        if task.is_completed() {
            return Ok(task);
        }

        let now = self.clock.now();
        task.completed_at = Some(now);
        task.updated_at = now;

        let mut batch = Batch::new();
        batch.expect(&key, Some(raw)).put(&key, &task)?;
        self.kv.apply(batch)?;

        debug!("completed task {id}");
        Ok(task)
    }

    /// Move every task of `category_id` to "uncategorized". Returns the ids of
    /// the tasks that changed.
    pub fn clear_category(&self, category_id: Uuid) -> Result<Vec<Uuid>, TaskError> {
        let now = self.clock.now();
        let mut batch = Batch::new();
        let mut detached = Vec::new();

        for (mut task, raw) in self.load_all()? {
            if task.category_id != Some(category_id) {
                continue;
            }
            let key = task_key(task.id);
            task.category_id = None;
            task.updated_at = now;
            batch.expect(&key, Some(raw)).put(&key, &task)?;
            detached.push(task.id);
        }

        self.kv.apply(batch)?;

        debug!(
            "detached {} task(s) from category {category_id}",
            detached.len()
        );
        Ok(detached)
    }

    fn load_all(&self) -> Result<Vec<(Task, Value)>, StorageError> {
        let mut tasks = Vec::new();
        for member in self.kv.list_set(ALL_TASKS_KEY)? {
            let Ok(id) = member.parse::<Uuid>() else {
                warn!("ignoring malformed id '{member}' in the '{ALL_TASKS_KEY}' index");
                continue;
            };
            if let Some(entry) = load_record::<Task, _>(self.kv, &task_key(id))? {
                tasks.push(entry);
            }
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use jiff::{SignedDuration, Timestamp};

    use super::*;
    use crate::{
        clock::ManualClock,
        storage::memory::{InterleavedStore, MemoryStore},
    };

    fn setup() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(Timestamp::from_second(1_700_000_000).unwrap());
        (MemoryStore::new(), clock)
    }

    fn titled(title: &str) -> CreateTaskParameters {
        CreateTaskParameters {
            title: title.to_string(),
            ..CreateTaskParameters::default()
        }
    }

    #[test]
    fn test_create_then_get_round_trips() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);

        let category_id = Uuid::new_v4();
        let created = store
            .create(CreateTaskParameters {
                title: "Write report".into(),
                description: Some("Quarterly numbers".into()),
                category_id: Some(category_id),
                target_time: Some(45.0),
                order: 3,
                ..CreateTaskParameters::default()
            })
            .unwrap();

        assert_eq!(created.elapsed_time, 0.0);
        assert!(!created.is_running);
        assert_eq!(created.created_at, clock.now());
        assert_eq!(created.updated_at, clock.now());
        assert_eq!(created.category_id, Some(category_id));

        let fetched = store.get(created.id).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(
            kv.list_set(ALL_TASKS_KEY).unwrap(),
            vec![created.id.to_string()]
        );
    }

    #[test]
    fn test_create_rejects_blank_title() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);

        match store.create(titled("")) {
            Err(TaskError::Validation(errors)) => assert!(errors.contains("title")),
            _ => panic!("Expected a validation error naming title"),
        }
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_negative_target() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);

        let result = store.create(CreateTaskParameters {
            title: "x".into(),
            target_time: Some(-1.0),
            ..CreateTaskParameters::default()
        });
        match result {
            Err(TaskError::Validation(errors)) => {
                assert!(errors.contains("targetTime"));
                assert!(!errors.contains("title"));
            }
            _ => panic!("Expected a validation error naming targetTime"),
        }
    }

    #[test]
    fn test_update_merges_patch_and_bumps_updated_at() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let task = store
            .create(CreateTaskParameters {
                title: "Draft".into(),
                description: Some("old".into()),
                target_time: Some(30.0),
                ..CreateTaskParameters::default()
            })
            .unwrap();

        clock.advance(SignedDuration::from_mins(1));
        let updated = store
            .update(
                task.id,
                UpdateTaskParameters {
                    description: Some(None),
                    target_time: Some(Some(60.0)),
                    ..UpdateTaskParameters::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Draft");
        assert_eq!(updated.description, None);
        assert_eq!(updated.target_time, Some(60.0));
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(updated.updated_at, clock.now());
        assert_eq!(store.get(task.id).unwrap(), updated);
    }

    #[test]
    fn test_update_rejects_invalid_patch_without_applying() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let task = store.create(titled("Keep me")).unwrap();

        let result = store.update(
            task.id,
            UpdateTaskParameters {
                title: Some("  ".into()),
                order: Some(9),
                ..UpdateTaskParameters::default()
            },
        );

        assert!(matches!(result, Err(TaskError::Validation(_))));
        assert_eq!(store.get(task.id).unwrap(), task);
    }

    #[test]
    fn test_update_missing_task_is_not_found() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let id = Uuid::new_v4();

        let result = store.update(
            id,
            UpdateTaskParameters {
                title: Some("x".into()),
                ..UpdateTaskParameters::default()
            },
        );
        assert!(matches!(result, Err(TaskError::NotFound(missing)) if missing == id));
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: UpdateTaskParameters =
            serde_json::from_str(r#"{"categoryId": null, "order": 2}"#).unwrap();
        assert_eq!(patch.category_id, Some(None));
        assert_eq!(patch.description, None);
        assert_eq!(patch.order, Some(2));

        let unknown = serde_json::from_str::<UpdateTaskParameters>(r#"{"isRunning": true}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let task = store.create(titled("Short-lived")).unwrap();

        store.delete(task.id).unwrap();
        store.delete(task.id).unwrap();
        store.delete(Uuid::new_v4()).unwrap();

        assert!(matches!(store.get(task.id), Err(TaskError::NotFound(_))));
        assert!(kv.list_set(ALL_TASKS_KEY).unwrap().is_empty());
    }

    #[test]
    fn test_list_all_skips_dangling_index_entries() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let task = store.create(titled("Real")).unwrap();
        kv.add_to_set(ALL_TASKS_KEY, &Uuid::new_v4().to_string())
            .unwrap();
        kv.add_to_set(ALL_TASKS_KEY, "not-a-uuid").unwrap();

        let tasks = store.list_all().unwrap();
        assert_eq!(tasks, vec![task]);
    }

    #[test]
    fn test_reorder_assigns_positions() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let a = store.create(CreateTaskParameters { order: 7, ..titled("A") }).unwrap();
        let b = store.create(CreateTaskParameters { order: -2, ..titled("B") }).unwrap();
        let c = store.create(CreateTaskParameters { order: 7, ..titled("C") }).unwrap();

        let outcome = store.reorder(&[c.id, a.id, b.id]).unwrap();

        assert_eq!(outcome.updated, vec![c.id, a.id, b.id]);
        assert!(outcome.skipped.is_empty());
        assert_eq!(store.get(c.id).unwrap().order, 0);
        assert_eq!(store.get(a.id).unwrap().order, 1);
        assert_eq!(store.get(b.id).unwrap().order, 2);
    }

    #[test]
    fn test_reorder_skips_unknown_ids_and_leaves_others_alone() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let a = store.create(titled("A")).unwrap();
        let untouched = store.create(CreateTaskParameters { order: 5, ..titled("Other") }).unwrap();
        let ghost = Uuid::new_v4();

        let outcome = store.reorder(&[ghost, a.id]).unwrap();

        assert_eq!(outcome.skipped, vec![ghost]);
        assert_eq!(outcome.updated, vec![a.id]);
        assert_eq!(store.get(a.id).unwrap().order, 1);
        assert_eq!(store.get(untouched.id).unwrap().order, 5);
        assert!(kv.get(&task_key(ghost)).unwrap().is_none());
    }

    #[test]
    fn test_reorder_last_position_wins_for_duplicates() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let a = store.create(titled("A")).unwrap();
        let b = store.create(titled("B")).unwrap();

        store.reorder(&[a.id, b.id, a.id]).unwrap();

        assert_eq!(store.get(a.id).unwrap().order, 2);
        assert_eq!(store.get(b.id).unwrap().order, 1);
    }

    #[test]
    fn test_complete_rejects_running_task() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let task = store.create(titled("Busy")).unwrap();

        let mut running = task.clone();
        running.is_running = true;
        running.start_time = Some(clock.now());
        kv.set(&task_key(task.id), serde_json::to_value(&running).unwrap())
            .unwrap();

        assert!(matches!(store.complete(task.id), Err(TaskError::Running(_))));
        assert!(store.get(task.id).unwrap().completed_at.is_none());
    }

    #[test]
    fn test_complete_keeps_first_completion_time() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let task = store.create(titled("Ship it")).unwrap();

        let done = store.complete(task.id).unwrap();
        assert_eq!(done.completed_at, Some(clock.now()));

        let first = done.completed_at;
        clock.advance(SignedDuration::from_hours(1));
        assert_eq!(store.complete(task.id).unwrap().completed_at, first);
    }

    #[test]
    fn test_clear_category_detaches_only_members() {
        let (kv, clock) = setup();
        let store = TaskStore::new(&kv, &clock);
        let category_id = Uuid::new_v4();
        let other_category = Uuid::new_v4();
        let in_category = |title: &str, id: Uuid| CreateTaskParameters {
            category_id: Some(id),
            ..titled(title)
        };

        let t1 = store.create(in_category("T1", category_id)).unwrap();
        let t2 = store.create(in_category("T2", category_id)).unwrap();
        let t3 = store.create(in_category("T3", other_category)).unwrap();

        let mut detached = store.clear_category(category_id).unwrap();
        detached.sort();
        let mut expected = vec![t1.id, t2.id];
        expected.sort();

        assert_eq!(detached, expected);
        assert_eq!(store.get(t1.id).unwrap().category_id, None);
        assert_eq!(store.get(t2.id).unwrap().category_id, None);
        assert_eq!(store.get(t3.id).unwrap().category_id, Some(other_category));
    }

    fn lost_race(result: Result<impl std::fmt::Debug, TaskError>) -> bool {
        matches!(result, Err(TaskError::Storage(StorageError::Conflict { .. })))
    }

    #[test]
    fn test_update_loses_to_a_concurrent_write() {
        let kv = InterleavedStore::new();
        let clock = ManualClock::new(Timestamp::from_second(1_700_000_000).unwrap());
        let store = TaskStore::new(&kv, &clock);
        let task = store.create(titled("Draft")).unwrap();

        kv.arm(&task_key(task.id));
        let result = store.update(
            task.id,
            UpdateTaskParameters {
                order: Some(9),
                ..UpdateTaskParameters::default()
            },
        );

        assert!(lost_race(result));
        let stored = store.get(task.id).unwrap();
        assert_eq!(stored.title, "edited elsewhere");
        assert_eq!(stored.order, task.order);
    }

    #[test]
    fn test_complete_loses_to_a_concurrent_write() {
        let kv = InterleavedStore::new();
        let clock = ManualClock::new(Timestamp::from_second(1_700_000_000).unwrap());
        let store = TaskStore::new(&kv, &clock);
        let task = store.create(titled("Draft")).unwrap();

        kv.arm(&task_key(task.id));

        assert!(lost_race(store.complete(task.id)));
        assert!(!store.get(task.id).unwrap().is_completed());
    }

    #[test]
    fn test_reorder_is_all_or_nothing_under_a_concurrent_write() {
        let kv = InterleavedStore::new();
        let clock = ManualClock::new(Timestamp::from_second(1_700_000_000).unwrap());
        let store = TaskStore::new(&kv, &clock);
        let a = store
            .create(CreateTaskParameters {
                order: 5,
                ..titled("a")
            })
            .unwrap();
        let b = store
            .create(CreateTaskParameters {
                order: 7,
                ..titled("b")
            })
            .unwrap();

        kv.arm(&task_key(a.id));

        assert!(lost_race(store.reorder(&[b.id, a.id])));
        assert_eq!(store.get(a.id).unwrap().order, 5);
        assert_eq!(store.get(b.id).unwrap().order, 7);
    }
}

use thiserror::Error;
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    models::{category::Category, task::Task, timer::Timer},
    services::{
        categories::{
            CategoryError, CategoryStore, CreateCategoryParameters, UpdateCategoryParameters,
        },
        settings::{SettingsError, SettingsStore},
        tasks::{CreateTaskParameters, ReorderOutcome, TaskError, TaskStore, UpdateTaskParameters},
        timer::{TimerEngine, TimerError},
    },
    storage::KeyValueStore,
};

/// Errors of operations that span more than one store.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Category(#[from] CategoryError),
}

/// An opened store plus the clock every transition reads. This is the whole
/// inbound surface: callers never build the stores themselves.
pub struct Workspace<S, C = SystemClock> {
    kv: S,
    clock: C,
}

impl<S: KeyValueStore> Workspace<S, SystemClock> {
    pub fn open(kv: S) -> Self {
        Self::new(kv, SystemClock)
    }
}

impl<S: KeyValueStore, C: Clock> Workspace<S, C> {
    pub fn new(kv: S, clock: C) -> Self {
        Self { kv, clock }
    }

    pub fn store(&self) -> &S {
        &self.kv
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn tasks(&self) -> TaskStore<'_, S> {
        TaskStore::new(&self.kv, &self.clock)
    }

    fn categories(&self) -> CategoryStore<'_, S> {
        CategoryStore::new(&self.kv, &self.clock)
    }

    fn timer(&self) -> TimerEngine<'_, S> {
        TimerEngine::new(&self.kv, &self.clock)
    }

    fn settings(&self) -> SettingsStore<'_, S> {
        SettingsStore::new(&self.kv)
    }

    // Tasks

    pub fn create_task(&self, parameters: CreateTaskParameters) -> Result<Task, TaskError> {
        self.tasks().create(parameters)
    }

    pub fn get_task(&self, id: Uuid) -> Result<Task, TaskError> {
        self.tasks().get(id)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, TaskError> {
        self.tasks().list_all()
    }

    pub fn update_task(
        &self,
        id: Uuid,
        parameters: UpdateTaskParameters,
    ) -> Result<Task, TaskError> {
        self.tasks().update(id, parameters)
    }

    pub fn delete_task(&self, id: Uuid) -> Result<(), TaskError> {
        self.tasks().delete(id)
    }

    pub fn reorder_tasks(&self, task_ids: &[Uuid]) -> Result<ReorderOutcome, TaskError> {
        self.tasks().reorder(task_ids)
    }

    pub fn complete_task(&self, id: Uuid) -> Result<Task, TaskError> {
        self.tasks().complete(id)
    }

    // Categories

    pub fn create_category(
        &self,
        parameters: CreateCategoryParameters,
    ) -> Result<Category, CategoryError> {
        self.categories().create(parameters)
    }

    pub fn get_category(&self, id: Uuid) -> Result<Category, CategoryError> {
        self.categories().get(id)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, CategoryError> {
        self.categories().list_all()
    }

    pub fn update_category(
        &self,
        id: Uuid,
        parameters: UpdateCategoryParameters,
    ) -> Result<Category, CategoryError> {
        self.categories().update(id, parameters)
    }

    /// Detach the category's tasks, then delete the category. Returns the ids
    /// of the tasks that became uncategorized. If detaching fails the category
    /// is left in place.
    pub fn delete_category(&self, id: Uuid) -> Result<Vec<Uuid>, WorkspaceError> {
        let detached = self.tasks().clear_category(id)?;
        self.categories().delete(id)?;
        Ok(detached)
    }

    // Timer

    pub fn start_timer(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        self.timer().start(task_id)
    }

    pub fn stop_timer(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        self.timer().stop(task_id)
    }

    pub fn reset_timer(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        self.timer().reset(task_id)
    }

    pub fn get_timer(&self, task_id: Uuid) -> Result<Timer, TimerError> {
        self.timer().get(task_id)
    }

    // Settings

    pub fn work_time_goal(&self) -> Result<f64, SettingsError> {
        self.settings().work_time_goal()
    }

    pub fn set_work_time_goal(&self, minutes: f64) -> Result<f64, SettingsError> {
        self.settings().set_work_time_goal(minutes)
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use super::*;
    use crate::{clock::ManualClock, storage::memory::MemoryStore};

    fn workspace() -> Workspace<MemoryStore, ManualClock> {
        Workspace::new(
            MemoryStore::new(),
            ManualClock::new(Timestamp::from_second(1_700_000_000).unwrap()),
        )
    }

    #[test]
    fn test_delete_category_detaches_only_its_tasks() {
        let ws = workspace();
        let work = ws
            .create_category(CreateCategoryParameters {
                name: "Work".into(),
                ..CreateCategoryParameters::default()
            })
            .unwrap();
        let home = ws
            .create_category(CreateCategoryParameters {
                name: "Home".into(),
                ..CreateCategoryParameters::default()
            })
            .unwrap();

        let in_work = |title: &str, category_id| CreateTaskParameters {
            title: title.into(),
            category_id,
            ..CreateTaskParameters::default()
        };
        let a = ws.create_task(in_work("a", Some(work.id))).unwrap();
        let b = ws.create_task(in_work("b", Some(work.id))).unwrap();
        let c = ws.create_task(in_work("c", Some(home.id))).unwrap();
        let d = ws.create_task(in_work("d", None)).unwrap();

        let mut detached = ws.delete_category(work.id).unwrap();
        detached.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(detached, expected);

        assert_eq!(ws.get_task(a.id).unwrap().category_id, None);
        assert_eq!(ws.get_task(b.id).unwrap().category_id, None);
        assert_eq!(ws.get_task(c.id).unwrap().category_id, Some(home.id));
        assert_eq!(ws.get_task(d.id).unwrap().category_id, None);

        assert!(matches!(
            ws.get_category(work.id),
            Err(CategoryError::NotFound(_))
        ));
        assert_eq!(ws.list_categories().unwrap(), vec![home]);
    }

    #[test]
    fn test_delete_unknown_category_is_fine() {
        let ws = workspace();
        assert!(ws.delete_category(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_timer_goes_through_the_same_store() {
        let ws = workspace();
        let task = ws
            .create_task(CreateTaskParameters {
                title: "Deep work".into(),
                ..CreateTaskParameters::default()
            })
            .unwrap();

        ws.start_timer(task.id).unwrap();
        assert!(ws.get_task(task.id).unwrap().is_running);
        assert!(matches!(
            ws.complete_task(task.id),
            Err(TaskError::Running(_))
        ));
        ws.stop_timer(task.id).unwrap();
        assert!(ws.complete_task(task.id).unwrap().is_completed());
    }
}

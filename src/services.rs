use serde::{Deserialize, Deserializer};
use uuid::Uuid;

pub mod categories;
pub mod settings;
pub mod tasks;
pub mod timer;

pub const TASK_KEY_PREFIX: &str = "task:";
pub const CATEGORY_KEY_PREFIX: &str = "category:";
pub const TIMER_KEY_PREFIX: &str = "timer:";

/// Index set holding every live task id
pub const ALL_TASKS_KEY: &str = "tasks";
/// Index set holding every live category id
pub const ALL_CATEGORIES_KEY: &str = "categories";

pub fn task_key(id: Uuid) -> String {
    format!("{TASK_KEY_PREFIX}{id}")
}

pub fn category_key(id: Uuid) -> String {
    format!("{CATEGORY_KEY_PREFIX}{id}")
}

pub fn timer_key(task_id: Uuid) -> String {
    format!("{TIMER_KEY_PREFIX}{task_id}")
}

/// Lets a patch tell "field absent" (`None`) apart from "field set to null"
/// (`Some(None)`).
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

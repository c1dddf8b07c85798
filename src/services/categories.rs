use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    clock::Clock,
    models::category::{Category, DEFAULT_COLOR},
    services::{ALL_CATEGORIES_KEY, category_key},
    storage::{Batch, KeyValueStore, StorageError, load_record},
    validation::{FieldErrors, validate_category_fields},
};

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("Invalid category: {0}")]
    Validation(FieldErrors),

    #[error("Category '{0}' not found")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCategoryParameters {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub order: i64,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl Default for CreateCategoryParameters {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: default_color(),
            order: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateCategoryParameters {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

/// CRUD over categories. Knows nothing about tasks: deleting a category
/// leaves its tasks pointing at a missing id until the caller detaches them.
pub struct CategoryStore<'a, S: ?Sized> {
    kv: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: KeyValueStore + ?Sized> CategoryStore<'a, S> {
    pub fn new(kv: &'a S, clock: &'a dyn Clock) -> Self {
        Self { kv, clock }
    }

    pub fn create(&self, parameters: CreateCategoryParameters) -> Result<Category, CategoryError> {
        validate_category_fields(Some(&parameters.name)).map_err(CategoryError::Validation)?;

        let now = self.clock.now();
        let category = Category {
            id: Uuid::new_v4(),
            name: parameters.name,
            color: parameters.color,
            order: parameters.order,
            created_at: now,
            updated_at: now,
        };

        let mut batch = Batch::new();
        batch
            .put(&category_key(category.id), &category)?
            .add_to_set(ALL_CATEGORIES_KEY, &category.id.to_string());
        self.kv.apply(batch)?;

        debug!("created category {} '{}'", category.id, category.name);
        Ok(category)
    }

    pub fn get(&self, id: Uuid) -> Result<Category, CategoryError> {
        load_record::<Category, _>(self.kv, &category_key(id))?
            .map(|(category, _)| category)
            .ok_or(CategoryError::NotFound(id))
    }

    pub fn update(
        &self,
        id: Uuid,
        parameters: UpdateCategoryParameters,
    ) -> Result<Category, CategoryError> {
        let key = category_key(id);
        let (mut category, raw) =
            load_record::<Category, _>(self.kv, &key)?.ok_or(CategoryError::NotFound(id))?;

        validate_category_fields(parameters.name.as_deref()).map_err(CategoryError::Validation)?;

        if let Some(name) = parameters.name {
            category.name = name;
        }
        if let Some(color) = parameters.color {
            category.color = color;
        }
        if let Some(order) = parameters.order {
            category.order = order;
        }
        category.updated_at = self.clock.now();

        let mut batch = Batch::new();
        batch.expect(&key, Some(raw)).put(&key, &category)?;
        self.kv.apply(batch)?;

        debug!("updated category {id}");
        Ok(category)
    }

    /// Removes the record and its index entry. Missing ids are not an error.
    pub fn delete(&self, id: Uuid) -> Result<(), CategoryError> {
        let mut batch = Batch::new();
        batch
            .delete(&category_key(id))
            .remove_from_set(ALL_CATEGORIES_KEY, &id.to_string());
        self.kv.apply(batch)?;

        debug!("deleted category {id}");
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<Category>, CategoryError> {
        let mut categories = Vec::new();
        for member in self.kv.list_set(ALL_CATEGORIES_KEY)? {
            let Ok(id) = member.parse::<Uuid>() else {
                warn!("ignoring malformed id '{member}' in the '{ALL_CATEGORIES_KEY}' index");
                continue;
            };
            if let Some((category, _)) = load_record::<Category, _>(self.kv, &category_key(id))? {
                categories.push(category);
            }
        }
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use jiff::{SignedDuration, Timestamp};

    use super::*;
    use crate::{clock::ManualClock, storage::memory::MemoryStore};

    fn setup() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(Timestamp::from_second(1_700_000_000).unwrap());
        (MemoryStore::new(), clock)
    }

    fn named(name: &str) -> CreateCategoryParameters {
        CreateCategoryParameters {
            name: name.to_string(),
            ..CreateCategoryParameters::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let (kv, clock) = setup();
        let store = CategoryStore::new(&kv, &clock);

        let created = store
            .create(CreateCategoryParameters {
                name: "Work".into(),
                color: "blue".into(),
                order: 1,
            })
            .unwrap();

        assert_eq!(store.get(created.id).unwrap(), created);
        assert_eq!(created.created_at, clock.now());
        assert_eq!(store.list_all().unwrap(), vec![created]);
    }

    #[test]
    fn test_create_requires_name() {
        let (kv, clock) = setup();
        let store = CategoryStore::new(&kv, &clock);

        match store.create(named(" ")) {
            Err(CategoryError::Validation(errors)) => assert!(errors.contains("name")),
            _ => panic!("Expected a validation error naming name"),
        }
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_default_color() {
        let (kv, clock) = setup();
        let store = CategoryStore::new(&kv, &clock);
        assert_eq!(store.create(named("Home")).unwrap().color, DEFAULT_COLOR);
    }

    #[test]
    fn test_update_renames_and_recolors() {
        let (kv, clock) = setup();
        let store = CategoryStore::new(&kv, &clock);
        let category = store.create(named("Wrok")).unwrap();

        clock.advance(SignedDuration::from_secs(30));
        let updated = store
            .update(
                category.id,
                UpdateCategoryParameters {
                    name: Some("Work".into()),
                    color: Some("#ff8800".into()),
                    order: None,
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Work");
        assert_eq!(updated.color, "#ff8800");
        assert_eq!(updated.order, category.order);
        assert_eq!(updated.updated_at, clock.now());
        assert_eq!(store.get(category.id).unwrap(), updated);
    }

    #[test]
    fn test_update_rejects_blank_name() {
        let (kv, clock) = setup();
        let store = CategoryStore::new(&kv, &clock);
        let category = store.create(named("Work")).unwrap();

        let result = store.update(
            category.id,
            UpdateCategoryParameters {
                name: Some(String::new()),
                ..UpdateCategoryParameters::default()
            },
        );
        assert!(matches!(result, Err(CategoryError::Validation(_))));
        assert_eq!(store.get(category.id).unwrap().name, "Work");
    }

    #[test]
    fn test_update_and_get_missing() {
        let (kv, clock) = setup();
        let store = CategoryStore::new(&kv, &clock);
        let id = Uuid::new_v4();

        assert!(matches!(store.get(id), Err(CategoryError::NotFound(_))));
        assert!(matches!(
            store.update(id, UpdateCategoryParameters::default()),
            Err(CategoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (kv, clock) = setup();
        let store = CategoryStore::new(&kv, &clock);
        let category = store.create(named("Temp")).unwrap();

        store.delete(category.id).unwrap();
        store.delete(category.id).unwrap();

        assert!(store.list_all().unwrap().is_empty());
        assert!(matches!(
            store.get(category.id),
            Err(CategoryError::NotFound(_))
        ));
    }
}

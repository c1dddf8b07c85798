use std::collections::BTreeMap;
use std::fmt;

/// Field name → message pairs collected while validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

fn check_minutes(errors: &mut FieldErrors, field: &'static str, label: &str, value: Option<f64>) {
    match value {
        Some(v) if v.is_nan() || v.is_infinite() => {
            errors.insert(field, format!("{label} must be a finite number."));
        }
        Some(v) if v < 0.0 => {
            errors.insert(field, format!("{label} cannot be negative."));
        }
        _ => {}
    }
}

/// Rules shared by task creation and update. `title` is only checked when
/// given, so a create must always pass `Some`.
pub fn validate_task_fields(
    title: Option<&str>,
    target_time: Option<f64>,
    elapsed_time: Option<f64>,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if let Some(title) = title
        && title.trim().is_empty()
    {
        errors.insert("title", "Title is required.");
    }
    check_minutes(&mut errors, "targetTime", "Target time", target_time);
    check_minutes(&mut errors, "elapsedTime", "Elapsed time", elapsed_time);

    errors.into_result()
}

pub fn validate_category_fields(name: Option<&str>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if let Some(name) = name
        && name.trim().is_empty()
    {
        errors.insert("name", "Category name is required.");
    }

    errors.into_result()
}

pub fn validate_work_time(minutes: f64) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_minutes(&mut errors, "minutes", "Work time", Some(minutes));
    errors.into_result()
}

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_COLOR: &str = "gray";

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// UUID of the category
    pub id: Uuid,
    /// Name of the category
    pub name: String,
    /// Display color token, e.g. `"blue"` or `"#ff8800"`
    #[serde(default = "default_color")]
    pub color: String,
    /// Display position among categories
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

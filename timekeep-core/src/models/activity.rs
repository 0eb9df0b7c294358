use serde::{Deserialize, Serialize};

/// Stored category id of activities that belong to no category.
pub const UNCATEGORIZED: i64 = -1;

/// Label reported for uncategorized activities.
pub const UNSORTED_CATEGORY: &str = "Unsorted";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub category_name: String,
    pub deleted: bool,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A named collection of Models. The Group<->Model edge is owned by the
/// `model_authorization` association table, not by either endpoint, so a
/// `Group` never holds a `Vec<Model>` in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGroup {
    #[validate(custom(function = "crate::models::validators::validate_name"))]
    #[validate(length(max = 255))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateGroup {
    pub description: Option<String>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A registered caller. `groups` is stored denormalized as an ordered JSON
/// array column rather than a join table (confirmed against
/// `original_source`'s `User.groups` column) — the invariant is only that
/// every name present corresponds to an existing [`crate::models::Group`]
/// row *when used for authorization*, not that the column is foreign-key
/// enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub groups: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn is_admin(&self) -> bool {
        self.is_in_group("admin")
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(custom(function = "crate::models::validators::validate_name"))]
    #[validate(length(max = 255))]
    pub username: String,
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(email)]
    pub email: Option<String>,
    pub groups: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

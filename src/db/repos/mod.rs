mod api_keys;
mod audit_logs;
pub mod cursor;
mod groups;
mod models;
mod token_usage;
mod users;

pub use api_keys::*;
pub use audit_logs::*;
pub use cursor::*;
pub use groups::*;
pub use models::*;
pub use token_usage::*;
pub use users::*;

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (oldest first)
    Asc,
    /// Descending order (newest first)
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Compute SQL comparison operator and ORDER BY direction for cursor-based pagination.
    ///
    /// Returns (comparison_operator, order_direction, should_reverse_results).
    pub fn cursor_query_params(&self, direction: CursorDirection) -> (&'static str, &'static str, bool) {
        match (self, direction) {
            (SortOrder::Desc, CursorDirection::Forward) => ("<", "DESC", false),
            (SortOrder::Desc, CursorDirection::Backward) => (">", "ASC", true),
            (SortOrder::Asc, CursorDirection::Forward) => (">", "ASC", false),
            (SortOrder::Asc, CursorDirection::Backward) => ("<", "DESC", true),
        }
    }
}

/// Pagination and listing parameters using cursor-based pagination.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub cursor: Option<Cursor>,
    pub direction: CursorDirection,
    pub sort_order: SortOrder,
}

/// Result of a paginated list query.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub cursors: PageCursors,
}

impl<T> ListResult<T> {
    pub fn new(items: Vec<T>, has_more: bool, cursors: PageCursors) -> Self {
        Self {
            items,
            has_more,
            cursors,
        }
    }
}

//! The `/v1/admin/*` surface: models, groups, and users CRUD plus the
//! operational endpoints (`refresh`, group authorization edges, token-usage
//! summaries). Every route here is gated by [`crate::middleware::admin_middleware`]
//! at the router level, so handlers can assume `Principal::is_admin()`.

pub mod groups;
pub mod models;
pub mod users;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(models::router())
        .merge(groups::router())
        .merge(users::router())
}

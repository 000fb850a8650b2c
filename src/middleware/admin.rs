//! Guards `/v1/admin/*`: the caller must already have resolved to a
//! [`Principal`](crate::auth::Principal) in the `admin` group.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::{auth::Principal, error::ApiError};

pub async fn admin_middleware(
    principal: Principal,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !principal.is_admin() {
        return Err(ApiError::Authorization(
            "admin group membership required".to_string(),
        ));
    }
    Ok(next.run(req).await)
}

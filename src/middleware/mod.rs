mod admin;
mod request_id;
mod security_headers;
mod usage;

pub use admin::admin_middleware;
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use usage::audit_middleware;

//! Request pipeline, outermost first: request logging, security headers,
//! API versioning, then per-route authentication and rate limiting.

pub mod auth;
pub mod client_ip;
pub mod logging;
pub mod rate_limit;
pub mod security_headers;
pub mod versioning;

pub use auth::auth_middleware;
pub use client_ip::client_ip;
pub use logging::request_logging;
pub use rate_limit::{RouteLimit, rate_limit};
pub use security_headers::security_headers;
pub use versioning::api_versioning;

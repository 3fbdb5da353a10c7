pub mod auth;
pub mod rate_limit;
pub mod request_log;
pub mod response_cache;
pub mod security_headers;
pub mod tenant;

pub use auth::require_auth;
pub use rate_limit::rate_limit;
pub use request_log::request_log;
pub use response_cache::response_cache;
pub use security_headers::security_headers;
pub use tenant::resolve_tenant;

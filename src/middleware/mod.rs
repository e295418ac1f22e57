/// Middleware module
///
/// Bearer-token authentication for protected scopes.

mod bearer_middleware;

pub use bearer_middleware::BearerAuth;

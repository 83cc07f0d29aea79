//! HTTP middleware for the control API.

mod auth;
mod rate_limit;

pub use auth::{AuthLayer, Caller, Claims};
pub use rate_limit::apply_rate_limit;

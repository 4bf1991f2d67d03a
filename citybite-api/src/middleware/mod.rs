pub mod auth;

pub use auth::{actor_auth_middleware, operator_middleware, Claims};

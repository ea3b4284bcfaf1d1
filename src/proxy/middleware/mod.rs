// Middleware module - Axum middleware

pub mod auth;
pub mod cors;

pub use auth::{auth_middleware, AccessGate};
pub use cors::{cors_middleware, CorsPolicy};

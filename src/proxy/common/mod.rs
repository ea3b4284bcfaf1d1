// Shared proxy building blocks

pub mod headers;
pub mod relay;
pub mod target;

// Handlers module - route components and their axum entry points

pub mod files;
pub mod openai;
pub mod webdav;

// Upstream side: pooled clients and request forwarding

pub mod client;
pub mod forward;

// proxy module - access-gated gateway and its relays

pub mod config;
pub mod server;

pub mod common; // Target resolution, header policy, stream relay
pub mod handlers; // Route components
pub mod middleware; // Access gate and CORS
pub mod upstream; // Outbound clients and forwarding


pub use config::GatewayConfig;
pub use server::{build_router, AppState, AxumServer};

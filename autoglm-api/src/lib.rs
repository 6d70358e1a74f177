//! HTTP and WebSocket surface for device connections and video streaming.

pub mod http;

pub use http::{create_router, AppState};

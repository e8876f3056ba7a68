//! HTTP API for beqd
//!
//! REST endpoints plus an SSE event stream.

pub mod handlers;
pub mod sse;

pub use handlers::{device_routes, health_routes, profile_routes, sensor_routes, status_routes};
pub use sse::event_stream;

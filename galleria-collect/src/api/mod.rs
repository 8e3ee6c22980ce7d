//! HTTP API handlers for galleria-collect

pub mod collect;
pub mod health;
pub mod sse;

pub use collect::collect_routes;
pub use health::health_routes;
pub use sse::collect_event_stream;

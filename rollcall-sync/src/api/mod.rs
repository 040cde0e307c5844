//! HTTP API for rollcall-sync

pub mod error;
pub mod health;
pub mod sync;

pub use error::{ApiError, ApiResult};
pub use health::health_routes;
pub use sync::sync_routes;

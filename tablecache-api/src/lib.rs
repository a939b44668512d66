//! Tablecache API - REST Layer
//!
//! Axum endpoints over the tablecache engine: registered connections and
//! cached tables, live schema introspection, snapshot refresh and cache
//! administration. Connection and cached-table records persist in the
//! service's own PostgreSQL database through [`PgRegistry`].

mod macros;

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::ApiConfig;
pub use db::{DbConfig, PgRegistry};
pub use engine::Engine;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::{AppState, SharedEngine, SharedRegistry};
pub use types::*;

//! Catalog API - Administrative HTTP Surface
//!
//! Drives the coherence core from operator requests:
//!
//! - `DELETE /admin/cache/emergency/{id}?reason=...` emergency override
//! - `GET /admin/cache/debug/status` dirty ledger and cache snapshot
//! - `POST /admin/cache/batch/process` immediate sweep
//! - `POST /admin/cache/validate/{id}` single-entity check and repair
//! - `POST /admin/index/sync?full=bool` on-demand indexer pass
//!
//! Every admin response uses the `{success, response, error}` envelope.

pub mod config;
pub mod error;
pub mod macros;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::{parse_bind_addr, ApiConfig};
pub use error::{ApiEnvelope, ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;

//! HTTP API: error handling, shared state, routes, and handlers.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use handlers::{ChatRequest, InputContent};
pub use routes::create_router;
pub use state::AppState;

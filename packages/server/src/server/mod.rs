// HTTP server setup (Axum)
pub mod app;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod shutdown;

pub use app::*;
pub use error::ApiError;
pub use shutdown::shutdown_signal;

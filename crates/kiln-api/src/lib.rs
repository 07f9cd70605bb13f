mod error;
pub use error::ApiError;

mod handler;
pub use handler::{ApiHandler, BuildTaskView};

mod adapter;
pub use adapter::EngineAdapter;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;

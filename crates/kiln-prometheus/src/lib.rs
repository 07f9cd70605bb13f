//! Prometheus metrics for kiln build tasks.
//!
//! [`PrometheusMetrics`] is a [`kiln_core::BuildSubscriber`]: register it on the engine and it
//! derives every metric from committed transitions.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use kiln_prometheus::{PrometheusMetrics, TextEncoder, Encoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(PrometheusMetrics::new()?);
//! // Engine::builder(ports).subscriber(metrics.clone())
//!
//! let mut buffer = Vec::new();
//! TextEncoder::new().encode(&metrics.gather(), &mut buffer)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `kiln_build_transitions_total{to}` - Counter
//! - `kiln_builds_completed_total{outcome}` - Counter
//! - `kiln_build_tasks{status}` - Gauge, tasks currently in each status
//! - `kiln_build_duration_seconds{outcome}` - Histogram of time spent `Running`
//!
//! The `/metrics` endpoint itself is served by `kiln-buildd`.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};

//! API layer
//!
//! HTTP handlers for:
//! - Landing and account pages
//! - Metrics (Prometheus)

pub mod metrics;
mod pages;
pub mod views;

pub use metrics::metrics_router;
pub use pages::pages_router;

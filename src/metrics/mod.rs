//! Metrics and HTTP surface for the warboard service
//!
//! Prometheus collection lives in [`collector`]; [`server`] exposes it next
//! to the health check and the dashboard API.

pub mod collector;
pub mod server;

pub use collector::{
    DifficultyMetrics, LedgerMetrics, MetricsCollector, MetricsTimer, RatingMetrics,
    ServiceMetrics,
};
pub use server::{create_router, ApiError, HttpServer, HttpServerConfig, ServerState};

//! Telemetry Hub
//!
//! Cache-backed reporting and trend engine for IoT telemetry topics.
//!
//! ```text
//!   HTTP (axum) ──▶ TelemetryService ──┬──▶ ReportAggregator ──┐
//!                                      ├──▶ TrendPredictor ────┤
//!                                      │                       ▼
//!                                      ├──▶ CacheGateway ◀── InvalidationCoordinator
//!                                      │        │
//!                                      │        ▼
//!                                      │   Redis / memory / disabled
//!                                      ▼
//!                          TelemetryStore + SubscriptionBroker
//! ```
//!
//! Reads are served through a fail-open cache; mutations invalidate every
//! key they may have made stale.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod report;
pub mod service;
pub mod store;
pub mod trend;
pub mod types;

pub use cache::{CacheGateway, KeyBuilder, Operation, TtlTier};
pub use config::{load_config, ServerConfig};
pub use error::{Error, Result};
pub use http::{build_router, AppState};
pub use service::{ServiceOptions, TelemetryService};
pub use store::{LocalBroker, MemoryStore, SubscriptionBroker, TelemetryStore};

//! Cache Module
//!
//! Fail-open caching in front of the durable store. It provides:
//!
//! - **Gateway**: get/set/delete that never fail the caller (`gateway.rs`)
//! - **Keys**: deterministic key builder and TTL tiers (`keys.rs`)
//! - **Backends**: Redis, in-process and disabled backends (`backend.rs`)
//! - **Status**: connectivity cell driven by lifecycle events (`status.rs`)
//! - **Invalidation**: mutation → stale keys map (`invalidation.rs`)
//! - **Monitor**: background ping loop that heals the status cell (`monitor.rs`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  get/set   ┌───────────────┐  GET/SETEX/DEL  ┌─────────────┐
//! │   Service    │───────────▶│ CacheGateway  │────────────────▶│   Backend   │
//! └──────┬───────┘            └───────▲───────┘                 └──────▲──────┘
//!        │ mutation                   │ delete / status                │ PING
//!        ▼                            │                                │
//! ┌──────────────────────┐            │          ┌───────────────────┐ │
//! │ InvalidationCoord.   │────────────┘          │ ConnectionMonitor │─┘
//! └──────────────────────┘                       └───────────────────┘
//! ```
//!
//! # TTL tiers
//!
//! | Tier   | Seconds | Used for                                        |
//! |--------|---------|-------------------------------------------------|
//! | SHORT  | 300     | raw reading windows, realtime, predictions      |
//! | MEDIUM | 1800    | subscribed-topic lists, reports                 |
//! | LONG   | 3600    | topic metadata, existence checks, counts        |

mod backend;
pub use backend::{CacheBackend, DisabledBackend, MemoryBackend, RedisBackend};

mod gateway;
pub use gateway::CacheGateway;

mod keys;
pub use keys::{canonicalize, KeyBuilder, Operation, TtlTier};

mod metrics;
pub use metrics::CacheMetrics;

mod status;
pub use status::{ConnectionState, ConnectionStatus, LifecycleEvent};

mod invalidation;
pub use invalidation::{InvalidationCoordinator, Mutation};

mod monitor;
pub use monitor::{ConnectionMonitor, MonitorConfig};

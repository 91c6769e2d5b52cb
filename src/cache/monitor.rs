//! Cache Connection Monitor
//!
//! Background service that keeps the gateway's connectivity flag in step
//! with the cache service. It pings on a fixed interval and feeds the result
//! into the status cell as `Ready` or `Error` lifecycle events, so a dropped
//! connection recovers without any request having to pay for the probe.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use super::gateway::CacheGateway;
use super::status::ConnectionState;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the connection monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between pings
    pub probe_interval: Duration,

    /// Number of consecutive failed probes before logging at error level
    pub failure_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

// ============================================================================
// Monitor Service
// ============================================================================

/// Periodically probes the cache backend
pub struct ConnectionMonitor {
    config: MonitorConfig,
    gateway: CacheGateway,
    consecutive_failures: u32,
}

impl ConnectionMonitor {
    /// Create a monitor for a gateway
    pub fn new(config: MonitorConfig, gateway: CacheGateway) -> Self {
        Self {
            config,
            gateway,
            consecutive_failures: 0,
        }
    }

    /// Consecutive failed probes so far
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one probe and update the failure counter
    pub async fn probe_once(&mut self) -> ConnectionState {
        let state = self.gateway.probe().await;
        if state.is_available() {
            if self.consecutive_failures > 0 {
                tracing::info!(
                    failures = self.consecutive_failures,
                    "Cache connection recovered"
                );
            }
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            if self.consecutive_failures == self.config.failure_threshold {
                tracing::error!(
                    failures = self.consecutive_failures,
                    backend = self.gateway.backend_name(),
                    "Cache unreachable, serving from store only"
                );
            }
        }
        state
    }

    /// Probe until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.probe_interval.as_secs(),
            backend = self.gateway.backend_name(),
            "Cache connection monitor started"
        );

        let mut probe_interval = interval(self.config.probe_interval);

        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Cache connection monitor received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(
                                missed = n,
                                "Connection monitor broadcast receiver lagged"
                            );
                        }
                    }
                }

                _ = probe_interval.tick() => {
                    self.probe_once().await;
                }
            }
        }

        tracing::info!("Cache connection monitor stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================

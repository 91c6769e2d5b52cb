//! Advisory per-topic model registry
//!
//! Holds the most recent [`TrendModel`] per topic for debugging and metrics.
//! Nothing on a request path reads it back. The map is bounded and never
//! evicts: once full, models for unseen topics are dropped while known
//! topics keep being overwritten.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::TrendModel;

/// Bounded, eviction-free topic → model map
#[derive(Debug)]
pub struct TrendModelRegistry {
    capacity: usize,
    models: RwLock<HashMap<String, TrendModel>>,
}

impl TrendModelRegistry {
    /// Create a registry holding at most `capacity` topics
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Record a model; returns `false` when the topic was refused
    pub fn record(&self, topic: &str, model: TrendModel) -> bool {
        let mut models = self.models.write();
        if let Some(slot) = models.get_mut(topic) {
            *slot = model;
            return true;
        }
        if models.len() >= self.capacity {
            tracing::debug!(topic = %topic, capacity = self.capacity, "Model registry full");
            return false;
        }
        models.insert(topic.to_string(), model);
        true
    }

    /// Last model recorded for a topic
    pub fn get(&self, topic: &str) -> Option<TrendModel> {
        self.models.read().get(topic).copied()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

impl Default for TrendModelRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}

//! Durable store and subscription collaborator interfaces
//!
//! The document store and the live-subscription mechanism are external
//! collaborators; the hub only depends on these traits. [`memory`] provides
//! in-process implementations used by the server binary and the tests.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Reading, SortOrder, TimeRange, Topic, TopicFilter};

pub mod memory;

pub use memory::{LocalBroker, MemoryStore};

/// Store result alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read/write accessors over the durable store
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Readings of a topic within an inclusive range, ordered by timestamp
    async fn find_readings(
        &self,
        topic: &str,
        range: TimeRange,
        order: SortOrder,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Reading>>;

    /// Number of stored readings for a topic
    async fn count_readings(&self, topic: &str) -> StoreResult<u64>;

    /// Every topic name that has at least one reading, sorted
    async fn distinct_topics_with_readings(&self) -> StoreResult<Vec<String>>;

    /// Delete all readings of a topic, returning how many were removed
    async fn delete_readings(&self, topic: &str) -> StoreResult<u64>;

    /// Topic records matching a filter, newest first
    async fn find_topics(&self, filter: &TopicFilter) -> StoreResult<Vec<Topic>>;

    /// Create a topic record; a taken name fails with `StoreError::Duplicate`
    async fn create_topic(&self, topic: &str, label: &str, device: &str) -> StoreResult<Topic>;

    /// Change a topic's label by record id, `None` when the id is unknown
    async fn update_topic_label(&self, id: &str, label: &str) -> StoreResult<Option<Topic>>;

    /// Delete a topic record by name, `false` when absent
    async fn delete_topic(&self, topic: &str) -> StoreResult<bool>;

    /// Topics currently receiving live readings
    async fn find_subscribed_topics(&self) -> StoreResult<Vec<String>>;
}

/// Live subscription collaborator
#[async_trait]
pub trait SubscriptionBroker: Send + Sync {
    /// Start receiving a topic, `false` when it was already subscribed
    async fn subscribe(&self, topic: &str) -> StoreResult<bool>;

    /// Stop receiving a topic, `false` when it was not subscribed
    async fn unsubscribe(&self, topic: &str) -> StoreResult<bool>;

    /// Check whether a topic is subscribed
    async fn is_subscribed(&self, topic: &str) -> StoreResult<bool>;

    /// Most recent payload received on a subscribed topic
    async fn latest_live_message(&self, topic: &str) -> StoreResult<Option<String>>;
}

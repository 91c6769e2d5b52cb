//! Cache invalidation on mutations
//!
//! The mapping from mutation to stale keys lives in exactly one place,
//! [`Mutation::invalidated_keys`]:
//!
//! | Mutation              | Deleted keys                                                          |
//! |-----------------------|-----------------------------------------------------------------------|
//! | label update          | all-topics-labels, label:{topic}                                      |
//! | tag creation          | all-topics-labels, all-tagnames, recent-5-tagnames, topic-exists:{topic} |
//! | topic deletion        | all-topics-labels, all-tagnames, recent-5-tagnames, label:{topic},    |
//! |                       | topic-exists:{topic}, message-count:{topic}, subscribed-topics        |
//! | subscription change   | subscribed-topics                                                     |
//!
//! Reading windows, reports and predictions are not enumerated: they expire
//! on the short and medium tiers.

use super::gateway::CacheGateway;
use super::keys::{KeyBuilder, Operation};

/// A store mutation that can leave cache entries stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A topic's label changed
    LabelUpdated { topic: String },
    /// A new topic record was created
    TopicCreated { topic: String },
    /// A topic, its readings and its subscription were removed
    TopicDeleted { topic: String },
    /// The set of live subscriptions changed
    SubscriptionsChanged,
}

impl Mutation {
    /// Every key that can become stale because of this mutation
    pub fn invalidated_keys(&self, keys: &KeyBuilder) -> Vec<String> {
        match self {
            Mutation::LabelUpdated { topic } => vec![
                keys.bare(Operation::AllTopicLabels),
                keys.key(Operation::TopicLabel, topic.as_str()),
            ],
            Mutation::TopicCreated { topic } => vec![
                keys.bare(Operation::AllTopicLabels),
                keys.bare(Operation::AllTagNames),
                keys.bare(Operation::RecentTagNames),
                keys.key(Operation::TopicExists, topic.as_str()),
            ],
            Mutation::TopicDeleted { topic } => vec![
                keys.bare(Operation::AllTopicLabels),
                keys.bare(Operation::AllTagNames),
                keys.bare(Operation::RecentTagNames),
                keys.key(Operation::TopicLabel, topic.as_str()),
                keys.key(Operation::TopicExists, topic.as_str()),
                keys.key(Operation::MessageCount, topic.as_str()),
                keys.bare(Operation::SubscribedTopics),
            ],
            Mutation::SubscriptionsChanged => vec![keys.bare(Operation::SubscribedTopics)],
        }
    }
}

/// Deletes dependent cache keys after mutations
#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: CacheGateway,
}

impl InvalidationCoordinator {
    /// Create a coordinator over the shared gateway
    pub fn new(cache: CacheGateway) -> Self {
        Self { cache }
    }

    /// Delete every key the mutation can leave stale
    pub async fn invalidate(&self, mutation: &Mutation) {
        let keys = mutation.invalidated_keys(self.cache.keys());
        for key in &keys {
            self.cache.delete(key).await;
        }
        self.cache.metrics().invalidations.inc_by(keys.len() as u64);
        tracing::debug!(mutation = ?mutation, keys = keys.len(), "Cache invalidated");
    }
}

//! Telemetry service
//!
//! Orchestrates every operation the HTTP surface exposes. Reads follow
//! cache probe → store → compute → cache write; mutations go straight to the
//! store and then hand a [`Mutation`] to the invalidation coordinator.
//!
//! ```text
//!            read                               mutation
//!             │                                    │
//!             ▼                                    ▼
//!      CacheGateway::get ──hit──▶ response    TelemetryStore
//!             │ miss                               │
//!             ▼                                    ▼
//!  TelemetryStore / ReportAggregator /   InvalidationCoordinator
//!        TrendPredictor                            │
//!             │                                    ▼
//!             ▼                              CacheGateway::delete
//!      CacheGateway::set ──▶ response
//! ```

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheGateway, InvalidationCoordinator, Mutation, Operation};
use crate::error::{Error, Result, StoreError};
use crate::report::{ReportAggregator, ReportLimits, ReportPage, ReportRequest};
use crate::store::{SubscriptionBroker, TelemetryStore};
use crate::trend::{PredictionQuery, PredictionResult, TrendModelRegistry, TrendPredictor};
use crate::types::{DayBound, MessageView, ReferenceZone, SortOrder, TimeRange, Topic, TopicFilter};

/// Number of names returned by the recent tag names read
pub const RECENT_TAG_NAMES: usize = 5;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a single subscribe call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeOutcome {
    pub topic: String,
    pub already_subscribed: bool,
}

/// Result of a topic deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub topic: String,
    pub deleted_messages: u64,
}

/// Latest live message and stored count of a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesSummary {
    pub topic: String,
    pub latest: Option<String>,
    pub total_messages: u64,
}

#[derive(Serialize)]
struct RangeKey<'a> {
    topic: &'a str,
    start: String,
    end: String,
}

// =============================================================================
// Service
// =============================================================================

/// Settings the service is built with
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub zone: ReferenceZone,
    pub report_limits: ReportLimits,
    pub model_registry_capacity: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            zone: ReferenceZone::from_offset_minutes(330).unwrap_or_else(ReferenceZone::utc),
            report_limits: ReportLimits::default(),
            model_registry_capacity: 1024,
        }
    }
}

/// Entry point for every read and mutation
#[derive(Clone)]
pub struct TelemetryService {
    store: Arc<dyn TelemetryStore>,
    broker: Arc<dyn SubscriptionBroker>,
    cache: CacheGateway,
    invalidation: InvalidationCoordinator,
    reports: ReportAggregator,
    predictor: TrendPredictor,
    zone: ReferenceZone,
}

impl TelemetryService {
    /// Wire the service over its collaborators
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        broker: Arc<dyn SubscriptionBroker>,
        cache: CacheGateway,
        options: ServiceOptions,
    ) -> Self {
        let registry = Arc::new(TrendModelRegistry::new(options.model_registry_capacity));
        Self {
            reports: ReportAggregator::new(
                store.clone(),
                cache.clone(),
                options.zone,
                options.report_limits,
            ),
            predictor: TrendPredictor::new(store.clone(), cache.clone(), registry),
            invalidation: InvalidationCoordinator::new(cache.clone()),
            store,
            broker,
            cache,
            zone: options.zone,
        }
    }

    /// Shared cache gateway
    pub fn cache(&self) -> &CacheGateway {
        &self.cache
    }

    /// Advisory trend model registry
    pub fn models(&self) -> &TrendModelRegistry {
        self.predictor.registry()
    }

    async fn cached<T, Fut>(&self, op: Operation, key: String, compute: Fut) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key).await {
            return Ok(hit);
        }
        let value = compute.await?;
        self.cache.set(&key, &value, op.ttl()).await;
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Topic metadata
    // -------------------------------------------------------------------------

    /// Every topic record
    pub async fn all_topic_labels(&self) -> Result<Vec<Topic>> {
        let key = self.cache.keys().bare(Operation::AllTopicLabels);
        self.cached(Operation::AllTopicLabels, key, async {
            self.store
                .find_topics(&TopicFilter::All)
                .await
                .map_err(Error::from)
        })
        .await
    }

    /// The record of one topic
    pub async fn topic_label(&self, topic: &str) -> Result<Topic> {
        let topic = required(topic, "Topic is required")?;
        let key = self.cache.key_for(Operation::TopicLabel, topic);
        if let Some(hit) = self.cache.get::<Topic>(&key).await {
            return Ok(hit);
        }

        let found = self
            .store
            .find_topics(&TopicFilter::Name(topic.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("Topic not found: {}", topic)))?;

        self.cache.set(&key, &found, Operation::TopicLabel.ttl()).await;
        Ok(found)
    }

    /// Change a topic's label by record id
    pub async fn update_topic_label(&self, id: &str, label: &str) -> Result<Topic> {
        let id = required(id, "Topic id is required")?;
        let label = required(label, "Updated label is required")?;

        let updated = self
            .store
            .update_topic_label(id, label)
            .await?
            .ok_or_else(|| Error::not_found(format!("Topic not found: {}", id)))?;

        self.invalidation
            .invalidate(&Mutation::LabelUpdated {
                topic: updated.topic.clone(),
            })
            .await;
        tracing::info!(topic = %updated.topic, label = %updated.label, "Topic label updated");
        Ok(updated)
    }

    /// Create a topic record
    pub async fn create_topic(&self, topic: &str, device: &str, label: &str) -> Result<Topic> {
        let topic = required(topic, "Topic, device and label are required")?;
        let device = required(device, "Topic, device and label are required")?;
        let label = required(label, "Topic, device and label are required")?;

        let created = match self.store.create_topic(topic, label, device).await {
            Ok(created) => created,
            Err(StoreError::Duplicate(_)) => {
                return Err(Error::validation(format!("Topic already exists: {}", topic)));
            }
            Err(e) => return Err(e.into()),
        };
        self.invalidation
            .invalidate(&Mutation::TopicCreated {
                topic: created.topic.clone(),
            })
            .await;
        tracing::info!(topic = %created.topic, device = %created.device, "Topic created");
        Ok(created)
    }

    /// Topic names, newest first
    pub async fn all_tag_names(&self) -> Result<Vec<String>> {
        let key = self.cache.keys().bare(Operation::AllTagNames);
        self.cached(Operation::AllTagNames, key, self.tag_names(None)).await
    }

    /// The most recently created topic names
    pub async fn recent_tag_names(&self) -> Result<Vec<String>> {
        let key = self.cache.keys().bare(Operation::RecentTagNames);
        self.cached(
            Operation::RecentTagNames,
            key,
            self.tag_names(Some(RECENT_TAG_NAMES)),
        )
        .await
    }

    async fn tag_names(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let topics = self.store.find_topics(&TopicFilter::All).await?;
        Ok(topics
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|t| t.topic)
            .collect())
    }

    /// Remove a topic with its readings and subscription
    ///
    /// Readings always go before the topic record.
    pub async fn delete_topic(&self, topic: &str) -> Result<DeleteOutcome> {
        let topic = required(topic, "Topic is required")?;

        let records = self
            .store
            .find_topics(&TopicFilter::Name(topic.to_string()))
            .await?;
        if records.is_empty() && self.store.count_readings(topic).await? == 0 {
            return Err(Error::not_found(format!("Topic not found: {}", topic)));
        }

        self.invalidation
            .invalidate(&Mutation::TopicDeleted {
                topic: topic.to_string(),
            })
            .await;
        self.broker.unsubscribe(topic).await?;
        let deleted_messages = self.store.delete_readings(topic).await?;
        self.store.delete_topic(topic).await?;

        tracing::info!(topic = %topic, deleted_messages, "Topic deleted");
        Ok(DeleteOutcome {
            topic: topic.to_string(),
            deleted_messages,
        })
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe one topic
    pub async fn subscribe(&self, topic: &str) -> Result<SubscribeOutcome> {
        let topic = required(topic, "Topic is required")?;
        let newly = self.broker.subscribe(topic).await?;
        if newly {
            self.invalidation.invalidate(&Mutation::SubscriptionsChanged).await;
            tracing::info!(topic = %topic, "Subscribed to topic");
        }
        Ok(SubscribeOutcome {
            topic: topic.to_string(),
            already_subscribed: !newly,
        })
    }

    /// Subscribe every known topic, returning the newly subscribed ones
    pub async fn subscribe_all(&self) -> Result<Vec<String>> {
        let mut known: BTreeSet<String> = self
            .store
            .distinct_topics_with_readings()
            .await?
            .into_iter()
            .collect();
        known.extend(
            self.store
                .find_topics(&TopicFilter::All)
                .await?
                .into_iter()
                .map(|t| t.topic),
        );

        let mut subscribed = Vec::new();
        for topic in known {
            if self.broker.subscribe(&topic).await? {
                subscribed.push(topic);
            }
        }

        if !subscribed.is_empty() {
            self.invalidation.invalidate(&Mutation::SubscriptionsChanged).await;
        }
        tracing::info!(count = subscribed.len(), "Subscribed to all topics");
        Ok(subscribed)
    }

    /// Unsubscribe every subscribed topic, returning them
    pub async fn unsubscribe_all(&self) -> Result<Vec<String>> {
        let topics = self.store.find_subscribed_topics().await?;
        for topic in &topics {
            self.broker.unsubscribe(topic).await?;
        }

        if !topics.is_empty() {
            self.invalidation.invalidate(&Mutation::SubscriptionsChanged).await;
        }
        tracing::info!(count = topics.len(), "Unsubscribed from all topics");
        Ok(topics)
    }

    /// Topics currently receiving live readings
    pub async fn subscribed_topics(&self) -> Result<Vec<String>> {
        let key = self.cache.keys().bare(Operation::SubscribedTopics);
        self.cached(Operation::SubscribedTopics, key, async {
            self.store.find_subscribed_topics().await.map_err(Error::from)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Raw readings
    // -------------------------------------------------------------------------

    /// Latest live message plus stored count
    pub async fn messages(&self, topic: &str) -> Result<MessagesSummary> {
        let topic = required(topic, "Topic is required")?;
        if !self.topic_exists(topic).await? {
            return Err(Error::not_found(format!("Topic not found: {}", topic)));
        }

        let key = self.cache.key_for(Operation::MessageCount, topic);
        let total_messages = self
            .cached(Operation::MessageCount, key, async {
                self.store.count_readings(topic).await.map_err(Error::from)
            })
            .await?;
        let latest = self.broker.latest_live_message(topic).await?;

        Ok(MessagesSummary {
            topic: topic.to_string(),
            latest,
            total_messages,
        })
    }

    /// Whether a topic has a record or readings; only positive answers are cached
    async fn topic_exists(&self, topic: &str) -> Result<bool> {
        let key = self.cache.key_for(Operation::TopicExists, topic);
        if let Some(true) = self.cache.get::<bool>(&key).await {
            return Ok(true);
        }

        let exists = !self
            .store
            .find_topics(&TopicFilter::Name(topic.to_string()))
            .await?
            .is_empty()
            || self.store.count_readings(topic).await? > 0;
        if exists {
            self.cache.set(&key, &true, Operation::TopicExists.ttl()).await;
        }
        Ok(exists)
    }

    /// Readings of the last two hours, oldest first
    pub async fn realtime_last_two_hours(&self, topic: &str) -> Result<Vec<MessageView>> {
        let topic = required(topic, "Topic is required")?;
        let key = self.cache.key_for(Operation::Realtime, topic);
        self.cached(
            Operation::Realtime,
            key,
            self.message_views(topic, TimeRange::last(Duration::hours(2))),
        )
        .await
    }

    /// Readings within explicit bounds, oldest first
    pub async fn realtime_range(
        &self,
        topic: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<MessageView>> {
        let topic = required(topic, "Topic is required")?;
        let start_raw = required(start, "startTime and endTime are required")?;
        let end_raw = required(end, "startTime and endTime are required")?;

        let start = self
            .zone
            .parse_instant(start_raw, DayBound::Start)
            .ok_or_else(|| Error::validation(format!("Invalid startTime: {}", start_raw)))?;
        let end = self
            .zone
            .parse_instant(end_raw, DayBound::End)
            .ok_or_else(|| Error::validation(format!("Invalid endTime: {}", end_raw)))?;
        if start > end {
            return Err(Error::validation("startTime must not be after endTime"));
        }

        let key = self.cache.key_for(
            Operation::RealtimeRange,
            &RangeKey {
                topic,
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            },
        );
        self.cached(
            Operation::RealtimeRange,
            key,
            self.message_views(topic, TimeRange::new(start, end)),
        )
        .await
    }

    async fn message_views(&self, topic: &str, range: TimeRange) -> Result<Vec<MessageView>> {
        let readings = self
            .store
            .find_readings(topic, range, SortOrder::Ascending, None)
            .await?;
        Ok(readings.iter().map(MessageView::from).collect())
    }

    // -------------------------------------------------------------------------
    // Reports and predictions
    // -------------------------------------------------------------------------

    /// Paginated multi-topic report
    pub async fn report(&self, request: &ReportRequest) -> Result<ReportPage> {
        self.reports.generate(request).await
    }

    /// Trend forecast for a topic
    pub async fn predict(&self, topic: &str, query: &PredictionQuery) -> Result<PredictionResult> {
        self.predictor.predict(topic, query).await
    }
}

fn required<'a>(value: &'a str, message: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(Error::validation(message))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyBuilder, MemoryBackend};
    use crate::store::{LocalBroker, MemoryStore};
    use chrono::Utc;

    struct Fixture {
        store: Arc<MemoryStore>,
        broker: Arc<LocalBroker>,
        backend: Arc<MemoryBackend>,
        service: TelemetryService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(LocalBroker::new(store.clone()));
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheGateway::ready(backend.clone(), KeyBuilder::new("mqtt"));
        let service = TelemetryService::new(
            store.clone(),
            broker.clone(),
            cache,
            ServiceOptions::default(),
        );
        Fixture {
            store,
            broker,
            backend,
            service,
        }
    }

    #[tokio::test]
    async fn test_label_update_invalidates() {
        let f = fixture();
        let created = f.service.create_topic("T1", "dev-1", "Boiler").await.unwrap();

        assert_eq!(f.service.topic_label("T1").await.unwrap().label, "Boiler");
        assert_eq!(f.service.all_topic_labels().await.unwrap().len(), 1);
        assert!(f.backend.contains("mqtt:label:T1"));

        f.service.update_topic_label(&created.id, "Boiler north").await.unwrap();
        assert!(!f.backend.contains("mqtt:label:T1"));
        assert!(!f.backend.contains("mqtt:all-topics-labels:"));
        assert_eq!(f.service.topic_label("T1").await.unwrap().label, "Boiler north");
    }

    #[tokio::test]
    async fn test_create_topic_validation() {
        let f = fixture();
        assert!(matches!(
            f.service.create_topic("T1", "", "x").await,
            Err(Error::Validation(_))
        ));

        f.service.create_topic("T1", "d", "x").await.unwrap();
        assert!(matches!(
            f.service.create_topic("T1", "d", "y").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            f.service.update_topic_label("nope", "y").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(f.service.topic_label("T9").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_create_single_winner() {
        let f = fixture();
        let labels: Vec<String> = (0..8).map(|i| format!("l{}", i)).collect();
        let attempts = labels.iter().map(|label| f.service.create_topic("T1", "d", label));
        let outcomes = futures_util::future::join_all(attempts).await;

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        for outcome in outcomes.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                outcome,
                Err(Error::Validation(msg)) if msg.contains("already exists")
            ));
        }
        assert_eq!(f.store.find_topics(&TopicFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tag_names_follow_creation() {
        let f = fixture();
        for i in 0..7 {
            f.service
                .create_topic(&format!("T{}", i), "d", "l")
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let recent = f.service.recent_tag_names().await.unwrap();
        assert_eq!(recent, vec!["T6", "T5", "T4", "T3", "T2"]);
        assert_eq!(f.service.all_tag_names().await.unwrap().len(), 7);

        f.service.create_topic("T7", "d", "l").await.unwrap();
        assert_eq!(f.service.recent_tag_names().await.unwrap()[0], "T7");
        assert_eq!(f.service.all_tag_names().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_delete_topic_cascade() {
        let f = fixture();
        f.service.create_topic("T1", "d", "l").await.unwrap();
        f.service.subscribe("T1").await.unwrap();
        for i in 0..3 {
            f.store.record("T1", Utc::now() - Duration::minutes(i), "1");
        }
        assert_eq!(f.service.messages("T1").await.unwrap().total_messages, 3);

        let outcome = f.service.delete_topic("T1").await.unwrap();
        assert_eq!(outcome.deleted_messages, 3);
        assert!(!f.broker.is_subscribed("T1").await.unwrap());
        assert!(f.service.all_topic_labels().await.unwrap().is_empty());
        assert!(matches!(f.service.messages("T1").await, Err(Error::NotFound(_))));
        assert!(matches!(f.service.delete_topic("T1").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_subscriptions() {
        let f = fixture();
        f.store.record("A", Utc::now(), "1");
        f.service.create_topic("B", "d", "l").await.unwrap();

        let first = f.service.subscribe("A").await.unwrap();
        assert!(!first.already_subscribed);
        assert!(f.service.subscribe("A").await.unwrap().already_subscribed);
        assert_eq!(f.service.subscribed_topics().await.unwrap(), vec!["A"]);

        assert_eq!(f.service.subscribe_all().await.unwrap(), vec!["B"]);
        assert_eq!(f.service.subscribed_topics().await.unwrap(), vec!["A", "B"]);

        assert_eq!(f.service.unsubscribe_all().await.unwrap(), vec!["A", "B"]);
        assert!(f.service.subscribed_topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_latest() {
        let f = fixture();
        f.service.subscribe("T1").await.unwrap();
        f.broker.publish("T1", Utc::now(), "21.5");

        let summary = f.service.messages("T1").await.unwrap();
        assert_eq!(summary.latest.as_deref(), Some("21.5"));
        assert_eq!(summary.total_messages, 1);
        assert!(matches!(f.service.messages("").await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_realtime_reads() {
        let f = fixture();
        let now = Utc::now();
        f.store.record("T1", now - Duration::hours(3), "old");
        f.store.record("T1", now - Duration::minutes(30), "b");
        f.store.record("T1", now - Duration::minutes(90), "a");

        let recent = f.service.realtime_last_two_hours("T1").await.unwrap();
        let messages: Vec<_> = recent.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b"]);

        let start = (now - Duration::hours(4)).to_rfc3339();
        let end = (now - Duration::hours(1)).to_rfc3339();
        let ranged = f.service.realtime_range("T1", &start, &end).await.unwrap();
        let messages: Vec<_> = ranged.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(messages, vec!["old", "a"]);

        assert!(matches!(
            f.service.realtime_range("T1", &end, &start).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            f.service.realtime_range("T1", "yesterday", &end).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_store_errors_are_upstream() {
        let f = fixture();
        f.store.inject_failure(Some("down"));
        assert!(matches!(f.service.all_topic_labels().await, Err(Error::Upstream(_))));
        assert!(matches!(f.service.subscribe("T1").await, Err(Error::Upstream(_))));
    }
}

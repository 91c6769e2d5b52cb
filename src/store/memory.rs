//! In-process store and subscription broker

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{StoreResult, SubscriptionBroker, TelemetryStore};
use crate::error::StoreError;
use crate::types::{Reading, SortOrder, TimeRange, Topic, TopicFilter};

/// In-memory document store
///
/// Readings are kept sorted by timestamp per topic. A failure can be
/// injected to exercise the upstream-error paths of callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: RwLock<BTreeMap<String, Vec<Reading>>>,
    topics: RwLock<Vec<Topic>>,
    subscribed: RwLock<BTreeSet<String>>,
    failure: RwLock<Option<String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading (ingestion path)
    pub fn insert_reading(&self, reading: Reading) {
        let mut readings = self.readings.write();
        let series = readings.entry(reading.topic.clone()).or_default();
        let idx = series.partition_point(|r| r.timestamp <= reading.timestamp);
        series.insert(idx, reading);
    }

    /// Append a raw value for a topic at an instant
    pub fn record(&self, topic: &str, timestamp: DateTime<Utc>, raw_value: impl Into<String>) {
        self.insert_reading(Reading::new(topic, timestamp, raw_value));
    }

    /// Insert a fully formed topic record
    pub fn insert_topic(&self, topic: Topic) {
        self.topics.write().push(topic);
    }

    /// Make every subsequent call fail with the given message (or stop failing)
    pub fn inject_failure(&self, message: Option<&str>) {
        *self.failure.write() = message.map(str::to_string);
    }

    fn check(&self) -> StoreResult<()> {
        match self.failure.read().as_ref() {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn set_subscribed(&self, topic: &str, subscribed: bool) -> StoreResult<bool> {
        self.check()?;
        let mut set = self.subscribed.write();
        Ok(if subscribed {
            set.insert(topic.to_string())
        } else {
            set.remove(topic)
        })
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn find_readings(
        &self,
        topic: &str,
        range: TimeRange,
        order: SortOrder,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Reading>> {
        self.check()?;
        let readings = self.readings.read();
        let Some(series) = readings.get(topic) else {
            return Ok(Vec::new());
        };

        let in_range = series.iter().filter(|r| range.contains(&r.timestamp));
        let limit = limit.unwrap_or(usize::MAX);
        Ok(match order {
            SortOrder::Ascending => in_range.take(limit).cloned().collect(),
            SortOrder::Descending => {
                let mut out: Vec<Reading> = in_range.cloned().collect();
                out.reverse();
                out.truncate(limit);
                out
            }
        })
    }

    async fn count_readings(&self, topic: &str) -> StoreResult<u64> {
        self.check()?;
        Ok(self
            .readings
            .read()
            .get(topic)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn distinct_topics_with_readings(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self
            .readings
            .read()
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(t, _)| t.clone())
            .collect())
    }

    async fn delete_readings(&self, topic: &str) -> StoreResult<u64> {
        self.check()?;
        Ok(self
            .readings
            .write()
            .remove(topic)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn find_topics(&self, filter: &TopicFilter) -> StoreResult<Vec<Topic>> {
        self.check()?;
        let mut found: Vec<Topic> = self
            .topics
            .read()
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn create_topic(&self, topic: &str, label: &str, device: &str) -> StoreResult<Topic> {
        self.check()?;
        let mut topics = self.topics.write();
        if topics.iter().any(|t| t.topic == topic) {
            return Err(StoreError::Duplicate(topic.to_string()));
        }
        let record = Topic::new(topic, device, label);
        topics.push(record.clone());
        Ok(record)
    }

    async fn update_topic_label(&self, id: &str, label: &str) -> StoreResult<Option<Topic>> {
        self.check()?;
        let mut topics = self.topics.write();
        Ok(topics.iter_mut().find(|t| t.id == id).map(|t| {
            t.label = label.to_string();
            t.clone()
        }))
    }

    async fn delete_topic(&self, topic: &str) -> StoreResult<bool> {
        self.check()?;
        let mut topics = self.topics.write();
        let before = topics.len();
        topics.retain(|t| t.topic != topic);
        Ok(topics.len() != before)
    }

    async fn find_subscribed_topics(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self.subscribed.read().iter().cloned().collect())
    }
}

/// In-process subscription broker
///
/// Persists subscriptions into the store's subscribed-topic set and keeps the
/// latest payload per topic, the way the ingestion collaborator does.
#[derive(Debug)]
pub struct LocalBroker {
    store: Arc<MemoryStore>,
    latest: RwLock<HashMap<String, String>>,
}

impl LocalBroker {
    /// Create a broker writing through to the store
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Deliver a live payload: stored as a reading, kept as latest when subscribed
    pub fn publish(&self, topic: &str, timestamp: DateTime<Utc>, payload: &str) {
        self.store.record(topic, timestamp, payload);
        if self.store.subscribed.read().contains(topic) {
            self.latest
                .write()
                .insert(topic.to_string(), payload.to_string());
        }
    }
}

#[async_trait]
impl SubscriptionBroker for LocalBroker {
    async fn subscribe(&self, topic: &str) -> StoreResult<bool> {
        self.store.set_subscribed(topic, true)
    }

    async fn unsubscribe(&self, topic: &str) -> StoreResult<bool> {
        let removed = self.store.set_subscribed(topic, false)?;
        self.latest.write().remove(topic);
        Ok(removed)
    }

    async fn is_subscribed(&self, topic: &str) -> StoreResult<bool> {
        self.store.check()?;
        Ok(self.store.subscribed.read().contains(topic))
    }

    async fn latest_live_message(&self, topic: &str) -> StoreResult<Option<String>> {
        self.store.check()?;
        Ok(self.latest.read().get(topic).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.record("T1", ts("2024-01-01T12:00:00Z"), "3");
        store.record("T1", ts("2024-01-01T10:00:00Z"), "1");
        store.record("T1", ts("2024-01-01T11:00:00Z"), "2");
        store.record("T2", ts("2024-01-01T11:00:00Z"), "9");
        store
    }

    fn whole_day() -> TimeRange {
        TimeRange::new(ts("2024-01-01T00:00:00Z"), ts("2024-01-01T23:59:59Z"))
    }

    #[tokio::test]
    async fn test_find_readings_ordering_and_limit() {
        let store = seeded();

        let asc = store
            .find_readings("T1", whole_day(), SortOrder::Ascending, None)
            .await
            .unwrap();
        let values: Vec<_> = asc.iter().map(|r| r.raw_value.as_str()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);

        let desc = store
            .find_readings("T1", whole_day(), SortOrder::Descending, Some(2))
            .await
            .unwrap();
        let values: Vec<_> = desc.iter().map(|r| r.raw_value.as_str()).collect();
        assert_eq!(values, vec!["3", "2"]);

        let narrow = TimeRange::new(ts("2024-01-01T10:30:00Z"), ts("2024-01-01T11:00:00Z"));
        let found = store
            .find_readings("T1", narrow, SortOrder::Ascending, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_counts_and_deletion() {
        let store = seeded();
        assert_eq!(store.count_readings("T1").await.unwrap(), 3);
        assert_eq!(
            store.distinct_topics_with_readings().await.unwrap(),
            vec!["T1".to_string(), "T2".to_string()]
        );

        assert_eq!(store.delete_readings("T1").await.unwrap(), 3);
        assert_eq!(store.count_readings("T1").await.unwrap(), 0);
        assert_eq!(store.delete_readings("T1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_topic_records() {
        let store = MemoryStore::new();
        let created = store.create_topic("T1", "Boiler", "dev-1").await.unwrap();
        assert!(matches!(
            store.create_topic("T1", "Again", "dev-1").await,
            Err(StoreError::Duplicate(name)) if name == "T1"
        ));

        let updated = store
            .update_topic_label(&created.id, "Boiler (north)")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.label, "Boiler (north)");
        assert!(store.update_topic_label("missing", "x").await.unwrap().is_none());

        let found = store
            .find_topics(&TopicFilter::Name("T1".to_string()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert!(store.delete_topic("T1").await.unwrap());
        assert!(!store.delete_topic("T1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_topics_newest_first() {
        let store = MemoryStore::new();
        let mut older = Topic::new("old", "d", "l");
        older.created_at = Utc::now() - Duration::hours(1);
        store.insert_topic(older);
        store.insert_topic(Topic::new("new", "d", "l"));

        let names: Vec<_> = store
            .find_topics(&TopicFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.topic)
            .collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = seeded();
        store.inject_failure(Some("connection reset"));
        let err = store.count_readings("T1").await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));

        store.inject_failure(None);
        assert!(store.count_readings("T1").await.is_ok());
    }

    #[tokio::test]
    async fn test_broker_subscriptions() {
        let store = Arc::new(MemoryStore::new());
        let broker = LocalBroker::new(store.clone());

        assert!(broker.subscribe("T1").await.unwrap());
        assert!(!broker.subscribe("T1").await.unwrap());
        assert!(broker.is_subscribed("T1").await.unwrap());
        assert_eq!(store.find_subscribed_topics().await.unwrap(), vec!["T1"]);

        broker.publish("T1", Utc::now(), "21.5");
        broker.publish("T2", Utc::now(), "7");
        assert_eq!(broker.latest_live_message("T1").await.unwrap().as_deref(), Some("21.5"));
        assert_eq!(broker.latest_live_message("T2").await.unwrap(), None);
        assert_eq!(store.count_readings("T2").await.unwrap(), 1);

        assert!(broker.unsubscribe("T1").await.unwrap());
        assert_eq!(broker.latest_live_message("T1").await.unwrap(), None);
        assert!(store.find_subscribed_topics().await.unwrap().is_empty());
    }
}

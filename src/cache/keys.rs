//! Deterministic cache keys and TTL tiers
//!
//! Every cached read goes through [`KeyBuilder::key`], so two logically
//! identical queries always resolve to the same entry and the invalidation
//! map can rebuild any key it needs to delete.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Expiration class applied by operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlTier {
    /// Raw reading windows, realtime and prediction results
    Short,
    /// Subscribed-topic lists and reports
    Medium,
    /// Topic metadata, existence checks and per-topic counts
    Long,
}

impl TtlTier {
    /// Tier length in seconds
    pub const fn seconds(self) -> u64 {
        match self {
            TtlTier::Short => 300,
            TtlTier::Medium => 1_800,
            TtlTier::Long => 3_600,
        }
    }

    /// Tier length as a duration
    pub const fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }
}

/// Every cached read operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AllTopicLabels,
    TopicLabel,
    AllTagNames,
    RecentTagNames,
    TopicExists,
    MessageCount,
    SubscribedTopics,
    Report,
    Readings,
    Realtime,
    RealtimeRange,
    Prediction,
}

impl Operation {
    /// Stable name used inside the key
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::AllTopicLabels => "all-topics-labels",
            Operation::TopicLabel => "label",
            Operation::AllTagNames => "all-tagnames",
            Operation::RecentTagNames => "recent-5-tagnames",
            Operation::TopicExists => "topic-exists",
            Operation::MessageCount => "message-count",
            Operation::SubscribedTopics => "subscribed-topics",
            Operation::Report => "report",
            Operation::Readings => "messages",
            Operation::Realtime => "realtime-last-2-hours",
            Operation::RealtimeRange => "realtime-range",
            Operation::Prediction => "prediction",
        }
    }

    /// TTL tier this operation's results are cached under
    pub const fn ttl(self) -> TtlTier {
        match self {
            Operation::AllTopicLabels
            | Operation::TopicLabel
            | Operation::AllTagNames
            | Operation::RecentTagNames
            | Operation::TopicExists
            | Operation::MessageCount => TtlTier::Long,
            Operation::SubscribedTopics | Operation::Report => TtlTier::Medium,
            Operation::Readings
            | Operation::Realtime
            | Operation::RealtimeRange
            | Operation::Prediction => TtlTier::Short,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds `prefix:operation:canonical(params)` keys
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    /// Create a key builder with the given namespace prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Namespace prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key for an operation and its parameters
    pub fn key<P: Serialize + ?Sized>(&self, op: Operation, params: &P) -> String {
        format!("{}:{}:{}", self.prefix, op.as_str(), canonicalize(params))
    }

    /// Key for an operation without parameters
    pub fn bare(&self, op: Operation) -> String {
        self.key(op, &())
    }
}

/// Produce a stable string for any parameter object.
///
/// Strings render raw, unit renders empty, everything else renders as
/// compact JSON with object keys sorted at every depth.
pub fn canonicalize<P: Serialize + ?Sized>(params: &P) -> String {
    match serde_json::to_value(params) {
        Ok(Value::Null) => String::new(),
        Ok(Value::String(s)) => s,
        Ok(value) => {
            let mut out = String::new();
            write_canonical(&value, &mut out);
            out
        }
        // maps with non-string keys
        Err(_) => String::new(),
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_ttl_tiers() {
        assert_eq!(TtlTier::Short.seconds(), 300);
        assert_eq!(TtlTier::Medium.seconds(), 1_800);
        assert_eq!(TtlTier::Long.seconds(), 3_600);

        assert_eq!(Operation::Readings.ttl(), TtlTier::Short);
        assert_eq!(Operation::Prediction.ttl(), TtlTier::Short);
        assert_eq!(Operation::Report.ttl(), TtlTier::Medium);
        assert_eq!(Operation::SubscribedTopics.ttl(), TtlTier::Medium);
        assert_eq!(Operation::TopicExists.ttl(), TtlTier::Long);
        assert_eq!(Operation::MessageCount.ttl(), TtlTier::Long);
    }

    #[test]
    fn test_key_shape() {
        let keys = KeyBuilder::new("mqtt");
        assert_eq!(keys.bare(Operation::AllTopicLabels), "mqtt:all-topics-labels:");
        assert_eq!(keys.key(Operation::TopicLabel, "plant/temp"), "mqtt:label:plant/temp");
        assert_eq!(
            keys.key(Operation::Readings, &json!({"topic": "T1", "from": 1})),
            r#"mqtt:messages:{"from":1,"topic":"T1"}"#
        );
    }

    #[test]
    fn test_canonical_key_order_independent() {
        let mut a = HashMap::new();
        a.insert("zeta", json!({"b": 2, "a": [1, {"y": 1, "x": 2}]}));
        a.insert("alpha", json!("x"));

        let b = json!({
            "alpha": "x",
            "zeta": {"a": [1, {"x": 2, "y": 1}], "b": 2}
        });

        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(canonicalize(&b), r#"{"alpha":"x","zeta":{"a":[1,{"x":2,"y":1}],"b":2}}"#);
    }

    #[test]
    fn test_canonical_escapes_keys() {
        let params = json!({"we\"ird": 1});
        assert_eq!(canonicalize(&params), r#"{"we\"ird":1}"#);
    }
}

//! Request fragment constructors and nested-path bindings.
//!
//! Fragments are plain JSON values in the engine's aggregation dialect.
//! Every constructor returns a fresh value; nothing here mutates a fragment
//! that someone else holds.

use serde_json::{Map, Value, json};

/// One-to-many sub-collections of a tender document, stored as nested
/// documents by the engine.
pub const NESTED_PATHS: &[&str] = &[
    "buyers",
    "lots",
    "lots.bids",
    "lots.bids.bidders",
    "indicators",
    "ot.scores",
];

/// Where a document field lives relative to the nested sub-collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedPathBinding {
    pub field: String,
    /// Enclosing nested collections, outermost first.
    pub chain: Vec<&'static str>,
}

impl NestedPathBinding {
    pub fn of(field: &str) -> Self {
        let mut chain: Vec<&'static str> = NESTED_PATHS
            .iter()
            .copied()
            .filter(|path| {
                field
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('.'))
            })
            .collect();
        chain.sort_by_key(|path| path.len());
        Self {
            field: field.to_string(),
            chain,
        }
    }

    /// Innermost nested collection, if any.
    pub fn path(&self) -> Option<&'static str> {
        self.chain.last().copied()
    }

    pub fn is_nested(&self) -> bool {
        !self.chain.is_empty()
    }

    /// Wrap a query predicate in `nested` queries down to the field's level.
    pub fn wrap_query(&self, predicate: Value) -> Value {
        self.chain.iter().rev().fold(predicate, |query, path| {
            json!({"nested": {"path": path, "query": query}})
        })
    }

    /// Wrap a leaf aggregation named `leaf_name` in `nested` aggregations
    /// down to the field's level. Intermediate levels are named after the
    /// last segment of their path (`lots.bids` → `bids`).
    ///
    /// Without nesting the leaf itself is returned.
    pub fn wrap_aggregation(&self, leaf_name: &str, leaf: Value) -> Value {
        let mut node = leaf;
        let mut name = leaf_name.to_string();
        for path in self.chain.iter().rev() {
            node = with_aggs(nested(path), [(name.as_str(), node)]);
            name = level_name(path).to_string();
        }
        node
    }

    /// Follow the names laid out by [`wrap_aggregation`](Self::wrap_aggregation)
    /// through an answer.
    pub fn descend<'a>(&self, answer: &'a Value, leaf_name: &str) -> Option<&'a Value> {
        if self.chain.is_empty() {
            return Some(answer);
        }
        let mut node = answer;
        for path in self.chain.iter().skip(1) {
            node = node.get(level_name(path))?;
        }
        node.get(leaf_name)
    }
}

/// Aggregation name used for an intermediate nesting level.
pub fn level_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

pub fn nested(path: &str) -> Value {
    json!({"nested": {"path": path}})
}

pub fn reverse_nested(path: Option<&str>) -> Value {
    match path {
        Some(path) => json!({"reverse_nested": {"path": path}}),
        None => json!({"reverse_nested": {}}),
    }
}

pub fn terms(field: &str, size: usize) -> Value {
    json!({"terms": {"field": field, "size": size}})
}

pub fn sum(field: &str) -> Value {
    json!({"sum": {"field": field}})
}

pub fn avg(field: &str) -> Value {
    json!({"avg": {"field": field}})
}

pub fn value_count(field: &str) -> Value {
    json!({"value_count": {"field": field}})
}

pub fn histogram(field: &str, interval: f64) -> Value {
    json!({"histogram": {"field": field, "interval": interval, "min_doc_count": 1}})
}

pub fn year_histogram(field: &str) -> Value {
    json!({
        "date_histogram": {
            "field": field,
            "calendar_interval": "year",
            "format": "yyyy",
            "min_doc_count": 1
        }
    })
}

pub fn filter(predicate: Value) -> Value {
    json!({"filter": predicate})
}

/// Attach sub-aggregations, replacing any the node already had.
pub fn with_aggs<'a>(mut node: Value, aggs: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let aggs: Map<String, Value> = aggs
        .into_iter()
        .map(|(name, agg)| (name.to_string(), agg))
        .collect();
    if let Value::Object(map) = &mut node {
        map.insert("aggs".to_string(), Value::Object(aggs));
    }
    node
}

/// Nested path declared by an aggregation node, if it is a `nested` node.
pub fn declared_nested_path(node: &Value) -> Option<&str> {
    node.get("nested")?.get("path")?.as_str()
}

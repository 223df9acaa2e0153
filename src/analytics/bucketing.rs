//! Reading buckets and metric values out of engine answers.
//!
//! Bucket keys arrive as strings (terms), numbers (histograms) or epoch
//! millis with a formatted `key_as_string` (date histograms). Everything is
//! normalized to a string key here so statistics maps stay uniform.

use serde_json::Value;

use super::types::{AggregationError, AggregationResult};

/// Buckets of a bucketing aggregation answer.
pub fn buckets(node: &Value) -> AggregationResult<&[Value]> {
    node.get("buckets")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| AggregationError::malformed("expected a 'buckets' array"))
}

/// Printable key of a bucket, preferring the engine's formatted key.
pub fn bucket_key(bucket: &Value) -> AggregationResult<String> {
    if let Some(formatted) = bucket.get("key_as_string").and_then(Value::as_str) {
        return Ok(formatted.to_string());
    }
    match bucket.get("key") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Number(n)) => Ok(match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        _ => Err(AggregationError::malformed("bucket without a key")),
    }
}

/// `doc_count` of a bucket or single-bucket aggregation.
pub fn doc_count(node: &Value) -> AggregationResult<u64> {
    node.get("doc_count")
        .and_then(Value::as_u64)
        .ok_or_else(|| AggregationError::malformed("expected a 'doc_count'"))
}

/// `value` of a metric aggregation. `null` is a valid answer (no documents).
pub fn metric_value(node: &Value) -> AggregationResult<Option<f64>> {
    match node.get("value") {
        Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| AggregationError::malformed("metric 'value' is not a number")),
        None => Err(AggregationError::malformed("expected a metric 'value'")),
    }
}

/// Named child of an answer node.
pub fn child<'a>(node: &'a Value, name: &str) -> AggregationResult<&'a Value> {
    node.get(name)
        .ok_or_else(|| AggregationError::malformed(format!("missing sub-aggregation '{name}'")))
}

/// Total hit count, in either the object or the legacy integer form.
pub fn total_hits(response: &Value) -> Option<u64> {
    let total = response.get("hits")?.get("total")?;
    total
        .as_u64()
        .or_else(|| total.get("value").and_then(Value::as_u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_normalized_to_strings() {
        assert_eq!(bucket_key(&json!({"key": "45"})).unwrap(), "45");
        assert_eq!(bucket_key(&json!({"key": 3.0})).unwrap(), "3");
        assert_eq!(bucket_key(&json!({"key": 2.5})).unwrap(), "2.5");
        assert_eq!(
            bucket_key(&json!({"key": 1_388_534_400_000_i64, "key_as_string": "2014"})).unwrap(),
            "2014"
        );
        assert!(bucket_key(&json!({"doc_count": 1})).is_err());
    }

    #[test]
    fn metric_value_accepts_null() {
        assert_eq!(metric_value(&json!({"value": null})).unwrap(), None);
        assert_eq!(metric_value(&json!({"value": 4})).unwrap(), Some(4.0));
        assert!(metric_value(&json!({"value": "4"})).is_err());
        assert!(metric_value(&json!({})).is_err());
    }

    #[test]
    fn total_hits_reads_both_forms() {
        assert_eq!(total_hits(&json!({"hits": {"total": 12}})), Some(12));
        assert_eq!(total_hits(&json!({"hits": {"total": {"value": 7, "relation": "eq"}}})), Some(7));
        assert_eq!(total_hits(&json!({})), None);
    }

    #[test]
    fn missing_buckets_is_malformed() {
        let err = buckets(&json!({"value": 1})).unwrap_err();
        assert!(matches!(err, AggregationError::MalformedAnswer { .. }));
    }
}

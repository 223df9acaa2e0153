//! Turning the engine's aggregation answer into flat statistics.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::catalog::AggregationSpec;
use super::inject::{Scope, WrapPoint};
use super::types::{
    AggregationError, AggregationParams, AggregationResult, ParseContext, StatValue, Statistics,
};

/// One entry of a compiled composite request, as the normalizer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledEntry {
    pub id: String,
    pub spec: AggregationSpec,
    pub params: Option<AggregationParams>,
}

/// Locates each entry's sub-answer, undoing filter injection, and parses it.
#[derive(Debug, Clone, Copy)]
pub struct ResultNormalizer<'s> {
    scopes: Option<&'s BTreeMap<String, Scope>>,
}

impl<'s> ResultNormalizer<'s> {
    /// Normalizer for a request that went through the injector.
    pub fn new(scopes: &'s BTreeMap<String, Scope>) -> Self {
        Self {
            scopes: Some(scopes),
        }
    }

    /// Normalizer for a request that was sent as compiled.
    pub fn plain() -> Self {
        Self { scopes: None }
    }

    fn scope(&self, id: &str) -> &Scope {
        static PLAIN: Scope = Scope::Plain;
        self.scopes.and_then(|s| s.get(id)).unwrap_or(&PLAIN)
    }

    /// Sub-answer for `id`, looking the same whether or not it was wrapped.
    ///
    /// `None` when the answer has no entry for `id`.
    pub fn locate<'a>(
        &self,
        answer: &'a Value,
        id: &str,
    ) -> AggregationResult<Option<Cow<'a, Value>>> {
        let Some(node) = answer.get(id) else {
            return Ok(None);
        };
        let points = self.scope(id).wrap_points();
        if points.is_empty() {
            return Ok(Some(Cow::Borrowed(node)));
        }
        let mut owned = node.clone();
        for point in points {
            collapse(&mut owned, &point.path, point)
                .map_err(|e| e.for_aggregation(id))?;
        }
        Ok(Some(Cow::Owned(owned)))
    }

    /// Parse every entry. Entries absent from the answer map to `Null`.
    pub fn parse_all(
        &self,
        answer: &Value,
        entries: &[CompiledEntry],
        ctx: &ParseContext,
    ) -> AggregationResult<Statistics> {
        if !answer.is_object() {
            return Err(AggregationError::MalformedAnswer {
                id: "aggregations".into(),
                reason: "answer is not an object".into(),
            });
        }
        let mut stats = BTreeMap::new();
        for entry in entries {
            let value = match self.locate(answer, &entry.id)? {
                Some(node) => entry
                    .spec
                    .parse(&node, entry.params.as_ref(), ctx)
                    .map_err(|e| e.for_aggregation(&entry.id))?,
                None => {
                    debug!(aggregation = %entry.id, "no answer for aggregation");
                    StatValue::Null
                }
            };
            stats.insert(entry.id.clone(), value);
        }
        Ok(stats)
    }
}

/// Merge the synthetic filter node at `path` into its parent.
///
/// Bucketing aggregations between two names are crossed by applying the
/// rest of the path to every bucket.
fn collapse(node: &mut Value, path: &[String], point: &WrapPoint) -> AggregationResult<()> {
    let Some((step, rest)) = path.split_first() else {
        return unwrap_filter(node, &point.filter_key);
    };
    if let Some(child) = node.get_mut(step.as_str()) {
        return collapse(child, rest, point);
    }
    match node.get_mut("buckets") {
        Some(Value::Array(buckets)) => buckets
            .iter_mut()
            .try_for_each(|bucket| collapse(bucket, path, point)),
        Some(Value::Object(keyed)) => keyed
            .values_mut()
            .try_for_each(|bucket| collapse(bucket, path, point)),
        _ => Err(AggregationError::malformed(format!(
            "missing sub-aggregation '{step}'"
        ))),
    }
}

fn unwrap_filter(node: &mut Value, key: &str) -> AggregationResult<()> {
    let Value::Object(map) = node else {
        return Err(AggregationError::malformed("expected an object"));
    };
    let wrapper = match map.remove(key) {
        Some(Value::Object(wrapper)) => wrapper,
        _ => {
            return Err(AggregationError::malformed(format!(
                "missing filter node '{key}'"
            )));
        }
    };
    merge_over(map, wrapper);
    Ok(())
}

/// Filtered counts and sub-answers replace the unfiltered ones.
fn merge_over(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrapped(path: &[&str], key: &str) -> BTreeMap<String, Scope> {
        let mut scopes = BTreeMap::new();
        scopes.insert(
            "regions".to_string(),
            Scope::Wrapped(vec![WrapPoint {
                path: path.iter().map(|s| s.to_string()).collect(),
                filter_key: key.into(),
            }]),
        );
        scopes
    }

    #[test]
    fn locate_on_wrapped_answer_matches_plain_answer() {
        let plain = json!({"regions": {"doc_count": 3, "top": {"buckets": [{"key": "CZ01", "doc_count": 3}]}}});
        let wrapped_answer = json!({"regions": {
            "doc_count": 9,
            "regions_filter": {"doc_count": 3, "top": {"buckets": [{"key": "CZ01", "doc_count": 3}]}}
        }});
        let scopes = wrapped(&[], "regions_filter");
        let a = ResultNormalizer::new(&scopes).locate(&wrapped_answer, "regions").unwrap();
        let b = ResultNormalizer::plain().locate(&plain, "regions").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn collapse_crosses_buckets() {
        let answer = json!({"regions": {"buckets": [
            {"key": "2014", "scores": {"doc_count": 5, "scores_filter": {"doc_count": 2}}},
            {"key": "2015", "scores": {"doc_count": 1, "scores_filter": {"doc_count": 0}}}
        ]}});
        let scopes = wrapped(&["scores"], "scores_filter");
        let located = ResultNormalizer::new(&scopes)
            .locate(&answer, "regions")
            .unwrap()
            .unwrap();
        assert_eq!(located["buckets"][0]["scores"], json!({"doc_count": 2}));
        assert_eq!(located["buckets"][1]["scores"], json!({"doc_count": 0}));
    }

    #[test]
    fn missing_wrapper_is_malformed() {
        let answer = json!({"regions": {"doc_count": 3}});
        let scopes = wrapped(&[], "regions_filter");
        let err = ResultNormalizer::new(&scopes)
            .locate(&answer, "regions")
            .unwrap_err();
        assert!(matches!(
            err,
            AggregationError::MalformedAnswer { ref id, .. } if id == "regions"
        ));
    }

    #[test]
    fn absent_id_locates_nothing() {
        let answer = json!({});
        assert!(ResultNormalizer::plain().locate(&answer, "x").unwrap().is_none());
    }
}

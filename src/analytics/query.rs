//! Statistics queries against the search engine.
//!
//! A [`StatsQuery`] pairs the main query's filters with a compiled set of
//! aggregations. It builds the request envelope, sends it through a
//! [`SearchBackend`] in a single round trip and normalizes the answer.

use anyhow::Context;
use serde_json::{Value, json};
use tracing::debug;

use super::bucketing::total_hits;
use super::compile::{AggregationCompiler, CompiledAggregations};
use super::filters::{QueryFilter, build_query};
use super::types::{AggregationError, AggregationRef, AggregationResult, ParseContext, Statistics};

/// The external document-search engine.
pub trait SearchBackend {
    /// Run one search request body against `index` and return the raw answer.
    fn search(&self, index: &str, body: &Value) -> anyhow::Result<Value>;
}

impl<F> SearchBackend for F
where
    F: Fn(&str, &Value) -> anyhow::Result<Value>,
{
    fn search(&self, index: &str, body: &Value) -> anyhow::Result<Value> {
        self(index, body)
    }
}

/// A statistics-only search: filters, no hits, injected aggregations.
#[derive(Debug, Clone)]
pub struct StatsQuery {
    filters: Vec<QueryFilter>,
    aggregations: CompiledAggregations,
}

impl StatsQuery {
    /// Compile `refs` with `compiler` and scope `filters` into them.
    pub fn new(
        compiler: &AggregationCompiler<'_>,
        refs: &[AggregationRef],
        filters: Vec<QueryFilter>,
    ) -> AggregationResult<Self> {
        let aggregations = compiler.compile(refs)?.with_filters(&filters)?;
        Ok(Self {
            filters,
            aggregations,
        })
    }

    pub fn aggregations(&self) -> &CompiledAggregations {
        &self.aggregations
    }

    pub fn filters(&self) -> &[QueryFilter] {
        &self.filters
    }

    /// Complete request body.
    pub fn body(&self) -> AggregationResult<Value> {
        Ok(json!({
            "query": build_query(&self.filters)?,
            "size": 0,
            "track_total_hits": true,
            "aggs": self.aggregations.to_value(),
        }))
    }

    /// Normalize a raw engine response.
    ///
    /// `ctx.total_hits` is filled from the response when the caller left it
    /// unset. A well-formed response without aggregations parses every id to
    /// `null`; a non-object response or an engine error body is malformed.
    pub fn normalize(&self, response: &Value, ctx: &ParseContext) -> AggregationResult<Statistics> {
        let Some(body) = response.as_object() else {
            return Err(AggregationError::malformed("not an object").for_aggregation("response"));
        };
        if let Some(error) = body.get("error") {
            let reason = error
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| format!("engine error: {kind}"))
                .unwrap_or_else(|| format!("engine error: {error}"));
            return Err(AggregationError::malformed(reason).for_aggregation("response"));
        }
        let mut ctx = ctx.clone();
        if ctx.total_hits.is_none() {
            ctx.total_hits = total_hits(response);
        }
        let empty = json!({});
        let answer = match response.get("aggregations") {
            Some(aggs @ Value::Object(_)) => aggs,
            Some(_) => {
                return Err(AggregationError::MalformedAnswer {
                    id: "aggregations".into(),
                    reason: "not an object".into(),
                });
            }
            None => &empty,
        };
        self.aggregations.parse(answer, &ctx)
    }

    /// Send the query and normalize the answer.
    pub fn run<B: SearchBackend + ?Sized>(
        &self,
        backend: &B,
        index: &str,
        ctx: &ParseContext,
    ) -> anyhow::Result<Statistics> {
        let body = self.body()?;
        debug!(index, aggregations = self.aggregations.len(), "sending stats query");
        let response = backend
            .search(index, &body)
            .with_context(|| format!("search on index '{index}' failed"))?;
        Ok(self.normalize(&response, ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::StatValue;
    use std::cell::Cell;

    fn refs(ids: &[&str]) -> Vec<AggregationRef> {
        ids.iter().map(|id| AggregationRef::plain(*id)).collect()
    }

    #[test]
    fn body_carries_query_and_aggregations() {
        let query = StatsQuery::new(
            &AggregationCompiler::default(),
            &refs(&["count", "sum_price"]),
            vec![QueryFilter::term("country", ["CZ"])],
        )
        .unwrap();
        let body = query.body().unwrap();
        assert_eq!(body["size"], 0);
        assert_eq!(body["query"]["bool"]["filter"][0], json!({"term": {"country": "CZ"}}));
        assert_eq!(body["aggs"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn run_makes_one_round_trip() {
        let query = StatsQuery::new(&AggregationCompiler::default(), &refs(&["count"]), vec![]).unwrap();
        let calls = Cell::new(0);
        let backend = |index: &str, body: &Value| -> anyhow::Result<Value> {
            calls.set(calls.get() + 1);
            assert_eq!(index, "tenders");
            assert_eq!(body["query"], json!({"match_all": {}}));
            Ok(json!({
                "hits": {"total": {"value": 42}},
                "aggregations": {"count": {"value": 42}}
            }))
        };
        let stats = query.run(&backend, "tenders", &ParseContext::default()).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(stats["count"], StatValue::Count(42));
    }

    #[test]
    fn backend_failure_is_contextualized() {
        let query = StatsQuery::new(&AggregationCompiler::default(), &refs(&["count"]), vec![]).unwrap();
        let backend = |_: &str, _: &Value| -> anyhow::Result<Value> { anyhow::bail!("connection refused") };
        let err = query
            .run(&backend, "tenders", &ParseContext::default())
            .unwrap_err();
        assert!(err.to_string().contains("tenders"));
    }

    #[test]
    fn missing_aggregations_parse_to_null() {
        let query = StatsQuery::new(&AggregationCompiler::default(), &refs(&["histogram"]), vec![]).unwrap();
        let stats = query
            .normalize(&json!({"hits": {"total": 0}}), &ParseContext::default())
            .unwrap();
        assert_eq!(stats["histogram"], StatValue::Null);
    }

    #[test]
    fn non_object_or_error_responses_are_malformed() {
        let query = StatsQuery::new(&AggregationCompiler::default(), &refs(&["count"]), vec![]).unwrap();
        let ctx = ParseContext::default();

        let err = query.normalize(&json!(["not", "a", "response"]), &ctx).unwrap_err();
        assert!(matches!(err, AggregationError::MalformedAnswer { ref id, .. } if id == "response"));

        let err = query
            .normalize(&json!({"error": {"type": "index_not_found_exception"}, "status": 404}), &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("index_not_found_exception"));
    }
}

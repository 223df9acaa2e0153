//! Query filters and their compilation into the engine's boolean query.
//!
//! A filter targets one document field. Fields under a nested collection are
//! matched through `nested` queries in the main query; the same predicate,
//! re-anchored at a nesting level, is what the injector places inside
//! nested aggregations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::fragments::NestedPathBinding;
use super::types::{AggregationError, AggregationResult};

/// Field holding a score's value inside the `ot.scores` collection.
pub const SCORE_VALUE_FIELD: &str = "ot.scores.value";
pub const SCORE_TYPE_FIELD: &str = "ot.scores.type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Term,
    Match,
    Text,
    Range,
    Date,
    Years,
    Weighted,
    Exists,
    Missing,
}

/// How multiple values of one filter combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Or,
    And,
}

impl FilterMode {
    fn operator(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
        }
    }
}

/// One filter of a search request.
///
/// For `weighted` filters `field` names the score (e.g. `TENDER`) and
/// `value` is its `[min, max]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default)]
    pub value: Vec<Value>,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, kind: FilterKind, value: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            kind,
            mode: FilterMode::Or,
            value,
        }
    }

    pub fn term(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::new(field, FilterKind::Term, values.into_iter().map(Into::into).collect())
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Nesting of the field the predicate actually tests.
    pub fn binding(&self) -> NestedPathBinding {
        match self.kind {
            FilterKind::Weighted => NestedPathBinding::of(SCORE_VALUE_FIELD),
            _ => NestedPathBinding::of(&self.field),
        }
    }

    /// Innermost nested collection the filter applies to.
    pub fn nested_path(&self) -> Option<&'static str> {
        self.binding().path()
    }

    /// Predicate evaluated against the main document.
    pub fn to_query(&self) -> AggregationResult<Value> {
        let binding = self.binding();
        let core = binding.wrap_query(self.positive_predicate()?);
        Ok(self.polarity(core))
    }

    /// Predicate evaluated against a nested document at `level`.
    ///
    /// `None` when the filter's field does not live at or below `level`.
    pub fn predicate_at(&self, level: &str) -> AggregationResult<Option<Value>> {
        let binding = self.binding();
        let Some(depth) = binding.chain.iter().position(|path| *path == level) else {
            return Ok(None);
        };
        let inner = NestedPathBinding {
            field: binding.field.clone(),
            chain: binding.chain[depth + 1..].to_vec(),
        };
        let core = inner.wrap_query(self.positive_predicate()?);
        Ok(Some(self.polarity(core)))
    }

    fn polarity(&self, query: Value) -> Value {
        match self.kind {
            FilterKind::Missing => json!({"bool": {"must_not": [query]}}),
            _ => query,
        }
    }

    /// Predicate on the field itself, before nesting and negation.
    fn positive_predicate(&self) -> AggregationResult<Value> {
        let field = self.field.as_str();
        match self.kind {
            FilterKind::Term => {
                let values = self.non_empty_values()?;
                Ok(match (self.mode, values) {
                    (_, [single]) => json!({"term": {field: single}}),
                    (FilterMode::Or, many) => json!({"terms": {field: many}}),
                    (FilterMode::And, many) => {
                        let clauses: Vec<Value> =
                            many.iter().map(|v| json!({"term": {field: v}})).collect();
                        json!({"bool": {"must": clauses}})
                    }
                })
            }
            FilterKind::Match => Ok(json!({
                "match": {field: {"query": self.joined_text()?, "operator": self.mode.operator()}}
            })),
            FilterKind::Text => Ok(json!({
                "simple_query_string": {
                    "query": self.joined_text()?,
                    "fields": [field],
                    "default_operator": self.mode.operator()
                }
            })),
            FilterKind::Range => {
                let bounds = self.bounds(|v| v.is_number())?;
                Ok(json!({"range": {field: bounds}}))
            }
            FilterKind::Date => {
                let mut bounds = self.bounds(|v| v.as_str().is_some_and(is_iso_date))?;
                bounds.insert("format".into(), json!("yyyy-MM-dd"));
                Ok(json!({"range": {field: bounds}}))
            }
            FilterKind::Years => {
                let ranges = self
                    .non_empty_values()?
                    .iter()
                    .map(|v| {
                        let year = v.as_i64().ok_or_else(|| self.invalid("years must be integers"))?;
                        Ok(json!({"range": {field: {
                            "gte": format!("{year:04}-01-01"),
                            "lte": format!("{year:04}-12-31"),
                            "format": "yyyy-MM-dd"
                        }}}))
                    })
                    .collect::<AggregationResult<Vec<Value>>>()?;
                Ok(json!({"bool": {"should": ranges, "minimum_should_match": 1}}))
            }
            FilterKind::Weighted => {
                let bounds = self.bounds(|v| v.is_number())?;
                Ok(json!({"bool": {"must": [
                    {"term": {SCORE_TYPE_FIELD: field}},
                    {"range": {SCORE_VALUE_FIELD: bounds}}
                ]}}))
            }
            FilterKind::Exists | FilterKind::Missing => Ok(json!({"exists": {"field": field}})),
        }
    }

    fn non_empty_values(&self) -> AggregationResult<&[Value]> {
        if self.value.is_empty() {
            return Err(self.invalid("no values given"));
        }
        Ok(&self.value)
    }

    fn joined_text(&self) -> AggregationResult<String> {
        let parts = self
            .non_empty_values()?
            .iter()
            .map(|v| v.as_str().ok_or_else(|| self.invalid("values must be strings")))
            .collect::<AggregationResult<Vec<&str>>>()?;
        Ok(parts.join(" "))
    }

    /// `[min, max]` with either side `null` for an open bound.
    fn bounds(
        &self,
        accept: impl Fn(&Value) -> bool,
    ) -> AggregationResult<serde_json::Map<String, Value>> {
        let mut bounds = serde_json::Map::new();
        for (op, value) in ["gte", "lte"].into_iter().zip(&self.value) {
            match value {
                Value::Null => {}
                v if accept(v) => {
                    bounds.insert(op.to_string(), v.clone());
                }
                v => return Err(self.invalid(format!("unsupported bound {v}"))),
            }
        }
        if self.value.len() > 2 {
            return Err(self.invalid("expected [min, max]"));
        }
        if bounds.is_empty() {
            return Err(self.invalid("range without bounds"));
        }
        Ok(bounds)
    }

    fn invalid(&self, reason: impl Into<String>) -> AggregationError {
        AggregationError::InvalidFilter {
            field: self.field.clone(),
            reason: reason.into(),
        }
    }
}

fn is_iso_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Conjunction of all filters. No filters matches everything.
pub fn build_query(filters: &[QueryFilter]) -> AggregationResult<Value> {
    if filters.is_empty() {
        return Ok(json!({"match_all": {}}));
    }
    let clauses = filters
        .iter()
        .map(QueryFilter::to_query)
        .collect::<AggregationResult<Vec<Value>>>()?;
    Ok(json!({"bool": {"filter": clauses}}))
}

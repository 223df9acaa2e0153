//! Shared types for the aggregation library.
//!
//! These types are used by the catalog, the compiler, the filter injector and
//! the normalizer, and are what callers see at the library boundary.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Aggregation-specific error.
///
/// The first group are programmer/configuration errors and abort the whole
/// composite operation. `MalformedAnswer` means the engine answered with a
/// shape the normalizer cannot read; retrying the same query reproduces it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("unknown aggregation '{0}'")]
    UnknownAggregation(String),

    #[error("aggregation '{id}' requires parameter '{parameter}'")]
    MissingParameter { id: String, parameter: &'static str },

    #[error("aggregation id '{0}' is used more than once")]
    DuplicateAggregationId(String),

    #[error("aggregation node '{0}' already carries an injected filter")]
    AlreadyWrapped(String),

    #[error("malformed engine answer for '{id}': {reason}")]
    MalformedAnswer { id: String, reason: String },

    #[error("invalid filter on '{field}': {reason}")]
    InvalidFilter { field: String, reason: String },
}

impl AggregationError {
    /// Answer-shape error raised by a parser; the normalizer fills in the id.
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedAnswer {
            id: String::new(),
            reason: reason.into(),
        }
    }

    pub(crate) fn for_aggregation(self, aggregation: &str) -> Self {
        match self {
            Self::MalformedAnswer { id, reason } if id.is_empty() => Self::MalformedAnswer {
                id: aggregation.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Structural errors are caused by the request, not by the engine's data.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::MalformedAnswer { .. })
    }
}

/// Convenience alias.
pub type AggregationResult<T> = std::result::Result<T, AggregationError>;

// ---------------------------------------------------------------------------
// Parameters and references
// ---------------------------------------------------------------------------

/// Runtime arguments of a parameterized aggregation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationParams {
    /// Indicator / score / field name the aggregation is instantiated for.
    pub name: String,
    /// Optional weights keyed by name (used by weighted scores).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<BTreeMap<String, f64>>,
}

impl AggregationParams {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            custom: None,
        }
    }

    pub fn with_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.custom = Some(weights);
        self
    }
}

/// One requested aggregation: a plain id or an id with parameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "RawAggregationRef")]
pub enum AggregationRef {
    Plain(String),
    Parameterized { id: String, params: AggregationParams },
}

/// Wire shape: `"id"` or `{"id": …, "name": …, "custom": {…}}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAggregationRef {
    Plain(String),
    Parameterized {
        id: String,
        name: String,
        #[serde(default)]
        custom: Option<BTreeMap<String, f64>>,
    },
}

impl From<RawAggregationRef> for AggregationRef {
    fn from(raw: RawAggregationRef) -> Self {
        match raw {
            RawAggregationRef::Plain(id) => Self::Plain(id),
            RawAggregationRef::Parameterized { id, name, custom } => Self::Parameterized {
                id,
                params: AggregationParams { name, custom },
            },
        }
    }
}

impl AggregationRef {
    pub fn plain(id: impl Into<String>) -> Self {
        Self::Plain(id.into())
    }

    pub fn with_params(id: impl Into<String>, params: AggregationParams) -> Self {
        Self::Parameterized {
            id: id.into(),
            params,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Plain(id) | Self::Parameterized { id, .. } => id,
        }
    }

    pub fn params(&self) -> Option<&AggregationParams> {
        match self {
            Self::Plain(_) => None,
            Self::Parameterized { params, .. } => Some(params),
        }
    }
}

impl From<&str> for AggregationRef {
    fn from(id: &str) -> Self {
        Self::Plain(id.to_string())
    }
}

/// Parses `id`, `id:name` or `id:name,key=weight,key=weight`.
impl FromStr for AggregationRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((id, rest)) = s.split_once(':') else {
            if s.is_empty() {
                return Err("empty aggregation id".into());
            }
            return Ok(Self::Plain(s.to_string()));
        };
        if id.is_empty() {
            return Err(format!("missing aggregation id in '{s}'"));
        }

        let mut parts = rest.split(',');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(format!("missing parameter name in '{s}'"));
        }
        let mut weights = BTreeMap::new();
        for part in parts {
            let (key, weight) = part
                .split_once('=')
                .ok_or_else(|| format!("expected key=weight, got '{part}'"))?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| format!("invalid weight '{weight}' for '{key}'"))?;
            weights.insert(key.trim().to_string(), weight);
        }

        let mut params = AggregationParams::named(name);
        if !weights.is_empty() {
            params = params.with_weights(weights);
        }
        Ok(Self::with_params(id, params))
    }
}

/// Caller-supplied context handed to every parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseContext {
    /// Upper bound on entries in top-N lists.
    pub top_n: usize,
    /// Total number of matched documents, when the engine reported it.
    pub total_hits: Option<u64>,
}

impl Default for ParseContext {
    fn default() -> Self {
        Self {
            top_n: 10,
            total_hits: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A parsed statistic: scalar, bucketed mapping or top-N list.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Null,
    Count(u64),
    Number(f64),
    Text(String),
    Map(BTreeMap<String, StatValue>),
    List(Vec<StatValue>),
}

impl StatValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Number or null, from an optional metric value.
    pub fn number(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Number)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Count(n) => Some(*n as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StatValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StatValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Entry of a map value.
    pub fn get(&self, key: &str) -> Option<&StatValue> {
        self.as_map()?.get(key)
    }
}

/// Flat statistics: aggregation id → parsed value.
pub type Statistics = BTreeMap<String, StatValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_ref() {
        assert_eq!("count".parse::<AggregationRef>().unwrap(), AggregationRef::plain("count"));
        assert!("".parse::<AggregationRef>().is_err());
    }

    #[test]
    fn parse_parameterized_ref_with_weights() {
        let parsed: AggregationRef = "weighted_score_para:GOOD,INTEGRITY=2,TRANSPARENCY=0.5"
            .parse()
            .unwrap();
        assert_eq!(parsed.id(), "weighted_score_para");
        let params = parsed.params().unwrap();
        assert_eq!(params.name, "GOOD");
        let weights = params.custom.as_ref().unwrap();
        assert_eq!(weights.get("INTEGRITY"), Some(&2.0));
        assert_eq!(weights.get("TRANSPARENCY"), Some(&0.5));
    }

    #[test]
    fn parse_rejects_bad_weights() {
        assert!("weighted_score_para:X,INTEGRITY".parse::<AggregationRef>().is_err());
        assert!("weighted_score_para:X,INTEGRITY=lots".parse::<AggregationRef>().is_err());
        assert!("avg_score_para:".parse::<AggregationRef>().is_err());
    }

    #[test]
    fn refs_deserialize_from_strings_and_objects() {
        let refs: Vec<AggregationRef> = serde_json::from_str(
            r#"["count", {"id": "avg_score_para", "name": "TENDER"}]"#,
        )
        .unwrap();
        assert_eq!(refs[0], AggregationRef::plain("count"));
        assert_eq!(
            refs[1],
            AggregationRef::with_params("avg_score_para", AggregationParams::named("TENDER"))
        );
    }

    #[test]
    fn stat_values_serialize_untagged() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), StatValue::Count(3));
        map.insert("b".to_string(), StatValue::Null);
        let json = serde_json::to_value(StatValue::Map(map)).unwrap();
        assert_eq!(json, serde_json::json!({"a": 3, "b": null}));
    }

    #[test]
    fn malformed_errors_pick_up_the_aggregation_id() {
        let err = AggregationError::malformed("no buckets").for_aggregation("sectors_stats");
        assert_eq!(err.to_string(), "malformed engine answer for 'sectors_stats': no buckets");
        assert!(!err.is_structural());
        assert!(AggregationError::UnknownAggregation("x".into()).is_structural());
    }
}

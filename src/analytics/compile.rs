//! Compiling aggregation references into one composite request.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use super::catalog::{AggregationCatalog, CATALOG};
use super::filters::QueryFilter;
use super::inject::{Injection, NestedFilterInjector, Scope};
use super::normalize::{CompiledEntry, ResultNormalizer};
use super::types::{AggregationError, AggregationRef, AggregationResult, ParseContext, Statistics};

/// Resolves references against a catalog. Never talks to the engine.
#[derive(Debug, Clone, Copy)]
pub struct AggregationCompiler<'c> {
    catalog: &'c AggregationCatalog,
}

impl Default for AggregationCompiler<'static> {
    fn default() -> Self {
        Self::new(&CATALOG)
    }
}

impl<'c> AggregationCompiler<'c> {
    pub fn new(catalog: &'c AggregationCatalog) -> Self {
        Self { catalog }
    }

    /// Build the composite request for `refs`.
    ///
    /// Fails on the first unknown id, duplicate id or unresolved parameter.
    pub fn compile(&self, refs: &[AggregationRef]) -> AggregationResult<CompiledAggregations> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(refs.len());
        let mut request = Map::new();

        for reference in refs {
            let id = reference.id();
            if !seen.insert(id) {
                return Err(AggregationError::DuplicateAggregationId(id.to_string()));
            }
            let spec = self.catalog.lookup(id)?;
            let params = reference.params();
            if params.is_some() && !spec.is_parameterized() {
                debug!(aggregation = %id, "ignoring parameters of a fixed aggregation");
            }
            request.insert(id.to_string(), spec.request(params)?);
            entries.push(CompiledEntry {
                id: id.to_string(),
                spec: spec.clone(),
                params: params.filter(|_| spec.is_parameterized()).cloned(),
            });
        }

        debug!(count = entries.len(), "compiled aggregations");
        Ok(CompiledAggregations {
            entries,
            request,
            scopes: None,
        })
    }
}

/// A composite request together with the parser for its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAggregations {
    entries: Vec<CompiledEntry>,
    request: Map<String, Value>,
    scopes: Option<BTreeMap<String, Scope>>,
}

impl CompiledAggregations {
    /// `{id → fragment}`, as sent under the engine's `aggs` key.
    pub fn request(&self) -> &Map<String, Value> {
        &self.request
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.request.clone())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn entries(&self) -> &[CompiledEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scope record per id, once filters were applied.
    pub fn scopes(&self) -> Option<&BTreeMap<String, Scope>> {
        self.scopes.as_ref()
    }

    /// Scope the main query's nested filters into the request.
    ///
    /// Applying filters twice fails with `AlreadyWrapped` when the first
    /// pass wrapped anything.
    pub fn with_filters(self, filters: &[QueryFilter]) -> AggregationResult<Self> {
        let Injection { request, scopes } = NestedFilterInjector::new(filters).inject(&self.request)?;
        let scopes = match self.scopes {
            Some(mut previous) => {
                for (id, scope) in scopes {
                    if scope.is_wrapped() {
                        previous.insert(id, scope);
                    }
                }
                previous
            }
            None => scopes,
        };
        Ok(Self {
            entries: self.entries,
            request,
            scopes: Some(scopes),
        })
    }

    /// Parse an answer's aggregation object into `{id → value}`.
    pub fn parse(&self, answer: &Value, ctx: &ParseContext) -> AggregationResult<Statistics> {
        let normalizer = match &self.scopes {
            Some(scopes) => ResultNormalizer::new(scopes),
            None => ResultNormalizer::plain(),
        };
        normalizer.parse_all(answer, &self.entries, ctx)
    }
}

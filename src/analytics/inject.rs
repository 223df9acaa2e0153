//! Scoping main-query filters into nested aggregations.
//!
//! A nested aggregation sees every nested document of the matched tenders,
//! including the ones the main query's nested filters rejected. For each
//! `nested` node whose path matches a filter's nested path, the node's
//! sub-aggregations are moved under a synthetic `<name>_filter` node carrying
//! the matched predicates. The returned [`Scope`] records say exactly where
//! that happened so the normalizer can undo it.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::debug;

use super::filters::QueryFilter;
use super::fragments::declared_nested_path;
use super::types::{AggregationError, AggregationResult};

/// One synthetic filter node added by the injector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapPoint {
    /// Aggregation names from below the top-level entry down to the wrapped
    /// `nested` node. Empty when the entry itself was wrapped.
    pub path: Vec<String>,
    /// Name of the synthetic filter node.
    pub filter_key: String,
}

/// What the injector did to one top-level aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    Plain,
    /// Wrap points in pre-order (outer before inner).
    Wrapped(Vec<WrapPoint>),
}

impl Scope {
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Self::Wrapped(_))
    }

    pub fn wrap_points(&self) -> &[WrapPoint] {
        match self {
            Self::Plain => &[],
            Self::Wrapped(points) => points,
        }
    }
}

/// Rewritten request plus a scope record per top-level aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    pub request: Map<String, Value>,
    pub scopes: BTreeMap<String, Scope>,
}

impl Injection {
    pub fn scope(&self, id: &str) -> &Scope {
        static PLAIN: Scope = Scope::Plain;
        self.scopes.get(id).unwrap_or(&PLAIN)
    }
}

pub fn filter_key(name: &str) -> String {
    format!("{name}_filter")
}

/// Applies a fixed set of main-query filters to aggregation trees.
#[derive(Debug)]
pub struct NestedFilterInjector<'f> {
    filters: &'f [QueryFilter],
}

impl<'f> NestedFilterInjector<'f> {
    pub fn new(filters: &'f [QueryFilter]) -> Self {
        Self { filters }
    }

    /// Rewrite a composite request `{id → fragment}`.
    ///
    /// The input is left untouched. Fails with `AlreadyWrapped` if a node that
    /// would be wrapped already carries its synthetic filter node.
    pub fn inject(&self, request: &Map<String, Value>) -> AggregationResult<Injection> {
        let mut rewritten = request.clone();
        let mut scopes = BTreeMap::new();
        for (id, node) in rewritten.iter_mut() {
            let mut points = Vec::new();
            self.visit(id, node, &mut Vec::new(), &mut points)?;
            let scope = if points.is_empty() {
                Scope::Plain
            } else {
                debug!(aggregation = %id, wraps = points.len(), "scoped nested filters");
                Scope::Wrapped(points)
            };
            scopes.insert(id.clone(), scope);
        }
        Ok(Injection {
            request: rewritten,
            scopes,
        })
    }

    /// Conjunction of the predicates that apply to nested documents at `path`.
    fn predicate_for(&self, path: &str) -> AggregationResult<Option<Value>> {
        let mut clauses = Vec::new();
        for filter in self.filters.iter().filter(|f| f.nested_path() == Some(path)) {
            if let Some(predicate) = filter.predicate_at(path)? {
                clauses.push(predicate);
            }
        }
        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(json!({"bool": {"filter": clauses}})),
        })
    }

    fn visit(
        &self,
        name: &str,
        node: &mut Value,
        trail: &mut Vec<String>,
        points: &mut Vec<WrapPoint>,
    ) -> AggregationResult<()> {
        let predicate = match declared_nested_path(node) {
            Some(path) => self.predicate_for(path)?,
            None => None,
        };
        let Value::Object(map) = node else {
            return Ok(());
        };

        if let Some(predicate) = predicate {
            let key = filter_key(name);
            if is_wrapped(map, &key) {
                return Err(AggregationError::AlreadyWrapped(name.to_string()));
            }
            let mut wrapper = Map::new();
            wrapper.insert("filter".into(), predicate);
            if let Some(subs) = map.remove("aggs") {
                wrapper.insert("aggs".into(), subs);
            }
            let mut aggs = Map::new();
            aggs.insert(key.clone(), Value::Object(wrapper));
            map.insert("aggs".into(), Value::Object(aggs));
            points.push(WrapPoint {
                path: trail.clone(),
                filter_key: key.clone(),
            });

            if let Some(Value::Object(subs)) = map
                .get_mut("aggs")
                .and_then(|aggs| aggs.get_mut(&key))
                .and_then(|wrapper| wrapper.get_mut("aggs"))
            {
                self.visit_children(subs, trail, points)?;
            }
            return Ok(());
        }

        if let Some(Value::Object(subs)) = map.get_mut("aggs") {
            self.visit_children(subs, trail, points)?;
        }
        Ok(())
    }

    fn visit_children(
        &self,
        subs: &mut Map<String, Value>,
        trail: &mut Vec<String>,
        points: &mut Vec<WrapPoint>,
    ) -> AggregationResult<()> {
        for (child_name, child) in subs.iter_mut() {
            trail.push(child_name.clone());
            let result = self.visit(child_name, child, trail, points);
            trail.pop();
            result?;
        }
        Ok(())
    }
}

fn is_wrapped(map: &Map<String, Value>, key: &str) -> bool {
    map.get("aggs")
        .and_then(|aggs| aggs.get(key))
        .is_some_and(|wrapper| wrapper.get("filter").is_some())
}

//! Aggregation compiler and result normalizer.
//!
//! Builds composite aggregation requests for the search engine from a
//! catalog of named statistics, scopes the main query's nested filters into
//! them, and reads the engine's hierarchical answer back into a flat
//! `{id → value}` map.
//!
//! # Module structure
//!
//! - [`types`]: references, parameters, statistic values, error type
//! - [`fragments`]: request fragment constructors, nested-path bindings
//! - [`filters`]: query filters and main query compilation
//! - [`catalog`]: aggregation kinds and the id registry
//! - [`compile`]: composite request compilation
//! - [`inject`]: nested filter scoping
//! - [`normalize`]: answer unwrapping and parsing
//! - [`bucketing`]: bucket / metric readers for answer nodes
//! - [`derive`]: safe derived-metric computation
//! - [`query`]: request envelope and the search backend seam

pub mod bucketing;
pub mod catalog;
pub mod compile;
pub mod derive;
pub mod filters;
pub mod fragments;
pub mod inject;
pub mod normalize;
pub mod query;
pub mod types;

// Re-export the most commonly used items at the crate::analytics level.
pub use catalog::{AggregationCatalog, AggregationKind, AggregationSpec, CATALOG};
pub use compile::{AggregationCompiler, CompiledAggregations};
pub use filters::{FilterKind, FilterMode, QueryFilter, build_query};
pub use fragments::{NESTED_PATHS, NestedPathBinding};
pub use inject::{Injection, NestedFilterInjector, Scope, WrapPoint};
pub use normalize::{CompiledEntry, ResultNormalizer};
pub use query::{SearchBackend, StatsQuery};
pub use types::{
    AggregationError, AggregationParams, AggregationRef, AggregationResult, ParseContext,
    StatValue, Statistics,
};

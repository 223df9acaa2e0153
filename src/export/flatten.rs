//! Hierarchical-to-tabular flattening.
//!
//! Rows of a block are the cross product of its siblings' rows. A relation
//! produces one row set per child element (one-to-many) or for the single
//! child (one-to-one), and a single blank row when there is nothing to join,
//! so the result is a left outer join that never drops the parent. A sibling
//! that yields one row therefore merges horizontally; a sibling that yields
//! several multiplies the rows accumulated so far.
//!
//! Invariants: every row is exactly `block.width()` cells wide and every call
//! returns at least one row.

use itertools::Itertools;
use serde_json::Value;
use tracing::warn;

use super::block::{Block, Cardinality, Column, lookup};
use super::codec::ColumnCodec;

/// One flattened record: formatted cells, not yet escaped.
pub type Row = Vec<String>;

/// Flatten a document against a block tree.
pub fn flatten(block: &Block, instance: &Value, codec: &ColumnCodec) -> Vec<Row> {
    rows_of(block, instance, None, codec)
}

/// Flatten one element of a collection, with its position known.
pub fn flatten_element(
    block: &Block,
    instance: &Value,
    index: usize,
    codec: &ColumnCodec,
) -> Vec<Row> {
    rows_of(block, instance, Some(index), codec)
}

fn rows_of(block: &Block, instance: &Value, index: Option<usize>, codec: &ColumnCodec) -> Vec<Row> {
    match block {
        Block::Leaf(columns) => vec![
            columns
                .iter()
                .map(|column| format_column(column, instance, index, codec))
                .collect(),
        ],
        Block::Relation {
            field,
            cardinality,
            child,
        } => {
            let elements = related(instance, field, *cardinality);
            if elements.is_empty() {
                return vec![blank_row(child.width())];
            }
            elements
                .into_iter()
                .enumerate()
                .flat_map(|(i, element)| rows_of(child, element, Some(i), codec))
                .collect()
        }
        Block::Group(children) => {
            let mut acc: Vec<Row> = vec![Vec::with_capacity(block.width())];
            for child in children {
                let lines = rows_of(child, instance, index, codec);
                acc = combine(acc, lines);
            }
            acc
        }
    }
}

fn combine(acc: Vec<Row>, lines: Vec<Row>) -> Vec<Row> {
    if let [line] = lines.as_slice() {
        return acc
            .into_iter()
            .map(|mut row| {
                row.extend(line.iter().cloned());
                row
            })
            .collect();
    }
    acc.iter()
        .cartesian_product(lines.iter())
        .map(|(left, right)| left.iter().chain(right.iter()).cloned().collect())
        .collect()
}

/// Children reachable through a relation, interpreted by its declared cardinality.
fn related<'a>(instance: &'a Value, field: &str, cardinality: Cardinality) -> Vec<&'a Value> {
    let value = match lookup(instance, field) {
        None | Some(Value::Null) => return Vec::new(),
        Some(value) => value,
    };
    match (cardinality, value) {
        (Cardinality::One, Value::Object(_)) => vec![value],
        (Cardinality::Many, Value::Array(items)) => {
            items.iter().filter(|item| !item.is_null()).collect()
        }
        (Cardinality::One, Value::Array(items)) => {
            warn!(
                relation = %field,
                len = items.len(),
                "one-to-one relation holds an array; using its first element"
            );
            items.first().into_iter().collect()
        }
        (Cardinality::Many, Value::Object(_)) => {
            warn!(
                relation = %field,
                "one-to-many relation holds a single object; treating it as one element"
            );
            vec![value]
        }
        (_, other) => {
            warn!(relation = %field, value = %other, "relation is not an object or array; skipped");
            Vec::new()
        }
    }
}

fn format_column(column: &Column, instance: &Value, index: Option<usize>, codec: &ColumnCodec) -> String {
    match column {
        Column::Field { field, kind, .. } => codec.format(field, lookup(instance, field), kind),
        Column::Derived { transform, .. } => transform(instance),
        Column::Position { .. } => index.map(|i| (i + 1).to_string()).unwrap_or_default(),
    }
}

fn blank_row(width: usize) -> Row {
    vec![String::new(); width]
}

//! Static column/block configuration for the flattener.
//!
//! A [`Block`] mirrors the nested shape of a document: leaf column sets,
//! relations to child objects or collections, and groups of sibling blocks.
//! Trees are built once at startup and shared read-only by every export.

use serde_json::Value;

use super::codec::ColumnType;

/// How many children a relation can hold. Declared, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Single object, present or absent.
    One,
    /// Array of objects.
    Many,
}

/// Pure derivation of a cell from the object a column is applied to.
pub type Transform = fn(&Value) -> String;

#[derive(Debug, Clone)]
pub enum Column {
    /// Draw a value out of a (dotted) field path and format it.
    Field {
        field: String,
        header: Option<String>,
        kind: ColumnType,
    },
    /// Compute a value from the whole object.
    Derived { name: String, transform: Transform },
    /// 1-based position of the object within its parent collection.
    Position { name: String },
}

impl Column {
    pub fn field(field: impl Into<String>, kind: ColumnType) -> Self {
        Self::Field {
            field: field.into(),
            header: None,
            kind,
        }
    }

    /// Field column with a header label that differs from the field path.
    pub fn labeled(field: impl Into<String>, header: impl Into<String>, kind: ColumnType) -> Self {
        Self::Field {
            field: field.into(),
            header: Some(header.into()),
            kind,
        }
    }

    pub fn derived(name: impl Into<String>, transform: Transform) -> Self {
        Self::Derived {
            name: name.into(),
            transform,
        }
    }

    pub fn position(name: impl Into<String>) -> Self {
        Self::Position { name: name.into() }
    }

    /// Header label, without any relation prefix.
    pub fn name(&self) -> &str {
        match self {
            Self::Field {
                header: Some(h), ..
            } => h,
            Self::Field { field, .. } => field,
            Self::Derived { name, .. } | Self::Position { name } => name,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Block {
    Leaf(Vec<Column>),
    Relation {
        /// Field holding the child object or collection, relative to the parent.
        field: String,
        cardinality: Cardinality,
        child: Box<Block>,
    },
    /// Sibling blocks evaluated against the same object.
    Group(Vec<Block>),
}

impl Block {
    pub fn leaf(columns: Vec<Column>) -> Self {
        Self::Leaf(columns)
    }

    pub fn one(field: impl Into<String>, child: Block) -> Self {
        Self::Relation {
            field: field.into(),
            cardinality: Cardinality::One,
            child: Box::new(child),
        }
    }

    pub fn many(field: impl Into<String>, child: Block) -> Self {
        Self::Relation {
            field: field.into(),
            cardinality: Cardinality::Many,
            child: Box::new(child),
        }
    }

    pub fn group(children: Vec<Block>) -> Self {
        Self::Group(children)
    }

    /// Number of cells in every row this block produces.
    pub fn width(&self) -> usize {
        match self {
            Self::Leaf(columns) => columns.len(),
            Self::Relation { child, .. } => child.width(),
            Self::Group(children) => children.iter().map(Block::width).sum(),
        }
    }

    /// Column labels, prefixed with the relation path that leads to them.
    pub fn header(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.width());
        self.collect_header("", &mut out);
        out
    }

    fn collect_header(&self, prefix: &str, out: &mut Vec<String>) {
        match self {
            Self::Leaf(columns) => {
                out.extend(columns.iter().map(|c| format!("{prefix}{}", c.name())));
            }
            Self::Relation { field, child, .. } => {
                child.collect_header(&format!("{prefix}{field}."), out);
            }
            Self::Group(children) => {
                for child in children {
                    child.collect_header(prefix, out);
                }
            }
        }
    }
}

/// Resolve a dotted path through nested objects.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

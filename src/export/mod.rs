//! Tabular export of tender documents.
//!
//! # Module structure
//!
//! - [`codec`]: per-cell formatting by column type, CSV escaping
//! - [`block`]: column / relation tree describing a document's shape
//! - [`flatten`]: recursive left-outer-join flattening into rows
//! - [`columns`]: the static column configuration per entity kind
//! - [`writer`]: buffered CSV writer and streaming export engine

pub mod block;
pub mod codec;
pub mod columns;
pub mod flatten;
pub mod writer;

pub use block::{Block, Cardinality, Column};
pub use codec::{CodecOptions, ColumnCodec, ColumnType, PriceField};
pub use columns::{EntityKind, LOT_BLOCK, TENDER_BLOCK};
pub use flatten::{Row, flatten, flatten_element};
pub use writer::{CsvWriter, ExportEngine, ExportError, ExportResult, ExportStats};

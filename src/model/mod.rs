//! Tender document records.

pub mod types;

pub use types::{Indicator, IndicatorStatus, Price, Score, find_keyed};

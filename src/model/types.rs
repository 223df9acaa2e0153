//! Typed views over the sub-records of a tender document.
//!
//! Tender documents travel through the crate as `serde_json::Value` because
//! the export columns and the aggregation fields address them by dotted path.
//! The small records below are the ones whose inner shape the column codec
//! needs to understand (money amounts, indicators, scores).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A money record as stored on tenders, lots and bids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    #[serde(default)]
    pub net_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub min_net_amount: Option<f64>,
    #[serde(default)]
    pub max_net_amount: Option<f64>,
    /// Net amount converted to EUR during import.
    #[serde(default)]
    pub net_amount_eur: Option<f64>,
}

/// One entry of a tender's heterogeneous indicator list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub status: Option<IndicatorStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorStatus {
    Calculated,
    InsufficientData,
    Undefined,
    #[serde(other)]
    Unknown,
}

/// A composite score (e.g. `TENDER`, `INTEGRITY`) computed per tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Find the entry with the given `type` key in a raw indicator or score list.
///
/// Only the matching entry is inspected, so a malformed sibling never hides
/// a well-formed one.
pub fn find_keyed<'a>(entries: &'a [Value], kind: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|entry| entry.get("type").and_then(Value::as_str) == Some(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_reads_camel_case_fields() {
        let price: Price = serde_json::from_value(json!({
            "netAmount": 1200.5,
            "currency": "CZK",
            "netAmountEur": 44.1
        }))
        .unwrap();
        assert_eq!(price.net_amount, Some(1200.5));
        assert_eq!(price.currency.as_deref(), Some("CZK"));
        assert_eq!(price.net_amount_eur, Some(44.1));
        assert_eq!(price.min_net_amount, None);
    }

    #[test]
    fn keyed_lookup_skips_malformed_siblings() {
        let list = json!([
            {"value": "n/a"},
            {"type": "CORRUPTION_SINGLE_BID", "value": 0.0, "status": "CALCULATED"},
            {"type": "TRANSPARENCY_NUMBER_OF_KEY_MISSING_FIELDS", "value": 87.5}
        ]);
        let entries = list.as_array().unwrap();
        let found: Indicator = serde_json::from_value(
            find_keyed(entries, "TRANSPARENCY_NUMBER_OF_KEY_MISSING_FIELDS").unwrap().clone(),
        )
        .unwrap();
        assert_eq!(found.value, Some(87.5));
        assert!(find_keyed(entries, "ADMINISTRATIVE_CENTRALIZED_PROCUREMENT").is_none());
    }

    #[test]
    fn unknown_indicator_status_still_parses() {
        let ind: Indicator = serde_json::from_value(json!({
            "type": "CORRUPTION_SINGLE_BID",
            "value": 100,
            "status": "SOME_NEW_STATUS"
        }))
        .unwrap();
        assert_eq!(ind.status, Some(IndicatorStatus::Unknown));
        assert_eq!(ind.value, Some(100.0));
    }
}

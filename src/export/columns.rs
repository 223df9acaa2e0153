//! Column configuration per exported entity kind.
//!
//! Adding a column means appending a descriptor here; the flattener itself
//! never changes.

use chrono::Datelike;
use clap::ValueEnum;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::block::{Block, Column, lookup};
use super::codec::{ColumnType, PriceField, parse_date};

/// Which rows an export produces from a tender document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Tender × buyers × lots × bids × bidders.
    #[default]
    Tender,
    /// Lots × bids × bidders, keyed by the owning tender.
    Lot,
}

impl EntityKind {
    pub fn block(self) -> &'static Block {
        match self {
            Self::Tender => &TENDER_BLOCK,
            Self::Lot => &LOT_BLOCK,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tender => write!(f, "tender"),
            Self::Lot => write!(f, "lot"),
        }
    }
}

pub static TENDER_BLOCK: Lazy<Block> = Lazy::new(|| {
    Block::group(vec![
        Block::leaf(tender_columns()),
        Block::many("buyers", body_block(true)),
        Block::many("lots", lot_block()),
    ])
});

pub static LOT_BLOCK: Lazy<Block> = Lazy::new(|| {
    Block::group(vec![
        Block::leaf(vec![
            Column::labeled("id", "tender.id", ColumnType::String),
            Column::labeled("country", "tender.country", ColumnType::String),
            Column::labeled("ot.date", "tender.date", ColumnType::Date),
            Column::labeled("procedureType", "tender.procedureType", ColumnType::String),
        ]),
        Block::many("lots", lot_block()),
    ])
});

fn tender_columns() -> Vec<Column> {
    vec![
        Column::field("id", ColumnType::String),
        Column::field("title", ColumnType::String),
        Column::field("country", ColumnType::String),
        Column::field("procedureType", ColumnType::String),
        Column::labeled("ot.date", "date", ColumnType::Date),
        Column::derived("year", tender_year),
        Column::labeled("ot.cpv", "cpv", ColumnType::String),
        Column::labeled("ot.cpv_divisions", "sectors", ColumnType::Strings),
        Column::field("isEUFunded", ColumnType::Bool),
        Column::field("isFrameworkAgreement", ColumnType::Bool),
        Column::labeled(
            "finalPrice",
            "finalPrice.netAmount",
            ColumnType::Price(PriceField::NetAmount),
        ),
        Column::labeled(
            "finalPrice",
            "finalPrice.currency",
            ColumnType::Price(PriceField::Currency),
        ),
        Column::labeled(
            "finalPrice",
            "finalPrice.netAmountEur",
            ColumnType::Price(PriceField::NetAmountEur),
        ),
        Column::labeled(
            "estimatedPrice",
            "estimatedPrice.minNetAmount",
            ColumnType::Price(PriceField::MinNetAmount),
        ),
        Column::labeled(
            "estimatedPrice",
            "estimatedPrice.maxNetAmount",
            ColumnType::Price(PriceField::MaxNetAmount),
        ),
        Column::labeled("lots", "lotsCount", ColumnType::Count),
        Column::labeled("description", "description.length", ColumnType::Length),
        Column::labeled(
            "indicators",
            "indicator.singleBid",
            ColumnType::Indicator("CORRUPTION_SINGLE_BID".into()),
        ),
        Column::labeled(
            "indicators",
            "indicator.advertisementPeriod",
            ColumnType::Indicator("CORRUPTION_ADVERTISEMENT_PERIOD".into()),
        ),
        Column::labeled(
            "indicators",
            "indicator.missingFields",
            ColumnType::Indicator("TRANSPARENCY_NUMBER_OF_KEY_MISSING_FIELDS".into()),
        ),
        Column::labeled("ot.scores", "score.tender", ColumnType::Score("TENDER".into())),
    ]
}

fn lot_block() -> Block {
    Block::group(vec![
        Block::leaf(vec![
            Column::position("position"),
            Column::field("lotNumber", ColumnType::Number),
            Column::field("title", ColumnType::String),
            Column::field("status", ColumnType::String),
            Column::field("bidsCount", ColumnType::Number),
            Column::labeled("awardDecisionDate", "awardDecisionDate", ColumnType::Date),
            Column::labeled(
                "estimatedPrice",
                "estimatedPrice.netAmountEur",
                ColumnType::Price(PriceField::NetAmountEur),
            ),
        ]),
        Block::many(
            "bids",
            Block::group(vec![
                Block::leaf(vec![
                    Column::position("position"),
                    Column::field("isWinning", ColumnType::Bool),
                    Column::field("isConsortium", ColumnType::Bool),
                    Column::labeled("price", "price.netAmount", ColumnType::Price(PriceField::NetAmount)),
                    Column::labeled("price", "price.currency", ColumnType::Price(PriceField::Currency)),
                    Column::labeled(
                        "price",
                        "price.netAmountEur",
                        ColumnType::Price(PriceField::NetAmountEur),
                    ),
                    Column::labeled("bidders", "biddersCount", ColumnType::Count),
                ]),
                Block::many("bidders", body_block(false)),
            ]),
        ),
    ])
}

/// Columns shared by buyers and bidders.
fn body_block(is_buyer: bool) -> Block {
    let mut columns = vec![
        Column::field("id", ColumnType::String),
        Column::field("name", ColumnType::String),
    ];
    if is_buyer {
        columns.push(Column::field("buyerType", ColumnType::String));
        columns.push(Column::field("mainActivities", ColumnType::Strings));
    }
    Block::group(vec![
        Block::leaf(columns),
        Block::one(
            "address",
            Block::leaf(vec![
                Column::field("city", ColumnType::String),
                Column::field("country", ColumnType::String),
                Column::labeled("ot.nutscode", "nuts", ColumnType::String),
            ]),
        ),
    ])
}

fn tender_year(tender: &Value) -> String {
    lookup(tender, "ot.date")
        .and_then(Value::as_str)
        .and_then(parse_date)
        .map(|date| date.year().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_widths_match_blocks() {
        for kind in [EntityKind::Tender, EntityKind::Lot] {
            let block = kind.block();
            assert_eq!(block.header().len(), block.width(), "{kind}");
        }
    }

    #[test]
    fn tender_header_is_prefixed_per_relation() {
        let header = TENDER_BLOCK.header();
        assert_eq!(header[0], "id");
        assert!(header.contains(&"buyers.address.nuts".to_string()));
        assert!(header.contains(&"lots.bids.bidders.name".to_string()));
        assert!(header.contains(&"lots.bids.price.netAmountEur".to_string()));
        assert!(!header.contains(&"lots.bids.bidders.buyerType".to_string()));
    }

    #[test]
    fn year_is_derived_from_date() {
        assert_eq!(tender_year(&json!({"ot": {"date": "2014-11-30T00:00:00"}})), "2014");
        assert_eq!(tender_year(&json!({"ot": {}})), "");
    }
}

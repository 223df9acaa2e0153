//! The aggregation catalog.
//!
//! Every statistic the service can compute is one [`AggregationKind`]
//! variant: it knows how to build its request fragment and how to read the
//! matching answer node. The [`AggregationCatalog`] maps public ids onto
//! variants and is append-only; the process-wide [`CATALOG`] holds the
//! built-in entries under their default ids.

use std::collections::BTreeMap;

use itertools::Itertools;
use once_cell::sync::Lazy;
use serde_json::{Value, json};

use super::bucketing::{bucket_key, buckets, child, doc_count, metric_value};
use super::derive::weighted_average;
use super::filters::{SCORE_TYPE_FIELD, SCORE_VALUE_FIELD};
use super::fragments::{
    NestedPathBinding, avg, filter, histogram, nested, reverse_nested, sum, terms, value_count,
    with_aggs, year_histogram,
};
use super::types::{
    AggregationError, AggregationParams, AggregationResult, ParseContext, StatValue,
};

// ---------------------------------------------------------------------------
// Document fields
// ---------------------------------------------------------------------------

const DATE_FIELD: &str = "ot.date";
const FINAL_PRICE_FIELD: &str = "finalPrice.netAmountEur";
const SECTOR_FIELD: &str = "ot.cpv_divisions";
const REGION_FIELD: &str = "buyers.address.ot.nutscode";
const BUYER_ID_FIELD: &str = "buyers.id";
const BUYER_NAME_FIELD: &str = "buyers.name";
const BIDDER_ID_FIELD: &str = "lots.bids.bidders.id";
const BIDDER_NAME_FIELD: &str = "lots.bids.bidders.name";
const BID_PRICE_FIELD: &str = "lots.bids.price.netAmountEur";
const WINNING_FIELD: &str = "lots.bids.isWinning";
const LOTS_COUNT_FIELD: &str = "lotsCount";
const BIDS_COUNT_FIELD: &str = "lots.bidsCount";
const PROCEDURE_TYPE_FIELD: &str = "procedureType";
const INDICATOR_TYPE_FIELD: &str = "indicators.type";
const INDICATOR_VALUE_FIELD: &str = "indicators.value";

/// Bucket count requested for top-N lists; parsers cut down to `top_n`.
const TOP_BUCKETS: usize = 50;
const SECTOR_BUCKETS: usize = 100;
const REGION_BUCKETS: usize = 500;
const INDICATOR_BUCKETS: usize = 100;
const TERMS_BUCKETS: usize = 100;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Count,
    SumPrice,
    AvgPrice,
    Histogram,
    HistogramFinalPrice,
    SectorsStats,
    RegionsStats,
    TopAuthorities,
    TopCompanies,
    CountLotsBids,
    LotsInTenders,
    BidsInLots,
    AvgPriceByBidder,
    IndicatorsStats,
    ProcedureTypes,
    AvgScore,
    HistogramScore,
    WeightedScore,
    Terms,
}

impl AggregationKind {
    pub const ALL: [Self; 19] = [
        Self::Count,
        Self::SumPrice,
        Self::AvgPrice,
        Self::Histogram,
        Self::HistogramFinalPrice,
        Self::SectorsStats,
        Self::RegionsStats,
        Self::TopAuthorities,
        Self::TopCompanies,
        Self::CountLotsBids,
        Self::LotsInTenders,
        Self::BidsInLots,
        Self::AvgPriceByBidder,
        Self::IndicatorsStats,
        Self::ProcedureTypes,
        Self::AvgScore,
        Self::HistogramScore,
        Self::WeightedScore,
        Self::Terms,
    ];

    /// Id the kind is registered under in the built-in catalog.
    pub fn default_id(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::SumPrice => "sum_price",
            Self::AvgPrice => "avg_price",
            Self::Histogram => "histogram",
            Self::HistogramFinalPrice => "histogram_finalPrice",
            Self::SectorsStats => "sectors_stats",
            Self::RegionsStats => "regions_stats",
            Self::TopAuthorities => "top_authorities",
            Self::TopCompanies => "top_companies",
            Self::CountLotsBids => "count_lots_bids",
            Self::LotsInTenders => "lots_in_tenders",
            Self::BidsInLots => "bids_in_lots",
            Self::AvgPriceByBidder => "avg_price_by_bidder",
            Self::IndicatorsStats => "indicators_stats",
            Self::ProcedureTypes => "procedure_types",
            Self::AvgScore => "avg_score_para",
            Self::HistogramScore => "histogram_score_para",
            Self::WeightedScore => "weighted_score_para",
            Self::Terms => "terms_para",
        }
    }

    pub fn is_parameterized(self) -> bool {
        matches!(
            self,
            Self::AvgScore | Self::HistogramScore | Self::WeightedScore | Self::Terms
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Count => "number of tenders",
            Self::SumPrice => "sum of final prices (EUR)",
            Self::AvgPrice => "average final price (EUR)",
            Self::Histogram => "tenders per year",
            Self::HistogramFinalPrice => "sum of final prices per year",
            Self::SectorsStats => "tenders, price sum and average per CPV division",
            Self::RegionsStats => "tenders per buyer NUTS region",
            Self::TopAuthorities => "buyers with most tenders",
            Self::TopCompanies => "bidders with most winning bids",
            Self::CountLotsBids => "number of lots and bids",
            Self::LotsInTenders => "tenders by number of lots",
            Self::BidsInLots => "lots by number of bids",
            Self::AvgPriceByBidder => "average bid price per bidder",
            Self::IndicatorsStats => "average value per indicator type",
            Self::ProcedureTypes => "tenders per procedure type",
            Self::AvgScore => "average of one score",
            Self::HistogramScore => "average of one score per year",
            Self::WeightedScore => "weighted average of several scores",
            Self::Terms => "tenders per value of a field",
        }
    }

    /// Request fragment. Parameterized kinds read `params`; fixed ones ignore it.
    fn request(self, params: &AggregationParams) -> Value {
        match self {
            Self::Count => value_count("id"),
            Self::SumPrice => sum(FINAL_PRICE_FIELD),
            Self::AvgPrice => avg(FINAL_PRICE_FIELD),
            Self::Histogram => year_histogram(DATE_FIELD),
            Self::HistogramFinalPrice => {
                with_aggs(year_histogram(DATE_FIELD), [("sum", sum(FINAL_PRICE_FIELD))])
            }
            Self::SectorsStats => with_aggs(
                terms(SECTOR_FIELD, SECTOR_BUCKETS),
                [("sum", sum(FINAL_PRICE_FIELD)), ("avg", avg(FINAL_PRICE_FIELD))],
            ),
            Self::RegionsStats => NestedPathBinding::of(REGION_FIELD).wrap_aggregation(
                "regions",
                with_aggs(
                    terms(REGION_FIELD, REGION_BUCKETS),
                    [("tenders", reverse_nested(None))],
                ),
            ),
            Self::TopAuthorities => NestedPathBinding::of(BUYER_ID_FIELD)
                .wrap_aggregation("top", top_bodies(BUYER_ID_FIELD, BUYER_NAME_FIELD)),
            Self::TopCompanies => with_aggs(
                nested("lots"),
                [(
                    "bids",
                    with_aggs(
                        nested("lots.bids"),
                        [(
                            "winning",
                            with_aggs(
                                filter(json!({"term": {WINNING_FIELD: true}})),
                                [(
                                    "bidders",
                                    with_aggs(
                                        nested("lots.bids.bidders"),
                                        [("top", top_bodies(BIDDER_ID_FIELD, BIDDER_NAME_FIELD))],
                                    ),
                                )],
                            ),
                        )],
                    ),
                )],
            ),
            Self::CountLotsBids => with_aggs(nested("lots"), [("bids", nested("lots.bids"))]),
            Self::LotsInTenders => histogram(LOTS_COUNT_FIELD, 1.0),
            Self::BidsInLots => NestedPathBinding::of(BIDS_COUNT_FIELD)
                .wrap_aggregation("counts", histogram(BIDS_COUNT_FIELD, 1.0)),
            Self::AvgPriceByBidder => NestedPathBinding::of(BIDDER_ID_FIELD).wrap_aggregation(
                "top",
                with_aggs(
                    terms(BIDDER_ID_FIELD, TOP_BUCKETS),
                    [(
                        "bid",
                        with_aggs(
                            reverse_nested(Some("lots.bids")),
                            [("avg", avg(BID_PRICE_FIELD))],
                        ),
                    )],
                ),
            ),
            Self::IndicatorsStats => NestedPathBinding::of(INDICATOR_TYPE_FIELD).wrap_aggregation(
                "types",
                with_aggs(
                    terms(INDICATOR_TYPE_FIELD, INDICATOR_BUCKETS),
                    [("avg", avg(INDICATOR_VALUE_FIELD))],
                ),
            ),
            Self::ProcedureTypes => terms(PROCEDURE_TYPE_FIELD, TOP_BUCKETS),
            Self::AvgScore => score_average(&params.name),
            Self::HistogramScore => with_aggs(
                year_histogram(DATE_FIELD),
                [("scores", score_average(&params.name))],
            ),
            Self::WeightedScore => {
                let weights = params.custom.clone().unwrap_or_default();
                let per_type: Vec<(&str, Value)> = weights
                    .keys()
                    .map(|name| (name.as_str(), score_filter(name)))
                    .collect();
                with_aggs(nested("ot.scores"), per_type)
            }
            Self::Terms => {
                let binding = NestedPathBinding::of(&params.name);
                let mut leaf = terms(&params.name, TERMS_BUCKETS);
                if binding.is_nested() {
                    leaf = with_aggs(leaf, [("tenders", reverse_nested(None))]);
                }
                binding.wrap_aggregation("terms", leaf)
            }
        }
    }

    fn parse(
        self,
        answer: &Value,
        params: &AggregationParams,
        ctx: &ParseContext,
    ) -> AggregationResult<StatValue> {
        match self {
            Self::Count => Ok(StatValue::Count(
                metric_value(answer)?.map_or(0, |v| v.max(0.0) as u64),
            )),
            Self::SumPrice | Self::AvgPrice => Ok(StatValue::number(metric_value(answer)?)),
            Self::Histogram | Self::LotsInTenders | Self::ProcedureTypes => {
                bucket_counts(answer)
            }
            Self::HistogramFinalPrice => bucket_map(answer, |bucket| {
                Ok(StatValue::number(metric_value(child(bucket, "sum")?)?))
            }),
            Self::SectorsStats => bucket_map(answer, |bucket| {
                let mut stats = BTreeMap::new();
                stats.insert("total".into(), StatValue::Count(doc_count(bucket)?));
                stats.insert(
                    "value".into(),
                    StatValue::number(metric_value(child(bucket, "sum")?)?),
                );
                stats.insert(
                    "avg".into(),
                    StatValue::number(metric_value(child(bucket, "avg")?)?),
                );
                Ok(StatValue::Map(stats))
            }),
            Self::RegionsStats => bucket_map(
                descend(REGION_FIELD, answer, "regions")?,
                |bucket| Ok(StatValue::Count(doc_count(child(bucket, "tenders")?)?)),
            ),
            Self::TopAuthorities => {
                parse_top_bodies(descend(BUYER_ID_FIELD, answer, "top")?, ctx)
            }
            Self::TopCompanies => {
                let bidders = child(child(child(answer, "bids")?, "winning")?, "bidders")?;
                parse_top_bodies(child(bidders, "top")?, ctx)
            }
            Self::CountLotsBids => {
                let mut stats = BTreeMap::new();
                stats.insert("lots".into(), StatValue::Count(doc_count(answer)?));
                stats.insert(
                    "bids".into(),
                    StatValue::Count(doc_count(child(answer, "bids")?)?),
                );
                Ok(StatValue::Map(stats))
            }
            Self::BidsInLots => bucket_counts(descend(BIDS_COUNT_FIELD, answer, "counts")?),
            Self::AvgPriceByBidder => bucket_map(
                descend(BIDDER_ID_FIELD, answer, "top")?,
                |bucket| {
                    let bid = child(bucket, "bid")?;
                    Ok(StatValue::number(metric_value(child(bid, "avg")?)?))
                },
            ),
            Self::IndicatorsStats => bucket_map(
                descend(INDICATOR_TYPE_FIELD, answer, "types")?,
                |bucket| Ok(StatValue::number(metric_value(child(bucket, "avg")?)?)),
            ),
            Self::AvgScore => {
                let mut stats = BTreeMap::new();
                if let Some(value) = parse_score_average(answer)? {
                    stats.insert(params.name.clone(), StatValue::Number(value));
                }
                Ok(StatValue::Map(stats))
            }
            Self::HistogramScore => bucket_map(answer, |bucket| {
                Ok(StatValue::number(parse_score_average(child(bucket, "scores")?)?))
            }),
            Self::WeightedScore => {
                let weights = params.custom.clone().unwrap_or_default();
                let pairs = weights
                    .iter()
                    .map(|(name, weight)| {
                        let avg = metric_value(child(child(answer, name)?, "avg")?)?;
                        Ok((avg, *weight))
                    })
                    .collect::<AggregationResult<Vec<_>>>()?;
                let mut stats = BTreeMap::new();
                if let Some(value) = weighted_average(pairs) {
                    stats.insert(params.name.clone(), StatValue::Number(value));
                }
                Ok(StatValue::Map(stats))
            }
            Self::Terms => {
                let binding = NestedPathBinding::of(&params.name);
                let node = descend(&params.name, answer, "terms")?;
                bucket_map(node, |bucket| {
                    let count = if binding.is_nested() {
                        doc_count(child(bucket, "tenders")?)?
                    } else {
                        doc_count(bucket)?
                    };
                    Ok(StatValue::Count(count))
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared fragments and parsers
// ---------------------------------------------------------------------------

/// Terms on a body id with its name and the number of distinct tenders.
fn top_bodies(id_field: &str, name_field: &str) -> Value {
    with_aggs(
        terms(id_field, TOP_BUCKETS),
        [("names", terms(name_field, 1)), ("tenders", reverse_nested(None))],
    )
}

fn parse_top_bodies(node: &Value, ctx: &ParseContext) -> AggregationResult<StatValue> {
    let entries = buckets(node)?
        .iter()
        .map(|bucket| {
            let tenders = doc_count(child(bucket, "tenders")?)?;
            let name = match bucket.get("names") {
                Some(names) => buckets(names)?
                    .first()
                    .map(bucket_key)
                    .transpose()?,
                None => None,
            };
            Ok((bucket_key(bucket)?, name, tenders))
        })
        .collect::<AggregationResult<Vec<_>>>()?;

    let list = entries
        .into_iter()
        .sorted_by(|a, b| b.2.cmp(&a.2))
        .take(ctx.top_n)
        .map(|(id, name, tenders)| {
            let mut body = BTreeMap::new();
            body.insert("id".into(), StatValue::Text(id));
            body.insert("name".into(), name.map_or(StatValue::Null, StatValue::Text));
            body.insert("value".into(), StatValue::Count(tenders));
            StatValue::Map(body)
        })
        .collect();
    Ok(StatValue::List(list))
}

fn score_filter(name: &str) -> Value {
    with_aggs(
        filter(json!({"term": {SCORE_TYPE_FIELD: name}})),
        [("avg", avg(SCORE_VALUE_FIELD))],
    )
}

fn score_average(name: &str) -> Value {
    with_aggs(nested("ot.scores"), [("score", score_filter(name))])
}

fn parse_score_average(node: &Value) -> AggregationResult<Option<f64>> {
    metric_value(child(child(node, "score")?, "avg")?)
}

fn descend<'a>(field: &str, answer: &'a Value, leaf: &str) -> AggregationResult<&'a Value> {
    NestedPathBinding::of(field)
        .descend(answer, leaf)
        .ok_or_else(|| AggregationError::malformed(format!("missing sub-aggregation '{leaf}'")))
}

fn bucket_map(
    node: &Value,
    value_of: impl Fn(&Value) -> AggregationResult<StatValue>,
) -> AggregationResult<StatValue> {
    let map = buckets(node)?
        .iter()
        .map(|bucket| Ok((bucket_key(bucket)?, value_of(bucket)?)))
        .collect::<AggregationResult<BTreeMap<_, _>>>()?;
    Ok(StatValue::Map(map))
}

fn bucket_counts(node: &Value) -> AggregationResult<StatValue> {
    bucket_map(node, |bucket| Ok(StatValue::Count(doc_count(bucket)?)))
}

// ---------------------------------------------------------------------------
// Specs and the catalog
// ---------------------------------------------------------------------------

/// A registered aggregation: public id plus the kind implementing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSpec {
    pub id: String,
    pub kind: AggregationKind,
}

impl AggregationSpec {
    pub fn new(id: impl Into<String>, kind: AggregationKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn is_parameterized(&self) -> bool {
        self.kind.is_parameterized()
    }

    /// Fresh request fragment for this spec.
    pub fn request(&self, params: Option<&AggregationParams>) -> AggregationResult<Value> {
        let resolved = self.resolve(params)?;
        Ok(self.kind.request(&resolved))
    }

    /// Parse this spec's located answer node.
    pub fn parse(
        &self,
        answer: &Value,
        params: Option<&AggregationParams>,
        ctx: &ParseContext,
    ) -> AggregationResult<StatValue> {
        let resolved = self.resolve(params)?;
        self.kind.parse(answer, &resolved, ctx)
    }

    fn resolve(&self, params: Option<&AggregationParams>) -> AggregationResult<AggregationParams> {
        if !self.is_parameterized() {
            return Ok(AggregationParams::default());
        }
        let missing = |parameter| AggregationError::MissingParameter {
            id: self.id.clone(),
            parameter,
        };
        let params = params.ok_or_else(|| missing("name"))?;
        if params.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.kind == AggregationKind::WeightedScore && params.custom.is_none() {
            return Err(missing("custom"));
        }
        Ok(params.clone())
    }
}

/// Append-only registry of aggregation specs keyed by id.
#[derive(Debug, Clone, Default)]
pub struct AggregationCatalog {
    specs: BTreeMap<String, AggregationSpec>,
}

impl AggregationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every kind under its default id.
    pub fn builtin() -> Self {
        let specs = AggregationKind::ALL
            .iter()
            .map(|kind| {
                let id = kind.default_id();
                (id.to_string(), AggregationSpec::new(id, *kind))
            })
            .collect();
        Self { specs }
    }

    /// Register `kind` under `id`. Ids are never overwritten.
    pub fn register(&mut self, id: impl Into<String>, kind: AggregationKind) -> AggregationResult<()> {
        let id = id.into();
        if self.specs.contains_key(&id) {
            return Err(AggregationError::DuplicateAggregationId(id));
        }
        self.specs.insert(id.clone(), AggregationSpec::new(id, kind));
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> AggregationResult<&AggregationSpec> {
        self.specs
            .get(id)
            .ok_or_else(|| AggregationError::UnknownAggregation(id.to_string()))
    }

    pub fn specs(&self) -> impl Iterator<Item = &AggregationSpec> {
        self.specs.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Built-in catalog, read-only for the life of the process.
pub static CATALOG: Lazy<AggregationCatalog> = Lazy::new(AggregationCatalog::builtin);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique() {
        assert_eq!(CATALOG.len(), AggregationKind::ALL.len());
        for kind in AggregationKind::ALL {
            assert_eq!(CATALOG.lookup(kind.default_id()).unwrap().kind, kind);
        }
    }

    #[test]
    fn register_is_append_only() {
        let mut catalog = AggregationCatalog::new();
        catalog.register("tenders", AggregationKind::Count).unwrap();
        let err = catalog
            .register("tenders", AggregationKind::SumPrice)
            .unwrap_err();
        assert_eq!(err, AggregationError::DuplicateAggregationId("tenders".into()));
        assert_eq!(catalog.lookup("tenders").unwrap().kind, AggregationKind::Count);
    }

    #[test]
    fn unknown_lookup_fails() {
        assert_eq!(
            CATALOG.lookup("nope").unwrap_err(),
            AggregationError::UnknownAggregation("nope".into())
        );
    }

    #[test]
    fn parameterized_specs_require_parameters() {
        let spec = CATALOG.lookup("avg_score_para").unwrap();
        assert!(matches!(
            spec.request(None),
            Err(AggregationError::MissingParameter { parameter: "name", .. })
        ));
        assert!(matches!(
            spec.parse(&json!({}), None, &ParseContext::default()),
            Err(AggregationError::MissingParameter { .. })
        ));

        let weighted = CATALOG.lookup("weighted_score_para").unwrap();
        let err = weighted
            .request(Some(&AggregationParams::named("GOOD")))
            .unwrap_err();
        assert!(matches!(err, AggregationError::MissingParameter { parameter: "custom", .. }));
    }

    #[test]
    fn fixed_fragments_are_fresh_copies() {
        let spec = CATALOG.lookup("histogram").unwrap();
        let mut first = spec.request(None).unwrap();
        first["aggs"] = json!({"extra": {}});
        let second = spec.request(None).unwrap();
        assert!(second.get("aggs").is_none());
    }

    #[test]
    fn avg_score_keeps_key_only_when_non_null() {
        let spec = CATALOG.lookup("avg_score_para").unwrap();
        let params = AggregationParams::named("X");
        let ctx = ParseContext::default();

        let answer = json!({"doc_count": 4, "score": {"doc_count": 2, "avg": {"value": 61.5}}});
        let value = spec.parse(&answer, Some(&params), &ctx).unwrap();
        assert_eq!(value.as_map().unwrap().len(), 1);
        assert_eq!(value.get("X"), Some(&StatValue::Number(61.5)));

        let empty = json!({"doc_count": 0, "score": {"doc_count": 0, "avg": {"value": null}}});
        let value = spec.parse(&empty, Some(&params), &ctx).unwrap();
        assert!(value.as_map().unwrap().is_empty());
    }

    #[test]
    fn weighted_score_combines_per_type_averages() {
        let spec = CATALOG.lookup("weighted_score_para").unwrap();
        let mut weights = BTreeMap::new();
        weights.insert("INTEGRITY".to_string(), 3.0);
        weights.insert("TRANSPARENCY".to_string(), 1.0);
        let params = AggregationParams::named("GOOD").with_weights(weights);

        let request = spec.request(Some(&params)).unwrap();
        assert_eq!(request["nested"]["path"], "ot.scores");
        assert!(request["aggs"]["INTEGRITY"]["filter"].is_object());

        let answer = json!({
            "doc_count": 10,
            "INTEGRITY": {"doc_count": 5, "avg": {"value": 80.0}},
            "TRANSPARENCY": {"doc_count": 5, "avg": {"value": 40.0}}
        });
        let value = spec.parse(&answer, Some(&params), &ParseContext::default()).unwrap();
        assert_eq!(value.get("GOOD"), Some(&StatValue::Number(70.0)));
    }

    #[test]
    fn top_authorities_sorted_and_truncated() {
        let spec = CATALOG.lookup("top_authorities").unwrap();
        let answer = json!({"doc_count": 30, "top": {"buckets": [
            {"key": "b1", "doc_count": 12, "names": {"buckets": [{"key": "Town of A", "doc_count": 12}]}, "tenders": {"doc_count": 4}},
            {"key": "b2", "doc_count": 10, "names": {"buckets": []}, "tenders": {"doc_count": 9}},
            {"key": "b3", "doc_count": 8, "names": {"buckets": [{"key": "Region C", "doc_count": 8}]}, "tenders": {"doc_count": 6}}
        ]}});
        let ctx = ParseContext {
            top_n: 2,
            total_hits: None,
        };
        let value = spec.parse(&answer, None, &ctx).unwrap();
        let list = value.as_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].get("id"), Some(&StatValue::Text("b2".into())));
        assert_eq!(list[0].get("name"), Some(&StatValue::Null));
        assert_eq!(list[1].get("value"), Some(&StatValue::Count(6)));
    }

    #[test]
    fn terms_para_wraps_nested_fields() {
        let spec = CATALOG.lookup("terms_para").unwrap();
        let params = AggregationParams::named("buyers.buyerType");
        let request = spec.request(Some(&params)).unwrap();
        assert_eq!(request["nested"]["path"], "buyers");
        assert!(request["aggs"]["terms"]["aggs"]["tenders"]["reverse_nested"].is_object());

        let answer = json!({"doc_count": 5, "terms": {"buckets": [
            {"key": "MUNICIPALITY", "doc_count": 5, "tenders": {"doc_count": 3}}
        ]}});
        let value = spec.parse(&answer, Some(&params), &ParseContext::default()).unwrap();
        assert_eq!(value.get("MUNICIPALITY"), Some(&StatValue::Count(3)));
    }

    #[test]
    fn sectors_stats_reads_sum_and_avg() {
        let spec = CATALOG.lookup("sectors_stats").unwrap();
        let answer = json!({"buckets": [
            {"key": "45", "doc_count": 2, "sum": {"value": 300.0}, "avg": {"value": 150.0}}
        ]});
        let value = spec.parse(&answer, None, &ParseContext::default()).unwrap();
        let sector = value.get("45").unwrap();
        assert_eq!(sector.get("total"), Some(&StatValue::Count(2)));
        assert_eq!(sector.get("value"), Some(&StatValue::Number(300.0)));
    }

    #[test]
    fn malformed_answer_is_reported() {
        let spec = CATALOG.lookup("procedure_types").unwrap();
        let err = spec
            .parse(&json!({"value": 3}), None, &ParseContext::default())
            .unwrap_err();
        assert!(matches!(err, AggregationError::MalformedAnswer { .. }));
    }
}

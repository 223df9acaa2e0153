//! End-to-end tests of the aggregation path: compile, inject, answer, parse.

use proptest::prelude::*;
use serde_json::{Value, json};
use tender_analytics::analytics::{
    AggregationCompiler, AggregationError, AggregationKind, AggregationParams, AggregationRef,
    CATALOG, FilterKind, NestedFilterInjector, ParseContext, QueryFilter, ResultNormalizer,
    StatValue, StatsQuery,
};

fn fixed_ids() -> Vec<&'static str> {
    AggregationKind::ALL
        .iter()
        .filter(|kind| !kind.is_parameterized())
        .map(|kind| kind.default_id())
        .collect()
}

fn refs(ids: &[&str]) -> Vec<AggregationRef> {
    ids.iter().map(|id| AggregationRef::plain(*id)).collect()
}

// =============================================================================
// Composite shape
// =============================================================================

proptest! {
    #[test]
    fn n_ids_give_n_request_keys_and_n_results(
        picked in proptest::sample::subsequence(fixed_ids(), 1..=15)
    ) {
        let compiled = AggregationCompiler::default().compile(&refs(&picked)).unwrap();
        prop_assert_eq!(compiled.request().len(), picked.len());
        for id in &picked {
            prop_assert!(compiled.request().contains_key(*id));
        }

        // An empty answer still yields one key per id.
        let stats = compiled.parse(&json!({}), &ParseContext::default()).unwrap();
        prop_assert_eq!(stats.len(), picked.len());
        prop_assert!(stats.values().all(StatValue::is_null));
    }
}

#[test]
fn compiled_request_snapshot() {
    let compiled = AggregationCompiler::default()
        .compile(&refs(&["regions_stats"]))
        .unwrap()
        .with_filters(&[QueryFilter::term("buyers.address.ot.nutscode", ["CZ01"])])
        .unwrap();
    let text = serde_json::to_string_pretty(&compiled.to_value()).unwrap();
    insta::assert_snapshot!(text, @r#"
    {
      "regions_stats": {
        "aggs": {
          "regions_stats_filter": {
            "aggs": {
              "regions": {
                "aggs": {
                  "tenders": {
                    "reverse_nested": {}
                  }
                },
                "terms": {
                  "field": "buyers.address.ot.nutscode",
                  "size": 500
                }
              }
            },
            "filter": {
              "term": {
                "buyers.address.ot.nutscode": "CZ01"
              }
            }
          }
        },
        "nested": {
          "path": "buyers"
        }
      }
    }
    "#);
}

#[test]
fn every_builtin_compiles_with_parameters_where_needed() {
    let mut weights = std::collections::BTreeMap::new();
    weights.insert("INTEGRITY".to_string(), 1.0);
    let all: Vec<AggregationRef> = CATALOG
        .specs()
        .map(|spec| {
            if spec.is_parameterized() {
                let name = if spec.kind == AggregationKind::Terms { "buyers.buyerType" } else { "TENDER" };
                AggregationRef::with_params(
                    spec.id.clone(),
                    AggregationParams::named(name).with_weights(weights.clone()),
                )
            } else {
                AggregationRef::plain(spec.id.clone())
            }
        })
        .collect();
    let compiled = AggregationCompiler::default().compile(&all).unwrap();
    assert_eq!(compiled.len(), CATALOG.len());
}

// =============================================================================
// Injection and unwrapping
// =============================================================================

#[test]
fn injection_without_shared_path_is_identity() {
    let compiled = AggregationCompiler::default()
        .compile(&refs(&["top_companies", "sectors_stats", "count"]))
        .unwrap();
    let filters = vec![
        QueryFilter::term("buyers.address.ot.nutscode", ["CZ01"]),
        QueryFilter::term("country", ["CZ"]),
    ];
    let injection = NestedFilterInjector::new(&filters).inject(compiled.request()).unwrap();
    assert_eq!(&injection.request, compiled.request());
    assert!(injection.scopes.values().all(|scope| !scope.is_wrapped()));
}

#[test]
fn reinjecting_a_wrapped_tree_fails_loudly() {
    let compiled = AggregationCompiler::default()
        .compile(&refs(&["top_authorities"]))
        .unwrap();
    let filters = vec![QueryFilter::term("buyers.id", ["b1"])];
    let injector = NestedFilterInjector::new(&filters);
    let once = injector.inject(compiled.request()).unwrap();
    assert!(matches!(
        injector.inject(&once.request),
        Err(AggregationError::AlreadyWrapped(_))
    ));
}

#[test]
fn wrapped_and_plain_answers_parse_identically() {
    let filters = vec![QueryFilter::term("buyers.address.ot.nutscode", ["CZ064"])];
    let compiled = AggregationCompiler::default()
        .compile(&refs(&["regions_stats"]))
        .unwrap();
    let wrapped = compiled.clone().with_filters(&filters).unwrap();

    let inner = json!({
        "doc_count": 3,
        "regions": {"buckets": [{"key": "CZ064", "doc_count": 3, "tenders": {"doc_count": 2}}]}
    });
    let plain_answer = json!({"regions_stats": inner});
    let wrapped_answer = json!({"regions_stats": {"doc_count": 40, "regions_stats_filter": inner}});

    let scopes = wrapped.scopes().unwrap();
    let located = ResultNormalizer::new(scopes)
        .locate(&wrapped_answer, "regions_stats")
        .unwrap()
        .unwrap();
    assert_eq!(&*located, &inner);

    let ctx = ParseContext::default();
    assert_eq!(
        wrapped.parse(&wrapped_answer, &ctx).unwrap(),
        compiled.parse(&plain_answer, &ctx).unwrap()
    );
}

#[test]
fn score_histogram_is_unwrapped_inside_every_bucket() {
    let filters = vec![QueryFilter::new(
        "TENDER",
        FilterKind::Weighted,
        vec![json!(50), Value::Null],
    )];
    let reference = AggregationRef::with_params("histogram_score_para", AggregationParams::named("TENDER"));
    let query = StatsQuery::new(&AggregationCompiler::default(), &[reference], filters).unwrap();

    let body = query.body().unwrap();
    let scores = &body["aggs"]["histogram_score_para"]["aggs"]["scores"];
    assert_eq!(scores["nested"]["path"], "ot.scores");
    assert!(scores["aggs"]["scores_filter"]["filter"]["bool"]["must"].is_array());

    let response = json!({
        "hits": {"total": {"value": 7}},
        "aggregations": {"histogram_score_para": {"buckets": [
            {"key": 1420070400000_i64, "key_as_string": "2015", "doc_count": 4,
             "scores": {"doc_count": 12, "scores_filter": {"doc_count": 4,
                "score": {"doc_count": 4, "avg": {"value": 64.0}}}}},
            {"key": 1451606400000_i64, "key_as_string": "2016", "doc_count": 3,
             "scores": {"doc_count": 9, "scores_filter": {"doc_count": 0,
                "score": {"doc_count": 0, "avg": {"value": null}}}}}
        ]}}
    });
    let stats = query.normalize(&response, &ParseContext::default()).unwrap();
    let per_year = stats["histogram_score_para"].as_map().unwrap();
    assert_eq!(per_year["2015"], StatValue::Number(64.0));
    assert_eq!(per_year["2016"], StatValue::Null);
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn avg_score_para_names_its_single_key() {
    let reference = AggregationRef::with_params("avg_score_para", AggregationParams::named("X"));
    let compiled = AggregationCompiler::default().compile(&[reference]).unwrap();
    let ctx = ParseContext::default();

    let present = json!({"avg_score_para": {"doc_count": 3, "score": {"doc_count": 3, "avg": {"value": 71.25}}}});
    let stats = compiled.parse(&present, &ctx).unwrap();
    let map = stats["avg_score_para"].as_map().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["X"]);
    assert_eq!(map["X"], StatValue::Number(71.25));

    let null = json!({"avg_score_para": {"doc_count": 0, "score": {"doc_count": 0, "avg": {"value": null}}}});
    let stats = compiled.parse(&null, &ctx).unwrap();
    assert!(stats["avg_score_para"].as_map().unwrap().is_empty());
}

#[test]
fn full_response_normalizes_to_flat_statistics() {
    let query = StatsQuery::new(
        &AggregationCompiler::default(),
        &refs(&["count", "histogram", "count_lots_bids", "top_companies"]),
        vec![QueryFilter::term("lots.bids.isWinning", [true])],
    )
    .unwrap();

    // The winning filter shares the bids level, so the bids node is wrapped.
    let body = query.body().unwrap();
    assert!(body["aggs"]["top_companies"]["aggs"]["bids"]["aggs"]["bids_filter"].is_object());
    assert!(body["aggs"]["count_lots_bids"]["aggs"]["bids"]["aggs"]["bids_filter"].is_object());

    let response = json!({
        "hits": {"total": 2},
        "aggregations": {
            "count": {"value": 2},
            "histogram": {"buckets": [
                {"key_as_string": "2016", "key": 1451606400000_i64, "doc_count": 2}
            ]},
            "count_lots_bids": {"doc_count": 3, "bids": {"doc_count": 8, "bids_filter": {"doc_count": 2}}},
            "top_companies": {"doc_count": 3, "bids": {"doc_count": 8, "bids_filter": {
                "doc_count": 2,
                "winning": {"doc_count": 2, "bidders": {"doc_count": 2, "top": {"buckets": [
                    {"key": "c1", "doc_count": 2,
                     "names": {"buckets": [{"key": "Stavby a.s.", "doc_count": 2}]},
                     "tenders": {"doc_count": 2}}
                ]}}}
            }}}
        }
    });
    let stats = query.normalize(&response, &ParseContext::default()).unwrap();
    assert_eq!(stats["count"], StatValue::Count(2));
    assert_eq!(stats["histogram"].get("2016"), Some(&StatValue::Count(2)));
    assert_eq!(stats["count_lots_bids"].get("bids"), Some(&StatValue::Count(2)));
    let top = stats["top_companies"].as_list().unwrap();
    assert_eq!(top[0].get("name"), Some(&StatValue::Text("Stavby a.s.".into())));

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["count_lots_bids"], json!({"bids": 2, "lots": 3}));
}

#[test]
fn malformed_answer_names_the_aggregation() {
    let compiled = AggregationCompiler::default()
        .compile(&refs(&["sectors_stats"]))
        .unwrap();
    let err = compiled
        .parse(&json!({"sectors_stats": {"value": 1}}), &ParseContext::default())
        .unwrap_err();
    assert!(matches!(
        err,
        AggregationError::MalformedAnswer { ref id, .. } if id == "sectors_stats"
    ));
}

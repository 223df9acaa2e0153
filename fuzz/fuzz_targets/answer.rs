//! Fuzz target for normalizing engine answers.
//!
//! Parsing a hostile answer for the whole catalog may fail with
//! `MalformedAnswer`, but must never panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tender_analytics::analytics::{
    AggregationCompiler, AggregationKind, AggregationParams, AggregationRef, ParseContext,
    QueryFilter,
};

#[derive(Arbitrary, Debug)]
struct AnswerInput {
    /// Raw JSON of the `aggregations` object
    json_content: String,
    /// Inject a buyers-level filter before parsing
    filtered: bool,
    top_n: u8,
}

fuzz_target!(|input: AnswerInput| {
    let Ok(answer) = serde_json::from_str::<serde_json::Value>(&input.json_content) else {
        return;
    };
    let refs: Vec<AggregationRef> = AggregationKind::ALL
        .iter()
        .map(|kind| {
            if kind.is_parameterized() {
                let mut weights = std::collections::BTreeMap::new();
                weights.insert("TENDER".to_string(), 1.0);
                AggregationRef::with_params(
                    kind.default_id(),
                    AggregationParams::named("TENDER").with_weights(weights),
                )
            } else {
                AggregationRef::plain(kind.default_id())
            }
        })
        .collect();
    let Ok(mut compiled) = AggregationCompiler::default().compile(&refs) else {
        return;
    };
    if input.filtered {
        let filters = [QueryFilter::term("buyers.id", ["b1"])];
        compiled = match compiled.with_filters(&filters) {
            Ok(compiled) => compiled,
            Err(_) => return,
        };
    }
    let ctx = ParseContext {
        top_n: usize::from(input.top_n),
        total_hits: None,
    };
    let _ = compiled.parse(&answer, &ctx);
});

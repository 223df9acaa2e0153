//! Fuzz target for flattening arbitrary JSON documents.
//!
//! Any document that parses as JSON must flatten into rows of header width,
//! whatever its shape, and every row must encode without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tender_analytics::export::{ColumnCodec, EntityKind, flatten};

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let codec = ColumnCodec::default();
    for kind in [EntityKind::Tender, EntityKind::Lot] {
        let block = kind.block();
        for row in flatten(block, &doc, &codec) {
            assert_eq!(row.len(), block.width());
            let _ = codec.encode_line(&row);
        }
    }
});

use serde_json::{Value, json};
use std::path::PathBuf;
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct TempFixtureDir {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TempFixtureDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write `content` to `name` inside the directory and return its path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write fixture");
        path
    }
}

// =============================================================================
// Tender fixtures
// =============================================================================

/// Builder for synthetic tender documents.
#[allow(dead_code)]
pub struct TenderFixture {
    doc: Value,
}

#[allow(dead_code)]
impl TenderFixture {
    pub fn new(id: &str) -> Self {
        Self {
            doc: json!({
                "id": id,
                "title": format!("Tender {id}"),
                "country": "CZ",
                "procedureType": "OPEN",
                "ot": {"date": "2016-03-01T00:00:00", "cpv": "45000000", "cpv_divisions": ["45"]},
                "finalPrice": {"netAmount": 1000.5, "currency": "CZK", "netAmountEur": 37.0},
                "isEUFunded": false,
            }),
        }
    }

    pub fn buyer(mut self, id: &str, name: &str) -> Self {
        self.push(
            "buyers",
            json!({"id": id, "name": name, "address": {"city": "Brno", "ot": {"nutscode": "CZ064"}}}),
        );
        self
    }

    /// Lot whose bids have the given bidder counts.
    pub fn lot(mut self, bidders_per_bid: &[usize]) -> Self {
        let bids: Vec<Value> = bidders_per_bid
            .iter()
            .enumerate()
            .map(|(b, &n)| {
                let bidders: Vec<Value> = (0..n)
                    .map(|i| json!({"id": format!("c{b}-{i}"), "name": format!("Company {b}/{i}")}))
                    .collect();
                json!({"isWinning": b == 0, "price": {"netAmountEur": 10.0 * (b + 1) as f64}, "bidders": bidders})
            })
            .collect();
        let number = self.doc.get("lots").and_then(Value::as_array).map_or(0, Vec::len) + 1;
        self.push("lots", json!({"lotNumber": number, "title": format!("Lot {number}"), "bids": bids}));
        self
    }

    pub fn set(mut self, field: &str, value: Value) -> Self {
        self.doc[field] = value;
        self
    }

    pub fn build(self) -> Value {
        self.doc
    }

    fn push(&mut self, field: &str, item: Value) {
        match self.doc.get_mut(field).and_then(Value::as_array_mut) {
            Some(items) => items.push(item),
            None => self.doc[field] = json!([item]),
        }
    }
}

// =============================================================================
// CSV reading
// =============================================================================

/// Minimal RFC 4180 reader: quoted fields, doubled quotes, `\n` or `\r\n`
/// record terminators.
#[allow(dead_code)]
pub fn parse_csv(text: &str, delimiter: char, quote: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == quote {
                if chars.peek() == Some(&quote) {
                    field.push(quote);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            c if c == quote => in_quotes = true,
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

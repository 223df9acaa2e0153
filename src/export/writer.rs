//! CSV output and the streaming export engine.

use std::io::{BufRead, BufWriter, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::block::Block;
use super::codec::ColumnCodec;
use super::flatten::{Row, flatten};

pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to read input: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write output: {0}")]
    Write(#[source] std::io::Error),

    #[error("export cancelled after {0} records")]
    Cancelled(usize),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// Escapes and writes rows through a buffered writer.
pub struct CsvWriter<W: Write> {
    inner: BufWriter<W>,
    codec: ColumnCodec,
    rows_written: usize,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W, codec: ColumnCodec) -> Self {
        Self {
            inner: BufWriter::new(inner),
            codec,
            rows_written: 0,
        }
    }

    pub fn write_header(&mut self, block: &Block) -> ExportResult<()> {
        let line = self.codec.encode_line(&block.header());
        self.inner.write_all(line.as_bytes()).map_err(ExportError::Write)
    }

    pub fn write_rows(&mut self, rows: &[Row]) -> ExportResult<()> {
        for row in rows {
            let line = self.codec.encode_line(row);
            self.inner.write_all(line.as_bytes()).map_err(ExportError::Write)?;
            self.rows_written += 1;
        }
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> ExportResult<W> {
        self.inner
            .into_inner()
            .map_err(|e| ExportError::Write(e.into_error()))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportStats {
    pub records_read: usize,
    pub records_skipped: usize,
    pub rows_written: usize,
}

/// Streams JSON-lines documents into CSV rows for one block tree.
pub struct ExportEngine<'b> {
    block: &'b Block,
    codec: ColumnCodec,
    batch_size: usize,
}

impl<'b> ExportEngine<'b> {
    pub fn new(block: &'b Block, codec: ColumnCodec) -> Self {
        Self {
            block,
            codec,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Flatten documents in parallel. Output order follows input order.
    pub fn flatten_batch(&self, documents: &[Value]) -> Vec<Vec<Row>> {
        documents
            .par_iter()
            .map(|doc| flatten(self.block, doc, &self.codec))
            .collect()
    }

    /// Render documents to a complete CSV text, header included.
    pub fn render(&self, documents: &[Value]) -> ExportResult<String> {
        let mut writer = CsvWriter::new(Vec::new(), self.codec.clone());
        writer.write_header(self.block)?;
        for rows in self.flatten_batch(documents) {
            writer.write_rows(&rows)?;
        }
        let bytes = writer.finish()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read one JSON document per line from `input` and write CSV to `output`.
    ///
    /// Unparsable lines are logged and skipped. `progress` receives
    /// `(records_read, rows_written)` after every batch; clearing `running`
    /// stops the export before the next batch.
    pub fn execute<R, W, F>(
        &self,
        input: R,
        output: W,
        progress: F,
        running: Option<Arc<AtomicBool>>,
    ) -> ExportResult<ExportStats>
    where
        R: BufRead,
        W: Write,
        F: Fn(usize, usize),
    {
        let mut writer = CsvWriter::new(output, self.codec.clone());
        writer.write_header(self.block)?;

        let mut stats = ExportStats::default();
        let mut batch: Vec<Value> = Vec::with_capacity(self.batch_size);

        for (line_no, raw) in input.split(b'\n').enumerate() {
            let mut raw = raw.map_err(ExportError::Read)?;
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    stats.records_read += 1;
                    stats.records_skipped += 1;
                    warn!(line = line_no + 1, error = %e, "skipping record with invalid UTF-8");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            stats.records_read += 1;
            match serde_json::from_str::<Value>(&line) {
                Ok(doc @ Value::Object(_)) => batch.push(doc),
                Ok(other) => {
                    warn!(line = line_no + 1, kind = %json_kind(&other), "skipping non-object record");
                    stats.records_skipped += 1;
                }
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, "skipping malformed record");
                    stats.records_skipped += 1;
                }
            }

            if batch.len() >= self.batch_size {
                self.write_batch(&mut writer, &mut batch, &stats, &progress, running.as_ref())?;
            }
        }
        if !batch.is_empty() {
            self.write_batch(&mut writer, &mut batch, &stats, &progress, running.as_ref())?;
        }

        stats.rows_written = writer.rows_written();
        writer.finish()?;
        info!(
            records = stats.records_read,
            skipped = stats.records_skipped,
            rows = stats.rows_written,
            "export finished"
        );
        Ok(stats)
    }

    fn write_batch<W: Write, F: Fn(usize, usize)>(
        &self,
        writer: &mut CsvWriter<W>,
        batch: &mut Vec<Value>,
        stats: &ExportStats,
        progress: &F,
        running: Option<&Arc<AtomicBool>>,
    ) -> ExportResult<()> {
        if let Some(r) = running
            && !r.load(Ordering::Relaxed)
        {
            return Err(ExportError::Cancelled(stats.records_read - batch.len()));
        }
        debug!(documents = batch.len(), "flattening batch");
        for rows in self.flatten_batch(batch) {
            writer.write_rows(&rows)?;
        }
        batch.clear();
        progress(stats.records_read, writer.rows_written());
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

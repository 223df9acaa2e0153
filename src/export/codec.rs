//! Column codec: type-driven cell formatting and CSV escaping.
//!
//! Every exported cell goes through [`ColumnCodec::format`], which turns one
//! JSON value into text according to the column's declared [`ColumnType`].
//! Values that do not match their declared type are logged as format warnings
//! and emitted as empty cells, so one malformed field never aborts an export.

use std::borrow::Cow;
use std::fmt::Write;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::model::{Indicator, Price, Score, find_keyed};

/// Which amount of a money record a price column extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    NetAmount,
    Currency,
    MinNetAmount,
    MaxNetAmount,
    /// Amount normalized to EUR.
    NetAmountEur,
}

/// Declared type of a field column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    String,
    /// List of strings, joined with the list separator.
    Strings,
    Bool,
    Date,
    Number,
    /// Size of a collection.
    Count,
    /// Length of a text in characters.
    Length,
    Price(PriceField),
    /// Value of the indicator with this type key in an indicator list.
    Indicator(String),
    /// Value of the score with this type key in a score list.
    Score(String),
}

impl ColumnType {
    fn expected(&self) -> &'static str {
        match self {
            Self::String | Self::Length => "string",
            Self::Strings => "string list",
            Self::Bool => "boolean",
            Self::Date => "date",
            Self::Number => "number",
            Self::Count => "array",
            Self::Price(_) => "price object",
            Self::Indicator(_) => "indicator list",
            Self::Score(_) => "score list",
        }
    }
}

/// Text-level settings of the export format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    pub delimiter: char,
    pub quote: char,
    pub line_terminator: String,
    /// Replace embedded newlines with the two characters `\n` before quoting,
    /// keeping one record per physical line.
    pub escape_newlines: bool,
    pub true_literal: String,
    pub false_literal: String,
    /// strftime pattern for date columns.
    pub date_format: String,
    pub list_separator: String,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            line_terminator: "\n".to_string(),
            escape_newlines: true,
            true_literal: "true".to_string(),
            false_literal: "false".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            list_separator: ",".to_string(),
        }
    }
}

impl CodecOptions {
    /// Reject settings that would produce unreadable output.
    pub fn validate(&self) -> Result<(), String> {
        if self.delimiter == self.quote {
            return Err("delimiter and quote character must differ".into());
        }
        if matches!(self.delimiter, '\n' | '\r') || matches!(self.quote, '\n' | '\r') {
            return Err("delimiter and quote cannot be line breaks".into());
        }
        if self.line_terminator.is_empty() {
            return Err("line terminator cannot be empty".into());
        }
        // Time specifiers parse but cannot render a plain date.
        let sample = NaiveDate::from_ymd_opt(2016, 3, 1).unwrap_or_default();
        let mut rendered = String::new();
        if write!(rendered, "{}", sample.format(&self.date_format)).is_err() {
            return Err(format!("invalid date format '{}'", self.date_format));
        }
        Ok(())
    }
}

/// Formats and escapes cells. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct ColumnCodec {
    options: CodecOptions,
}

impl ColumnCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Format one value. `column` only labels warnings.
    pub fn format(&self, column: &str, value: Option<&Value>, kind: &ColumnType) -> String {
        let value = match value {
            None | Some(Value::Null) => return String::new(),
            Some(v) => v,
        };
        match kind {
            ColumnType::String => match value {
                Value::String(s) => s.clone(),
                other => format_warning(column, kind, other),
            },
            ColumnType::Strings => self.format_strings(column, value, kind),
            ColumnType::Bool => match value {
                Value::Bool(true) => self.options.true_literal.clone(),
                Value::Bool(false) => self.options.false_literal.clone(),
                other => format_warning(column, kind, other),
            },
            ColumnType::Date => match value.as_str().and_then(parse_date) {
                Some(date) => {
                    let mut text = String::new();
                    match write!(text, "{}", date.format(&self.options.date_format)) {
                        Ok(()) => text,
                        Err(_) => format_warning(column, kind, value),
                    }
                }
                None => format_warning(column, kind, value),
            },
            ColumnType::Number => match value {
                Value::Number(n) => format_number(n),
                other => format_warning(column, kind, other),
            },
            ColumnType::Count => match value {
                Value::Array(items) => items.len().to_string(),
                other => format_warning(column, kind, other),
            },
            ColumnType::Length => match value {
                Value::String(s) => s.chars().count().to_string(),
                other => format_warning(column, kind, other),
            },
            ColumnType::Price(field) => match serde_json::from_value::<Price>(value.clone()) {
                Ok(price) if value.is_object() => format_price(&price, *field),
                _ => format_warning(column, kind, value),
            },
            ColumnType::Indicator(key) => match keyed_entry::<Indicator>(value, key) {
                Ok(found) => found
                    .and_then(|ind| ind.value)
                    .map(format_float)
                    .unwrap_or_default(),
                Err(()) => format_warning(column, kind, value),
            },
            ColumnType::Score(key) => match keyed_entry::<Score>(value, key) {
                Ok(found) => found
                    .and_then(|score| score.value)
                    .map(format_float)
                    .unwrap_or_default(),
                Err(()) => format_warning(column, kind, value),
            },
        }
    }

    fn format_strings(&self, column: &str, value: &Value, kind: &ColumnType) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => parts.push(s.as_str()),
                        Value::Null => {}
                        other => {
                            return format_warning(column, kind, other);
                        }
                    }
                }
                parts.join(&self.options.list_separator)
            }
            other => format_warning(column, kind, other),
        }
    }

    /// Quote a cell when it contains the delimiter, the quote or a line break.
    pub fn escape<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let opts = &self.options;
        let needs_quoting = text
            .chars()
            .any(|c| c == opts.delimiter || c == opts.quote || c == '\n' || c == '\r');
        if !needs_quoting {
            return Cow::Borrowed(text);
        }

        let body: Cow<'_, str> = if opts.escape_newlines && text.contains('\n') {
            Cow::Owned(text.replace("\r\n", "\\n").replace('\n', "\\n"))
        } else {
            Cow::Borrowed(text)
        };

        let mut out = String::with_capacity(body.len() + 2);
        out.push(opts.quote);
        for c in body.chars() {
            if c == opts.quote {
                out.push(opts.quote);
            }
            out.push(c);
        }
        out.push(opts.quote);
        Cow::Owned(out)
    }

    /// Render one record, escaped and terminated.
    pub fn encode_line<S: AsRef<str>>(&self, cells: &[S]) -> String {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                line.push(self.options.delimiter);
            }
            line.push_str(&self.escape(cell.as_ref()));
        }
        line.push_str(&self.options.line_terminator);
        line
    }
}

/// Deserialize only the entry of a keyed list whose `type` matches.
/// `Err` when the value is not a list or the matching entry is malformed.
fn keyed_entry<T: serde::de::DeserializeOwned>(value: &Value, key: &str) -> Result<Option<T>, ()> {
    let entries = value.as_array().ok_or(())?;
    match find_keyed(entries, key) {
        Some(entry) => serde_json::from_value(entry.clone()).map(Some).map_err(|_| ()),
        None => Ok(None),
    }
}

fn format_warning(column: &str, kind: &ColumnType, found: &Value) -> String {
    warn!(
        column,
        expected = kind.expected(),
        found = json_kind(found),
        "format warning: cell emitted empty"
    );
    String::new()
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

fn format_price(price: &Price, field: PriceField) -> String {
    let amount = match field {
        PriceField::Currency => return price.currency.clone().unwrap_or_default(),
        PriceField::NetAmount => price.net_amount,
        PriceField::MinNetAmount => price.min_net_amount,
        PriceField::MaxNetAmount => price.max_net_amount,
        PriceField::NetAmountEur => price.net_amount_eur,
    };
    amount.map(format_float).unwrap_or_default()
}

fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map(format_float).unwrap_or_default()
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() { f.to_string() } else { String::new() }
}

/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` and plain dates.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

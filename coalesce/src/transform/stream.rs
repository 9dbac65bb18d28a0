//! Row sources and sinks.
//!
//! The step pulls rows from a [`RowSource`] until it returns `None` and
//! hands every transformed row to a [`RowSink`].

use serde_json::{Map, Value as JsonValue};
use std::io::Write;

use crate::error::{StepError, StepResult};
use crate::models::{Row, RowMeta};

/// Supplies rows and the schema they are aligned with.
pub trait RowSource {
    fn row_meta(&self) -> &RowMeta;

    /// Next row, `None` once the stream is exhausted.
    fn next_row(&mut self) -> StepResult<Option<Row>>;
}

/// Receives transformed rows.
pub trait RowSink {
    fn put_row(&mut self, meta: &RowMeta, row: Row) -> StepResult<()>;

    /// Called once after the last row.
    fn finish(&mut self) -> StepResult<()> {
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Serves rows held in memory.
#[derive(Debug, Clone)]
pub struct VecRowSource {
    meta: RowMeta,
    rows: std::vec::IntoIter<Row>,
}

impl VecRowSource {
    pub fn new(meta: RowMeta, rows: Vec<Row>) -> Self {
        Self {
            meta,
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for VecRowSource {
    fn row_meta(&self) -> &RowMeta {
        &self.meta
    }

    fn next_row(&mut self) -> StepResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

/// Keeps every row it receives.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub meta: Option<RowMeta>,
    pub rows: Vec<Row>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected rows as JSON objects keyed by field name.
    pub fn to_json(&self) -> JsonValue {
        match &self.meta {
            Some(meta) => rows_to_json(meta, &self.rows),
            None => JsonValue::Array(Vec::new()),
        }
    }
}

impl RowSink for CollectingSink {
    fn put_row(&mut self, meta: &RowMeta, row: Row) -> StepResult<()> {
        if self.meta.is_none() {
            self.meta = Some(meta.clone());
        }
        self.rows.push(row);
        Ok(())
    }
}

/// Convert rows to an array of JSON objects. Nulls become JSON `null`.
pub fn rows_to_json(meta: &RowMeta, rows: &[Row]) -> JsonValue {
    let records = rows
        .iter()
        .map(|row| {
            let mut record = Map::new();
            for (field, value) in meta.fields().iter().zip(row.iter()) {
                let json = match value {
                    Some(v) => serde_json::to_value(v).unwrap_or(JsonValue::Null),
                    None => JsonValue::Null,
                };
                record.insert(field.name.clone(), json);
            }
            JsonValue::Object(record)
        })
        .collect();
    JsonValue::Array(records)
}

// =============================================================================
// CSV
// =============================================================================

/// Writes rows as CSV. The header is written with the first row.
///
/// A null is written as an empty cell, an empty string as `""`, so the
/// parser reads both back unchanged.
pub struct CsvRowSink<W: Write> {
    writer: csv::Writer<W>,
    delimiter: u8,
    typed_header: bool,
    header_written: bool,
}

impl<W: Write> CsvRowSink<W> {
    pub fn new(inner: W, delimiter: u8) -> Self {
        // fields are quoted by `quote_field`
        let writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(inner);
        Self {
            writer,
            delimiter,
            typed_header: false,
            header_written: false,
        }
    }

    /// Also write a second header line with the field types.
    pub fn with_typed_header(mut self, typed_header: bool) -> Self {
        self.typed_header = typed_header;
        self
    }

    /// Write the header for `meta` if it has not been written yet.
    pub fn write_header(&mut self, meta: &RowMeta) -> StepResult<()> {
        if self.header_written {
            return Ok(());
        }
        let names: Vec<String> = meta
            .names()
            .into_iter()
            .map(|name| quote_field(name, self.delimiter))
            .collect();
        self.writer.write_record(&names).map_err(sink_error)?;
        if self.typed_header {
            self.writer
                .write_record(meta.fields().iter().map(|f| f.value_type.as_str()))
                .map_err(sink_error)?;
        }
        self.header_written = true;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> StepResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| StepError::Sink(e.to_string()))
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn put_row(&mut self, meta: &RowMeta, row: Row) -> StepResult<()> {
        self.write_header(meta)?;
        let record: Vec<String> = row
            .iter()
            .map(|v| {
                v.as_ref()
                    .map(|v| quote_field(&v.to_string(), self.delimiter))
                    .unwrap_or_default()
            })
            .collect();
        self.writer.write_record(&record).map_err(sink_error)
    }

    fn finish(&mut self) -> StepResult<()> {
        self.writer
            .flush()
            .map_err(|e| StepError::Sink(e.to_string()))
    }
}

/// Quote `text` when it is empty, has surrounding whitespace, or contains
/// the delimiter, a quote or a line break.
fn quote_field(text: &str, delimiter: u8) -> String {
    let needs_quotes = text.is_empty()
        || text.trim() != text
        || text
            .bytes()
            .any(|b| b == delimiter || matches!(b, b'"' | b'\n' | b'\r'));
    if needs_quotes {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn sink_error(e: csv::Error) -> StepError {
    StepError::Sink(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Value, ValueMeta, ValueType};
    use serde_json::json;

    fn meta() -> RowMeta {
        RowMeta::from_fields(vec![
            ValueMeta::new("id", ValueType::Integer),
            ValueMeta::new("phone", ValueType::String),
        ])
    }

    fn rows() -> Vec<Row> {
        vec![
            vec![Some(Value::Integer(1)), Some(Value::from("248-0532"))],
            vec![Some(Value::Integer(2)), None],
        ]
    }

    #[test]
    fn test_vec_source_ends_with_none() {
        let mut source = VecRowSource::new(meta(), rows());
        assert_eq!(source.row_meta().len(), 2);
        assert!(source.next_row().unwrap().is_some());
        assert!(source.next_row().unwrap().is_some());
        assert!(source.next_row().unwrap().is_none());
    }

    #[test]
    fn test_collecting_sink_json() {
        let mut sink = CollectingSink::new();
        for row in rows() {
            sink.put_row(&meta(), row).unwrap();
        }
        assert_eq!(
            sink.to_json(),
            json!([
                { "id": 1, "phone": "248-0532" },
                { "id": 2, "phone": null }
            ])
        );
    }

    #[test]
    fn test_csv_sink() {
        let mut sink = CsvRowSink::new(Vec::new(), b';').with_typed_header(true);
        for row in rows() {
            sink.put_row(&meta(), row).unwrap();
        }
        sink.finish().unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "id;phone\nInteger;String\n1;248-0532\n2;\n");
    }

    #[test]
    fn test_csv_sink_keeps_empty_string_apart_from_null() {
        let rows = vec![
            vec![Some(Value::Integer(1)), Some(Value::from(""))],
            vec![Some(Value::Integer(2)), None],
            vec![Some(Value::Integer(3)), Some(Value::from("say \"hi\"; now"))],
        ];
        let mut sink = CsvRowSink::new(Vec::new(), b';');
        for row in rows.clone() {
            sink.put_row(&meta(), row).unwrap();
        }
        sink.finish().unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "id;phone\n1;\"\"\n2;\n3;\"say \"\"hi\"\"; now\"\n");

        let parsed = crate::parser::parse_str(&out, ';', false, "utf-8").unwrap();
        assert_eq!(parsed.rows[0][1], Some(Value::from("")));
        assert_eq!(parsed.rows[1][1], None);
        assert_eq!(parsed.rows[2][1], rows[2][1]);
    }
}

//! CSV row source with encoding and delimiter auto-detection.
//!
//! Turns CSV text into a [`RowMeta`] and typed [`Row`]s:
//!
//! - an empty cell is a null
//! - a quoted empty cell (`""`) is an empty string
//! - quoted cells may span line breaks
//! - blank lines before the header are skipped, later ones are rows of nulls
//! - with a typed header, the second line gives each column's value type,
//!   either by name (`Number`, `String`, ...) or by host type code
//!   (`1` Number, `2` String, `3` Date, `4` Boolean, `5` Integer, `8` Binary)
//!
//! Without a typed header every column is a `String`.

use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

use crate::convert::{HostConverter, ValueConverter};
use crate::models::{Row, RowMeta, Value, ValueMeta, ValueType};

/// CSV parsing error with context
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// How to read a CSV input.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Field delimiter, detected from the header line when `None`.
    pub delimiter: Option<char>,
    /// The second line lists the value type of each column.
    pub typed_header: bool,
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Schema of the parsed rows
    pub meta: RowMeta,
    /// Parsed rows, aligned with `meta`
    pub rows: Vec<Row>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        // chardet reports an empty charset for empty input
        "" => "utf-8".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
/// Unknown encodings and invalid UTF-8 fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Split one CSV line into cells.
///
/// Unquoted cells are trimmed; an unquoted empty cell is `None`. Quoted
/// cells keep their content as is, `""` inside quotes is a literal quote.
pub fn split_line(line: &str, delimiter: char) -> Result<Vec<Option<String>>, String> {
    let mut line_nr = 1;
    read_record(&mut line.chars().peekable(), delimiter, &mut line_nr)
}

/// Split CSV text into records, each tagged with the line it starts on.
///
/// Quoted cells may span line breaks. A blank line is a record with a
/// single null cell; a final line break does not start a record.
pub fn split_records(content: &str, delimiter: char) -> Result<Vec<(usize, Vec<Option<String>>)>, CsvError> {
    let mut records = Vec::new();
    let mut chars = content.chars().peekable();
    let mut line_nr = 1;

    while chars.peek().is_some() {
        let start = line_nr;
        let cells = read_record(&mut chars, delimiter, &mut line_nr).map_err(|e| CsvError::new(start, e))?;
        records.push((start, cells));
    }

    Ok(records)
}

fn is_record_end(c: char, delimiter: char) -> bool {
    c == delimiter || c == '\n' || c == '\r'
}

fn is_blank(cells: &[Option<String>]) -> bool {
    matches!(cells, [None])
}

/// Read one record and its line terminator, counting consumed line breaks.
fn read_record(
    chars: &mut Peekable<Chars<'_>>,
    delimiter: char,
    line_nr: &mut usize,
) -> Result<Vec<Option<String>>, String> {
    let mut cells = Vec::new();

    loop {
        while chars
            .peek()
            .is_some_and(|&c| !is_record_end(c, delimiter) && c.is_whitespace())
        {
            chars.next();
        }

        let cell = if chars.peek() == Some(&'"') {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        text.push('"');
                    }
                    Some('"') => break,
                    Some(c) => {
                        if c == '\n' {
                            *line_nr += 1;
                        }
                        text.push(c);
                    }
                    None => return Err("Unterminated quoted value".to_string()),
                }
            }
            // anything between the closing quote and the delimiter is dropped
            while chars.peek().is_some_and(|&c| !is_record_end(c, delimiter)) {
                chars.next();
            }
            Some(text)
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if is_record_end(c, delimiter) {
                    break;
                }
                text.push(c);
                chars.next();
            }
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        };
        cells.push(cell);

        match chars.next() {
            Some(c) if c == delimiter => {}
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                *line_nr += 1;
                return Ok(cells);
            }
            Some(_) => {
                *line_nr += 1;
                return Ok(cells);
            }
            None => return Ok(cells),
        }
    }
}

/// Parse a typed header cell: a type name or a host type code.
pub fn parse_type_code(cell: &str) -> Option<ValueType> {
    let cell = cell.trim();
    if let Ok(code) = cell.parse::<u8>() {
        return match code {
            0 | 2 => Some(ValueType::String),
            1 | 6 => Some(ValueType::Number),
            3 | 9 => Some(ValueType::Date),
            4 => Some(ValueType::Boolean),
            5 => Some(ValueType::Integer),
            8 => Some(ValueType::Binary),
            _ => None,
        };
    }
    match cell.parse::<ValueType>() {
        Ok(ValueType::None) => Some(ValueType::String),
        Ok(t) => Some(t),
        Err(_) => None,
    }
}

/// Parse CSV text with an explicit delimiter.
pub fn parse_str(
    content: &str,
    delimiter: char,
    typed_header: bool,
    encoding: impl Into<String>,
) -> Result<ParseResult, CsvError> {
    let mut records = split_records(content.trim_start_matches('\u{feff}'), delimiter)?
        .into_iter()
        .skip_while(|(_, cells)| is_blank(cells));

    let (header_nr, header_cells) = records
        .next()
        .ok_or_else(|| CsvError::new(1, "Empty CSV file"))?;

    let headers: Vec<String> = header_cells.into_iter().map(Option::unwrap_or_default).collect();

    if let Some(i) = headers.iter().position(|h| h.is_empty()) {
        return Err(CsvError::new(header_nr, format!("Column {} has no name", i + 1)));
    }

    let types = if typed_header {
        let (nr, cells) = records
            .next()
            .ok_or_else(|| CsvError::new(header_nr + 1, "Missing type header line"))?;
        read_types(&headers, &cells, nr)?
    } else {
        vec![ValueType::String; headers.len()]
    };

    let meta = RowMeta::from_fields(
        headers
            .iter()
            .zip(types.iter())
            .map(|(name, t)| ValueMeta::new(name, *t))
            .collect(),
    );

    let converter = HostConverter;
    let mut rows = Vec::new();
    for (nr, cells) in records {
        let mut row: Row = Vec::with_capacity(meta.len());
        for (i, field) in meta.fields().iter().enumerate() {
            let cell = cells.get(i).cloned().flatten();
            row.push(typed_value(&converter, cell, field).map_err(|e| e.line_nr(nr))?);
        }
        rows.push(row);
    }

    Ok(ParseResult {
        meta,
        rows,
        encoding: encoding.into(),
        delimiter,
        headers,
    })
}

fn read_types(headers: &[String], cells: &[Option<String>], nr: usize) -> Result<Vec<ValueType>, CsvError> {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let cell = cells.get(i).cloned().flatten().unwrap_or_default();
            parse_type_code(&cell).ok_or_else(|| {
                CsvError::new(nr, "Unknown value type")
                    .with_column(header.clone())
                    .with_value(cell)
            })
        })
        .collect()
}

fn typed_value<C: ValueConverter>(
    converter: &C,
    cell: Option<String>,
    field: &ValueMeta,
) -> Result<Option<Value>, CsvError> {
    let Some(text) = cell else {
        return Ok(None);
    };
    if field.value_type == ValueType::String {
        return Ok(Some(Value::String(text)));
    }
    converter
        .convert(&Value::String(text.clone()), ValueType::String, field.value_type)
        .map_err(|e| {
            CsvError::new(0, e.message)
                .with_column(field.name.clone())
                .with_value(text)
        })
}

impl CsvError {
    fn line_nr(mut self, line: usize) -> Self {
        self.line = line;
        self
    }
}

/// Parse CSV bytes, detecting encoding and, unless given, the delimiter.
pub fn parse_bytes_auto(bytes: &[u8], options: &ParseOptions) -> Result<ParseResult, CsvError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(&content));
    parse_str(&content, delimiter, options.typed_header, encoding)
}

/// Parse a CSV file, detecting encoding and, unless given, the delimiter.
///
/// # Example
/// ```ignore
/// let result = parse_csv_file_auto("/path/to/file.csv", &ParseOptions::default())?;
/// println!("Encoding: {}, Delimiter: '{}'", result.encoding, result.delimiter);
/// println!("Rows: {}", result.rows.len());
/// ```
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<ParseResult, CsvError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| CsvError::new(0, format!("Cannot read file: {}", e)))?;
    parse_bytes_auto(&bytes, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<Value> {
        Some(Value::from(v))
    }

    #[test]
    fn test_simple_csv() {
        let result = parse_str("name;age\nAlice;30\nBob;25", ';', false, "utf-8").unwrap();

        assert_eq!(result.headers, vec!["name", "age"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0], vec![s("Alice"), s("30")]);
        assert_eq!(result.meta.get(1).unwrap().value_type, ValueType::String);
    }

    #[test]
    fn test_empty_cell_vs_empty_string() {
        let cells = split_line(r#"a;;"";"x;y";  b  "#, ';').unwrap();
        assert_eq!(
            cells,
            vec![
                Some("a".to_string()),
                None,
                Some(String::new()),
                Some("x;y".to_string()),
                Some("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_escaped_quote() {
        let cells = split_line(r#""say ""hi""",x"#, ',').unwrap();
        assert_eq!(cells[0].as_deref(), Some(r#"say "hi""#));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = parse_str("a;b\n\"oops;1", ';', false, "utf-8").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_typed_header_codes_and_names() {
        let csv = "id;temp;when;ok\n5;Number;3;4\n1;7.5;2024/01/02;Y\n2;;;";
        let result = parse_str(csv, ';', true, "utf-8").unwrap();

        let types: Vec<_> = result.meta.fields().iter().map(|f| f.value_type).collect();
        assert_eq!(
            types,
            vec![ValueType::Integer, ValueType::Number, ValueType::Date, ValueType::Boolean]
        );
        assert_eq!(result.rows[0][0], Some(Value::Integer(1)));
        assert_eq!(result.rows[0][1], Some(Value::Number(7.5)));
        assert_eq!(result.rows[0][3], Some(Value::Boolean(true)));
        assert_eq!(result.rows[1], vec![Some(Value::Integer(2)), None, None, None]);
    }

    #[test]
    fn test_bad_typed_value_reports_cell() {
        let csv = "id;temp\n5;1\n1;warm";
        let err = parse_str(csv, ';', true, "utf-8").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column.as_deref(), Some("temp"));
        assert_eq!(err.value.as_deref(), Some("warm"));
    }

    #[test]
    fn test_unknown_type_code() {
        let err = parse_str("a\n42\n", ';', true, "utf-8").unwrap_err();
        assert!(err.message.contains("Unknown value type"));
    }

    #[test]
    fn test_short_rows_padded_with_nulls() {
        let result = parse_str("a,b,c\n1", ',', false, "utf-8").unwrap();
        assert_eq!(result.rows[0], vec![s("1"), None, None]);
    }

    #[test]
    fn test_blank_line_is_null_row() {
        let result = parse_str("a\nx\n\ny\n", ',', false, "utf-8").unwrap();
        assert_eq!(result.rows, vec![vec![s("x")], vec![None], vec![s("y")]]);
    }

    #[test]
    fn test_blank_lines_before_header_skipped() {
        let result = parse_str("\n\na;b\n1;2\n", ';', false, "utf-8").unwrap();
        assert_eq!(result.headers, vec!["a", "b"]);
        assert_eq!(result.rows, vec![vec![s("1"), s("2")]]);
    }

    #[test]
    fn test_quoted_cell_spans_lines() {
        let result = parse_str("a,b\n\"line1\nline2\",x\r\nz,\"\"\n", ',', false, "utf-8").unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0], vec![s("line1\nline2"), s("x")]);
        assert_eq!(result.rows[1], vec![s("z"), s("")]);
    }

    #[test]
    fn test_record_line_numbers_follow_embedded_breaks() {
        let err = parse_str("id;temp\n5;1\n1;\"a\nb\"\n2;warm", ';', true, "utf-8").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.value.as_deref(), Some("a\nb"));

        let records = split_records("a\n\"x\ny\"\nz\n", ',').unwrap();
        let starts: Vec<usize> = records.iter().map(|(nr, _)| *nr).collect();
        assert_eq!(starts, vec![1, 2, 4]);
    }

    #[test]
    fn test_empty_csv_error() {
        let err = parse_str("", ';', false, "utf-8").unwrap_err();
        assert!(err.message.contains("Empty"));
    }

    #[test]
    fn test_error_message_format() {
        let err = CsvError::new(5, "Invalid value")
            .with_column("age")
            .with_value("abc");

        let msg = err.to_string();
        assert!(msg.contains("Line 5"));
        assert!(msg.contains("column 'age'"));
        assert!(msg.contains("value 'abc'"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
    }

    #[test]
    fn test_auto_parse() {
        let csv = "name,age\nAlice,30\nBob,25";
        let result = parse_bytes_auto(csv.as_bytes(), &ParseOptions::default()).unwrap();

        assert_eq!(result.delimiter, ',');
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_parse_type_code() {
        assert_eq!(parse_type_code("8"), Some(ValueType::Binary));
        assert_eq!(parse_type_code("integer"), Some(ValueType::Integer));
        assert_eq!(parse_type_code("None"), Some(ValueType::String));
        assert_eq!(parse_type_code("7"), None);
        assert_eq!(parse_type_code("Money"), None);
    }
}

//! An in-memory table parsed from CSV, with inferred column types.

use std::{collections::HashSet, error, fmt};

use crate::common::*;

/// Cell contents which we treat as missing values.
static NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
    "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// The type of a column, inferred from its contents.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DataType {
    Bool,
    Int64,
    Float64,
    String,
}

/// A single cell.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

/// A named column of values.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Column {
    name: String,
    data_type: DataType,
    values: Vec<Value>,
}

impl Column {
    /// The column's name, taken from the CSV header.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// The type we inferred for this column.
    pub(crate) fn data_type(&self) -> DataType {
        self.data_type
    }

    /// One value per row.
    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }
}

/// A table, stored as an ordered list of columns. Every column has the same
/// number of values.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Parse CSV text with a header row.
    ///
    /// Records must all have as many fields as the header.
    #[instrument(level = "trace", skip_all, fields(len = text.len()))]
    pub(crate) fn from_csv_str(text: &str) -> Result<Table, ParseError> {
        check_quotes_are_closed(text)?;

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());
        let headers = rdr.headers()?.clone();
        if headers.is_empty() {
            return Err(ParseError::NoHeader);
        }
        let names = column_names(&headers);

        let mut cells = vec![Vec::<String>::new(); names.len()];
        let mut row_count = 0;
        for record in rdr.into_records() {
            let record = record?;
            for (column, field) in cells.iter_mut().zip(record.iter()) {
                column.push(field.to_owned());
            }
            row_count += 1;
        }
        trace!("parsed {} columns and {} rows", names.len(), row_count);

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, cells)| column_from_cells(name, &cells))
            .collect();
        Ok(Table { columns, row_count })
    }

    /// Our columns, in header order.
    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The names of our columns, in header order.
    pub(crate) fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// The number of data rows, not counting the header.
    pub(crate) fn row_count(&self) -> usize {
        self.row_count
    }
}

/// Turn header fields into usable, unique column names.
///
/// Blank headers become `unnamed_{index}`, and repeats of `x` become `x_1`,
/// `x_2` and so on.
fn column_names(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        let base = if header.is_empty() {
            format!("unnamed_{}", idx)
        } else {
            header.to_owned()
        };
        let mut name = base.clone();
        let mut suffix = 0;
        while seen.contains(&name) {
            suffix += 1;
            name = format!("{}_{}", base, suffix);
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}

/// Is `cell` a missing value?
fn is_null(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell)
}

/// Parse `true` or `false`, ignoring case.
fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse a finite float. JSON has no way to spell infinity, so those stay
/// strings.
fn parse_float(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Pick the narrowest type which can hold every non-null cell.
fn infer_type(cells: &[String]) -> DataType {
    let mut present = cells.iter().map(|c| c.as_str()).filter(|c| !is_null(c));
    if present.clone().next().is_none() {
        DataType::String
    } else if present.clone().all(|c| c.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if present.clone().all(|c| parse_float(c).is_some()) {
        DataType::Float64
    } else if present.all(|c| parse_bool(c).is_some()) {
        DataType::Bool
    } else {
        DataType::String
    }
}

/// Build a typed column from raw cells.
fn column_from_cells(name: String, cells: &[String]) -> Column {
    let data_type = infer_type(cells);
    let values = cells
        .iter()
        .map(|cell| {
            if is_null(cell) && data_type != DataType::String {
                return Value::Null;
            }
            // `infer_type` already checked that these parse.
            match data_type {
                DataType::Bool => parse_bool(cell).map_or(Value::Null, Value::Bool),
                DataType::Int64 => cell.parse().map_or(Value::Null, Value::Int64),
                DataType::Float64 => parse_float(cell).map_or(Value::Null, Value::Float64),
                DataType::String if is_null(cell) => Value::Null,
                DataType::String => Value::String(cell.to_owned()),
            }
        })
        .collect();
    Column {
        name,
        data_type,
        values,
    }
}

/// Fail if a quoted field is still open at the end of `text`.
///
/// The `csv` crate quietly closes such fields at end of input, which would hide
/// a truncated file.
fn check_quotes_are_closed(text: &str) -> Result<(), ParseError> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        FieldStart,
        Unquoted,
        Quoted,
        QuoteInQuoted,
    }

    let mut state = State::FieldStart;
    let mut line = 1;
    let mut opened_on_line = 1;
    for c in text.chars() {
        state = match (state, c) {
            (State::FieldStart, '"') => {
                opened_on_line = line;
                State::Quoted
            }
            (State::FieldStart | State::Unquoted, ',' | '\n' | '\r') => {
                State::FieldStart
            }
            (State::FieldStart | State::Unquoted, _) => State::Unquoted,
            (State::Quoted, '"') => State::QuoteInQuoted,
            (State::Quoted, _) => State::Quoted,
            // `""` inside a quoted field is an escaped quote.
            (State::QuoteInQuoted, '"') => State::Quoted,
            (State::QuoteInQuoted, ',' | '\n' | '\r') => State::FieldStart,
            (State::QuoteInQuoted, _) => State::Unquoted,
        };
        if c == '\n' {
            line += 1;
        }
    }
    if state == State::Quoted {
        Err(ParseError::UnterminatedQuote {
            line: opened_on_line,
        })
    } else {
        Ok(())
    }
}

/// Why we could not parse CSV data.
#[derive(Debug)]
pub(crate) enum ParseError {
    /// There was no header row at all.
    NoHeader,
    /// A quoted field starting on `line` was never closed.
    UnterminatedQuote { line: u64 },
    /// The `csv` crate rejected the data, usually because a record has the
    /// wrong number of fields.
    Csv(csv::Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoHeader => write!(f, "CSV data has no header row"),
            ParseError::UnterminatedQuote { line } => {
                write!(f, "quoted CSV field starting on line {} is never closed", line)
            }
            ParseError::Csv(err) => write!(f, "malformed CSV: {}", err),
        }
    }
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ParseError::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::Csv(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_names_columns_and_rows_are_counted() {
        let table = Table::from_csv_str("a,b,c\n1,2,3\n4,5,6\n7,8,9\n").unwrap();
        assert_eq!(table.column_names(), vec!["a", "b", "c"]);
        assert_eq!(table.row_count(), 3);
        for column in table.columns() {
            assert_eq!(column.values().len(), 3);
        }
    }

    #[test]
    fn header_only_has_no_rows() {
        let table = Table::from_csv_str("a,b,c\n").unwrap();
        assert_eq!(table.column_names(), vec!["a", "b", "c"]);
        assert_eq!(table.row_count(), 0);
        assert!(table
            .columns()
            .iter()
            .all(|c| c.data_type() == DataType::String));
    }

    #[test]
    fn missing_trailing_newline_is_fine() {
        let table = Table::from_csv_str("a,b\n1,2\n3,4").unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn types_are_inferred_per_column() {
        let table = Table::from_csv_str(
            "int,float,bool,text,mixed\n\
             1,1.5,true,x,1\n\
             -2,2,FALSE,y,yes\n\
             3,1e3,True,z,2.5\n",
        )
        .unwrap();
        let types = table
            .columns()
            .iter()
            .map(|c| c.data_type())
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                DataType::Int64,
                DataType::Float64,
                DataType::Bool,
                DataType::String,
                DataType::String,
            ],
        );
        assert_eq!(
            table.columns()[0].values(),
            &[Value::Int64(1), Value::Int64(-2), Value::Int64(3)],
        );
        assert_eq!(
            table.columns()[1].values(),
            &[Value::Float64(1.5), Value::Float64(2.0), Value::Float64(1000.0)],
        );
        assert_eq!(
            table.columns()[2].values(),
            &[Value::Bool(true), Value::Bool(false), Value::Bool(true)],
        );
        assert_eq!(
            table.columns()[4].values(),
            &[
                Value::String("1".to_owned()),
                Value::String("yes".to_owned()),
                Value::String("2.5".to_owned()),
            ],
        );
    }

    #[test]
    fn missing_values_become_null() {
        let table = Table::from_csv_str("n,s,e\n1,NA,\n,hello,\nnull,N/A,\n").unwrap();
        assert_eq!(table.columns()[0].data_type(), DataType::Int64);
        assert_eq!(
            table.columns()[0].values(),
            &[Value::Int64(1), Value::Null, Value::Null],
        );
        assert_eq!(table.columns()[1].data_type(), DataType::String);
        assert_eq!(
            table.columns()[1].values(),
            &[Value::Null, Value::String("hello".to_owned()), Value::Null],
        );
        assert_eq!(table.columns()[2].data_type(), DataType::String);
        assert!(table.columns()[2].values().iter().all(|v| *v == Value::Null));
    }

    #[test]
    fn infinities_stay_strings() {
        let table = Table::from_csv_str("x\n1.5\ninf\n").unwrap();
        assert_eq!(table.columns()[0].data_type(), DataType::String);
    }

    #[test]
    fn quoted_fields_may_contain_commas_quotes_and_newlines() {
        let table =
            Table::from_csv_str("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n\"multi\nline\",2\n")
                .unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.columns()[0].values(),
            &[
                Value::String("x, y".to_owned()),
                Value::String("multi\nline".to_owned()),
            ],
        );
        assert_eq!(
            table.columns()[1].values()[0],
            Value::String("say \"hi\"".to_owned()),
        );
    }

    #[test]
    fn blank_and_repeated_headers_are_renamed() {
        let table = Table::from_csv_str("a,,a,a_1,a\n1,2,3,4,5\n").unwrap();
        assert_eq!(
            table.column_names(),
            vec!["a", "unnamed_1", "a_1", "a_1_1", "a_2"],
        );
    }

    #[test]
    fn inconsistent_column_counts_are_rejected() {
        let err = Table::from_csv_str("a,b\n1,2\n3,4,5\n").unwrap_err();
        assert!(matches!(err, ParseError::Csv(_)), "{:?}", err);

        let err = Table::from_csv_str("a,b\n1\n").unwrap_err();
        assert!(matches!(err, ParseError::Csv(_)), "{:?}", err);
    }

    #[test]
    fn unterminated_quotes_are_rejected() {
        let err = Table::from_csv_str("a,b\n1,2\n3,\"oops\n4,5\n").unwrap_err();
        assert!(
            matches!(err, ParseError::UnterminatedQuote { line: 3 }),
            "{:?}",
            err,
        );
    }

    #[test]
    fn stray_quotes_inside_unquoted_fields_are_literal() {
        let table = Table::from_csv_str("a\n5\" pipe\n").unwrap();
        assert_eq!(
            table.columns()[0].values(),
            &[Value::String("5\" pipe".to_owned())],
        );
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            Table::from_csv_str("").unwrap_err(),
            ParseError::NoHeader,
        ));
        assert!(matches!(
            Table::from_csv_str("\n\n").unwrap_err(),
            ParseError::NoHeader,
        ));
    }
}

//! Decoding of input CSV records into typed samples.
use std::{fs::File, io::Read, path::Path, sync::OnceLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use error_stack::ResultExt;

use crate::error::{DecodeError, SchemaError};
use crate::schema::{SchemaTable, SourceColumn, TIMESTAMP_FIELDS};
use crate::station::VERTICAL_FILL_VALUE;

static DATE_REGEX: OnceLock<regex::Regex> = OnceLock::new();
static TIME_REGEX: OnceLock<regex::Regex> = OnceLock::new();

/// One decoded input row.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// UTC timestamp of the observation, second precision
    pub timestamp: NaiveDateTime,
    /// One value per schema variable, in schema order. Fields that could not
    /// be parsed hold that variable's fill value.
    pub values: Vec<f64>,
    /// Schema indices of the values that fell back to the fill value.
    pub fallbacks: Vec<usize>,
    /// Vertical position of this row, when it is read from the input.
    pub vertical: Option<f64>,
}

/// Parse the date and time-of-day fields of a record.
///
/// The date must be exactly `YYYY-MM-DD` and the time exactly `HH:MM:SS`;
/// both must also be valid calendar/clock values.
pub fn parse_timestamp(date: &str, time: &str) -> Result<NaiveDateTime, String> {
    let date_re = DATE_REGEX.get_or_init(|| {
        regex::Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Could not compile date regex")
    });
    let time_re = TIME_REGEX.get_or_init(|| {
        regex::Regex::new(r"^\d{2}:\d{2}:\d{2}$").expect("Could not compile time regex")
    });

    if !date_re.is_match(date) {
        return Err(format!("date '{date}' is not in YYYY-MM-DD format"));
    }
    if !time_re.is_match(time) {
        return Err(format!("time '{time}' is not in HH:MM:SS format"));
    }

    let d = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| format!("date '{date}' is not a valid calendar date: {e}"))?;
    let t = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .map_err(|e| format!("time '{time}' is not a valid time of day: {e}"))?;
    Ok(d.and_time(t))
}

/// Parse one numeric field. Empty, non-numeric and non-finite fields give `None`.
pub fn parse_value(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Turns raw records into [`Sample`]s according to a schema table.
#[derive(Debug, Clone)]
pub struct RowDecoder {
    columns: Vec<usize>,
    fills: Vec<f64>,
    names: Vec<String>,
    vertical: Option<usize>,
}

impl RowDecoder {
    /// Create a decoder for `schema`. `header` is only needed if some variable
    /// names its source column rather than giving an index.
    pub fn new(schema: &SchemaTable, header: Option<&[String]>) -> Result<Self, SchemaError> {
        let columns = schema.resolve_columns(header)?;
        let fills = schema.iter().map(|v| v.fill_value).collect();
        let names = schema.iter().map(|v| v.name.clone()).collect();
        Ok(Self { columns, fills, names, vertical: None })
    }

    /// Also read each row's vertical position from `column`.
    pub fn with_vertical_column(mut self, column: &SourceColumn, header: Option<&[String]>) -> Result<Self, SchemaError> {
        let idx = column.resolve(header)
            .ok_or_else(|| SchemaError::UnknownColumn { variable: "z".to_string(), column: column.to_string() })?;
        if idx < TIMESTAMP_FIELDS {
            return Err(SchemaError::ReservedColumn { variable: "z".to_string(), index: idx });
        }
        self.vertical = Some(idx);
        Ok(self)
    }

    /// Minimum number of fields a record must have.
    pub fn arity(&self) -> usize {
        self.columns.iter().chain(self.vertical.iter()).copied().max()
            .map(|m| m + 1)
            .unwrap_or(TIMESTAMP_FIELDS)
    }

    /// Decode one record. `row` is the 1-based data row number, used in
    /// error and log messages.
    ///
    /// A bad timestamp or a record too short for the schema is a
    /// [`DecodeError::MalformedRow`]. A bad numeric field only replaces that
    /// field with its fill value.
    pub fn decode<S: AsRef<str>>(&self, row: usize, fields: &[S]) -> Result<Sample, DecodeError> {
        if fields.len() < self.arity() {
            return Err(DecodeError::malformed(row, format!(
                "expected at least {} fields, found {}", self.arity(), fields.len()
            )));
        }

        let timestamp = parse_timestamp(fields[0].as_ref(), fields[1].as_ref())
            .map_err(|reason| DecodeError::malformed(row, reason))?;

        let mut values = Vec::with_capacity(self.columns.len());
        let mut fallbacks = vec![];
        for (i, &col) in self.columns.iter().enumerate() {
            let raw = fields[col].as_ref();
            match parse_value(raw) {
                Some(v) => values.push(v),
                None => {
                    log::debug!(
                        "Row {row}: value '{raw}' for {} is not numeric, using fill value {}",
                        self.names[i], self.fills[i]
                    );
                    values.push(self.fills[i]);
                    fallbacks.push(i);
                }
            }
        }

        let vertical = self.vertical.map(|col| {
            let raw = fields[col].as_ref();
            parse_value(raw).unwrap_or_else(|| {
                log::debug!("Row {row}: vertical position '{raw}' is not numeric, using fill value {VERTICAL_FILL_VALUE}");
                VERTICAL_FILL_VALUE
            })
        });

        Ok(Sample { timestamp, values, fallbacks, vertical })
    }
}

/// Iterator over the first `declared` data rows of a CSV input.
///
/// The header line is always skipped. Iteration stops after `declared`
/// rows; if the input holds fewer rows the iterator simply ends early and
/// the caller is responsible for reporting the shortfall.
pub struct CsvRows<R: Read> {
    reader: csv::Reader<R>,
    header: Vec<String>,
    decoder: RowDecoder,
    record: csv::StringRecord,
    declared: usize,
    consumed: usize,
}

impl CsvRows<File> {
    pub fn open(path: &Path, schema: &SchemaTable, declared: usize) -> error_stack::Result<Self, DecodeError> {
        let f = File::open(path)
            .change_context(DecodeError::ReadError { row: 0 })
            .attach_printable_lazy(|| format!("could not open {}", path.display()))?;
        Self::from_reader(f, schema, declared)
    }
}

impl<R: Read> CsvRows<R> {
    pub fn from_reader(rdr: R, schema: &SchemaTable, declared: usize) -> error_stack::Result<Self, DecodeError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(rdr);

        let header: Vec<String> = reader.headers()
            .change_context(DecodeError::ReadError { row: 0 })
            .attach_printable("could not read the header line")?
            .iter()
            .map(|s| s.to_string())
            .collect();

        let decoder = RowDecoder::new(schema, Some(&header))
            .map_err(|e| error_stack::Report::new(e).change_context(DecodeError::ColumnMapping))?;

        Ok(Self { reader, header, decoder, record: csv::StringRecord::new(), declared, consumed: 0 })
    }

    /// Read each row's vertical position from `column` as well.
    pub fn with_vertical_column(mut self, column: &SourceColumn) -> error_stack::Result<Self, DecodeError> {
        self.decoder = self.decoder.with_vertical_column(column, Some(&self.header))
            .map_err(|e| error_stack::Report::new(e).change_context(DecodeError::ColumnMapping))?;
        Ok(self)
    }

    pub fn declared(&self) -> usize {
        self.declared
    }

    /// Number of data rows read so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = error_stack::Result<Sample, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.consumed >= self.declared {
            return None;
        }

        let row = self.consumed + 1;
        match self.reader.read_record(&mut self.record) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                return Some(Err(error_stack::Report::new(e).change_context(DecodeError::ReadError { row })));
            }
        }
        self.consumed = row;

        let fields: Vec<&str> = self.record.iter().collect();
        let res = self.decoder.decode(row, &fields)
            .map_err(error_stack::Report::new);

        if self.consumed == self.declared && res.is_ok() {
            // Peek to warn about rows past the declared count; they are never read.
            let mut extra = csv::StringRecord::new();
            if let Ok(true) = self.reader.read_record(&mut extra) {
                log::warn!("Input has more than the declared {} rows; the remaining rows are ignored", self.declared);
            }
        }

        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::schema::VariableSchema;

    #[fixture]
    fn schema() -> SchemaTable {
        SchemaTable::new(vec![
            VariableSchema::new("air_pressure", "air_pressure", "mbar", -999.0, 700.0, 1040.0),
            VariableSchema::new("air_temperature", "air_temperature", "Celsius", -888.0, -10.0, 40.0),
        ])
    }

    #[rstest]
    #[case("2015-11-01", "00:00:00", true)]
    #[case("2015-11-01", "23:59:59", true)]
    #[case("2015-11-1", "00:00:00", false)]
    #[case("2015/11/01", "00:00:00", false)]
    #[case("2015-11-01", "0:00:00", false)]
    #[case("2015-11-01", "00:00", false)]
    #[case("2015-02-30", "00:00:00", false)]
    #[case("2015-11-01", "24:00:00", false)]
    #[case(" 2015-11-01", "00:00:00", false)]
    fn test_timestamp_shape(#[case] date: &str, #[case] time: &str, #[case] ok: bool) {
        assert_eq!(parse_timestamp(date, time).is_ok(), ok, "{date} {time}");
    }

    #[rstest]
    fn test_bad_value_falls_back_to_fill(schema: SchemaTable) {
        let dec = RowDecoder::new(&schema, None).unwrap();
        let sample = dec.decode(2, &["2015-11-01", "01:00:00", "bad", "22.0"]).unwrap();
        assert_eq!(sample.values, vec![-999.0, 22.0]);
        assert_eq!(sample.fallbacks, vec![0]);

        let sample = dec.decode(3, &["2015-11-01", "01:00:00", " 1012.9 ", ""]).unwrap();
        assert_eq!(sample.values, vec![1012.9, -888.0]);
        assert_eq!(sample.fallbacks, vec![1]);

        let sample = dec.decode(4, &["2015-11-01", "01:00:00", "NaN", "inf"]).unwrap();
        assert_eq!(sample.values, vec![-999.0, -888.0]);
    }

    #[rstest]
    fn test_malformed_rows(schema: SchemaTable) {
        let dec = RowDecoder::new(&schema, None).unwrap();
        let err = dec.decode(7, &["11/01/2015", "01:00:00", "1.0", "2.0"]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedRow { row: 7, .. }));

        let err = dec.decode(8, &["2015-11-01", "01:00:00", "1.0"]).unwrap_err();
        assert_eq!(err.row(), 8);
    }

    #[rstest]
    fn test_csv_rows_stop_at_declared(schema: SchemaTable) {
        let input = "date,time,air_pressure,air_temperature\n\
                     2015-11-01,00:00:00,1013.2,21.5\n\
                     2015-11-01,01:00:00,bad,22.0\n\
                     2015-11-01,02:00:00,1012.9,21.8\n";
        let rows: Vec<Sample> = CsvRows::from_reader(input.as_bytes(), &schema, 2).unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].values, vec![-999.0, 22.0]);

        let mut it = CsvRows::from_reader(input.as_bytes(), &schema, 5).unwrap();
        assert_eq!(it.by_ref().count(), 3);
        assert_eq!(it.consumed(), 3);
        assert_eq!(it.declared(), 5);
    }

    #[rstest]
    fn test_csv_rows_resolve_named_columns() {
        let schema = SchemaTable::new(vec![
            VariableSchema::new("air_temperature", "air_temperature", "Celsius", -999.0, -10.0, 40.0)
                .with_source_column(crate::schema::SourceColumn::Name("tair".to_string())),
        ]);
        let input = "date,time,pres,tair\n2015-11-01,00:00:00,1013.2,21.5\n";
        let rows: Vec<Sample> = CsvRows::from_reader(input.as_bytes(), &schema, 1).unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows[0].values, vec![21.5]);
    }

    #[rstest]
    fn test_vertical_column(schema: SchemaTable) {
        let input = "date,time,air_pressure,air_temperature,depth\n\
                     2015-11-01,00:00:00,1013.2,21.5,2.0\n\
                     2015-11-01,01:00:00,1013.1,21.4,\n";
        let rows: Vec<Sample> = CsvRows::from_reader(input.as_bytes(), &schema, 2).unwrap()
            .with_vertical_column(&SourceColumn::Name("depth".to_string())).unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows[0].vertical, Some(2.0));
        assert_eq!(rows[1].vertical, Some(VERTICAL_FILL_VALUE));
        assert!(rows[1].fallbacks.is_empty());

        let err = CsvRows::from_reader(input.as_bytes(), &schema, 2).unwrap()
            .with_vertical_column(&SourceColumn::Name("pressure_depth".to_string()))
            .err()
            .unwrap();
        assert!(matches!(err.current_context(), DecodeError::ColumnMapping));

        // a record too short for the vertical column is malformed
        let dec = RowDecoder::new(&schema, None).unwrap()
            .with_vertical_column(&SourceColumn::Index(4), None).unwrap();
        assert_eq!(dec.arity(), 5);
        assert!(dec.decode(1, &["2015-11-01", "00:00:00", "1013.2", "21.5"]).is_err());
    }
}

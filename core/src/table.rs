//! Generic metadata tables.
//!
//! A [`MetaDataTable`] holds the rows of one table type, statically typed
//! by its row struct.  [`AnyTable`] covers the case where the table type
//! is only known at run time, e.g. from a command-line argument.

use std::time::Instant;

use log::info;
use ndarray::Array1;
use regex::Regex;
use serde::Serialize;

use crate::reader::{RawRow, ReaderError, TableReader};
use crate::rows::{
    MultiInspiral, Process, ProcessParams, SearchSummary, SimInspiral, SnglBurst, SnglInspiral,
    SummValue, TableRow,
};
use crate::types::{slide_number, TableType, Value};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while building or slicing a table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("unknown table type '{0}'")]
    UnknownTableType(String),

    #[error("{table} has no column '{column}'")]
    MissingColumn { table: TableType, column: String },

    #[error("column '{column}' of {table} is not numeric")]
    NonNumericColumn { table: TableType, column: String },

    #[error("cannot append a {other} table to a {table} table")]
    TypeMismatchOnAppend { table: TableType, other: TableType },

    #[error("invalid ifo pattern '{pattern}': {source}")]
    BadIfoPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("row {index} does not fit the {table} schema: {source}")]
    InvalidRow {
        table: TableType,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Reader(#[from] ReaderError),
}

impl TableError {
    fn missing(table: TableType, column: &str) -> Self {
        TableError::MissingColumn {
            table,
            column: column.to_string(),
        }
    }
}

/// Compile an ifo pattern so that it only needs to match a prefix.
pub(crate) fn ifo_regex(pattern: &str) -> Result<Regex, TableError> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|source| TableError::BadIfoPattern {
        pattern: pattern.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// MetaDataTable
// ---------------------------------------------------------------------------

/// The rows of one metadata table, in document order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetaDataTable<R> {
    rows: Vec<R>,
}

impl<R> Default for MetaDataTable<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R: TableRow> MetaDataTable<R> {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<R>) -> Self {
        Self { rows }
    }

    /// Validate raw reader output against the `R` schema.
    pub fn from_raw(raw: Vec<RawRow>) -> Result<Self, TableError> {
        let rows = raw
            .into_iter()
            .enumerate()
            .map(|(index, mut row)| {
                R::normalize(&mut row);
                serde_json::from_value(serde_json::Value::Object(row)).map_err(|source| {
                    TableError::InvalidRow {
                        table: R::TABLE_TYPE,
                        index,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<R>, _>>()?;
        Ok(Self { rows })
    }

    /// Read the table from the files matching `pattern`.
    ///
    /// With no pattern (or an empty one) the table starts out empty.
    pub fn read(reader: &impl TableReader, pattern: Option<&str>) -> Result<Self, TableError> {
        let pattern = match pattern {
            Some(p) if !p.is_empty() => p,
            _ => return Ok(Self::new()),
        };

        let start = Instant::now();
        let table = Self::from_raw(reader.read_table(pattern, R::TABLE_TYPE)?)?;
        info!(
            "Read {} {} row(s) from '{}' in {} ms",
            table.row_count(),
            R::TABLE_TYPE,
            pattern,
            start.elapsed().as_millis(),
        );
        Ok(table)
    }

    pub fn table_type(&self) -> TableType {
        R::TABLE_TYPE
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }

    /// The values of `column` across all rows, in row order.
    pub fn column_as_array(&self, column: &str) -> Result<Vec<Value>, TableError> {
        if !R::columns().contains(&column) {
            return Err(TableError::missing(R::TABLE_TYPE, column));
        }
        self.rows
            .iter()
            .map(|row| {
                row.column(column)
                    .ok_or_else(|| TableError::missing(R::TABLE_TYPE, column))
            })
            .collect()
    }

    /// A numeric column as a float array.
    pub fn numeric_column(&self, column: &str) -> Result<Array1<f64>, TableError> {
        let values = self.column_as_array(column)?;
        values
            .iter()
            .map(|v| {
                v.as_f64().ok_or_else(|| TableError::NonNumericColumn {
                    table: R::TABLE_TYPE,
                    column: column.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()
            .map(Array1::from)
    }

    /// Rows whose `ifo` matches `pattern` at its start (`"H"` keeps both
    /// `H1` and `H2`).
    pub fn filter_by_ifo(&self, pattern: &str) -> Result<Self, TableError> {
        let re = ifo_regex(pattern)?;
        let mut rows = Vec::new();
        for row in &self.rows {
            let ifo = row
                .ifo()
                .ok_or_else(|| TableError::missing(R::TABLE_TYPE, "ifo"))?;
            if re.is_match(ifo) {
                rows.push(row.clone());
            }
        }
        Ok(Self { rows })
    }

    /// Rows belonging to time slide `slide`.
    pub fn filter_by_slide(&self, slide: i64) -> Result<Self, TableError> {
        let mut rows = Vec::new();
        for row in &self.rows {
            let event_id = row
                .event_id()
                .ok_or_else(|| TableError::missing(R::TABLE_TYPE, "event_id"))?;
            if slide_number(event_id) == slide {
                rows.push(row.clone());
            }
        }
        Ok(Self { rows })
    }

    /// Append the rows of `other` to this table.
    pub fn append(&mut self, other: &MetaDataTable<R>) {
        self.rows.extend(other.rows.iter().cloned());
    }

    pub fn push(&mut self, row: R) {
        self.rows.push(row);
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }
}

impl<R: TableRow> FromIterator<R> for MetaDataTable<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<R> IntoIterator for MetaDataTable<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a MetaDataTable<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ---------------------------------------------------------------------------
// AnyTable
// ---------------------------------------------------------------------------

/// A metadata table whose type is chosen at run time.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnyTable {
    ProcessParams(MetaDataTable<ProcessParams>),
    Process(MetaDataTable<Process>),
    SearchSummary(MetaDataTable<SearchSummary>),
    SummValue(MetaDataTable<SummValue>),
    SnglInspiral(MetaDataTable<SnglInspiral>),
    SimInspiral(MetaDataTable<SimInspiral>),
    SnglBurst(MetaDataTable<SnglBurst>),
    MultiInspiral(MetaDataTable<MultiInspiral>),
}

/// Apply the same expression to whichever table an [`AnyTable`] holds.
macro_rules! each_table {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            AnyTable::ProcessParams($t) => $body,
            AnyTable::Process($t) => $body,
            AnyTable::SearchSummary($t) => $body,
            AnyTable::SummValue($t) => $body,
            AnyTable::SnglInspiral($t) => $body,
            AnyTable::SimInspiral($t) => $body,
            AnyTable::SnglBurst($t) => $body,
            AnyTable::MultiInspiral($t) => $body,
        }
    };
}

/// Same as [`each_table!`], rewrapping a table-valued result.
macro_rules! map_table {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            AnyTable::ProcessParams($t) => AnyTable::ProcessParams($body),
            AnyTable::Process($t) => AnyTable::Process($body),
            AnyTable::SearchSummary($t) => AnyTable::SearchSummary($body),
            AnyTable::SummValue($t) => AnyTable::SummValue($body),
            AnyTable::SnglInspiral($t) => AnyTable::SnglInspiral($body),
            AnyTable::SimInspiral($t) => AnyTable::SimInspiral($body),
            AnyTable::SnglBurst($t) => AnyTable::SnglBurst($body),
            AnyTable::MultiInspiral($t) => AnyTable::MultiInspiral($body),
        }
    };
}

impl AnyTable {
    /// An empty table of the given type.
    pub fn empty(table_type: TableType) -> Self {
        match table_type {
            TableType::ProcessParams => AnyTable::ProcessParams(MetaDataTable::new()),
            TableType::Process => AnyTable::Process(MetaDataTable::new()),
            TableType::SearchSummary => AnyTable::SearchSummary(MetaDataTable::new()),
            TableType::SummValue => AnyTable::SummValue(MetaDataTable::new()),
            TableType::SnglInspiral => AnyTable::SnglInspiral(MetaDataTable::new()),
            TableType::SimInspiral => AnyTable::SimInspiral(MetaDataTable::new()),
            TableType::SnglBurst => AnyTable::SnglBurst(MetaDataTable::new()),
            TableType::MultiInspiral => AnyTable::MultiInspiral(MetaDataTable::new()),
        }
    }

    /// Read the table named `table_type` from the files matching
    /// `pattern`.  An unrecognised table name is an error.
    pub fn load(
        reader: &impl TableReader,
        pattern: Option<&str>,
        table_type: &str,
    ) -> Result<Self, TableError> {
        let table_type: TableType = table_type.parse()?;
        Ok(match table_type {
            TableType::ProcessParams => {
                AnyTable::ProcessParams(MetaDataTable::read(reader, pattern)?)
            }
            TableType::Process => AnyTable::Process(MetaDataTable::read(reader, pattern)?),
            TableType::SearchSummary => {
                AnyTable::SearchSummary(MetaDataTable::read(reader, pattern)?)
            }
            TableType::SummValue => AnyTable::SummValue(MetaDataTable::read(reader, pattern)?),
            TableType::SnglInspiral => {
                AnyTable::SnglInspiral(MetaDataTable::read(reader, pattern)?)
            }
            TableType::SimInspiral => {
                AnyTable::SimInspiral(MetaDataTable::read(reader, pattern)?)
            }
            TableType::SnglBurst => AnyTable::SnglBurst(MetaDataTable::read(reader, pattern)?),
            TableType::MultiInspiral => {
                AnyTable::MultiInspiral(MetaDataTable::read(reader, pattern)?)
            }
        })
    }

    pub fn table_type(&self) -> TableType {
        each_table!(self, t => t.table_type())
    }

    pub fn row_count(&self) -> usize {
        each_table!(self, t => t.row_count())
    }

    pub fn column_as_array(&self, column: &str) -> Result<Vec<Value>, TableError> {
        each_table!(self, t => t.column_as_array(column))
    }

    pub fn numeric_column(&self, column: &str) -> Result<Array1<f64>, TableError> {
        each_table!(self, t => t.numeric_column(column))
    }

    pub fn filter_by_ifo(&self, pattern: &str) -> Result<Self, TableError> {
        Ok(map_table!(self, t => t.filter_by_ifo(pattern)?))
    }

    pub fn filter_by_slide(&self, slide: i64) -> Result<Self, TableError> {
        Ok(map_table!(self, t => t.filter_by_slide(slide)?))
    }

    /// Append `other`, which must hold the same table type.
    pub fn append(&mut self, other: &AnyTable) -> Result<(), TableError> {
        let mismatch = TableError::TypeMismatchOnAppend {
            table: self.table_type(),
            other: other.table_type(),
        };
        match (self, other) {
            (AnyTable::ProcessParams(a), AnyTable::ProcessParams(b)) => a.append(b),
            (AnyTable::Process(a), AnyTable::Process(b)) => a.append(b),
            (AnyTable::SearchSummary(a), AnyTable::SearchSummary(b)) => a.append(b),
            (AnyTable::SummValue(a), AnyTable::SummValue(b)) => a.append(b),
            (AnyTable::SnglInspiral(a), AnyTable::SnglInspiral(b)) => a.append(b),
            (AnyTable::SimInspiral(a), AnyTable::SimInspiral(b)) => a.append(b),
            (AnyTable::SnglBurst(a), AnyTable::SnglBurst(b)) => a.append(b),
            (AnyTable::MultiInspiral(a), AnyTable::MultiInspiral(b)) => a.append(b),
            _ => return Err(mismatch),
        }
        Ok(())
    }

    pub fn as_sngl_inspiral(&self) -> Option<&MetaDataTable<SnglInspiral>> {
        match self {
            AnyTable::SnglInspiral(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn trigger(ifo: &str, snr: f32, end_time: i32, event_id: i64) -> SnglInspiral {
        SnglInspiral {
            ifo: ifo.into(),
            snr,
            end_time,
            event_id,
            ..Default::default()
        }
    }

    fn triggers() -> MetaDataTable<SnglInspiral> {
        MetaDataTable::from_rows(vec![
            trigger("H1", 5.0, 1000, 100000500000),
            trigger("L1", 4.0, 1000, 100000500000),
            trigger("H2", 6.0, 1500, 300000500000),
            trigger("H1", 10.0, 2000, 200000600000),
        ])
    }

    /// Serves canned rows regardless of pattern.
    struct CannedReader(Vec<RawRow>);

    impl TableReader for CannedReader {
        fn read_table(
            &self,
            _pattern: &str,
            _table: TableType,
        ) -> Result<Vec<RawRow>, ReaderError> {
            Ok(self.0.clone())
        }
    }

    fn raw(value: serde_json::Value) -> RawRow {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn row_count_matches_input() {
        assert_eq!(triggers().row_count(), 4);
        assert_eq!(MetaDataTable::<SnglInspiral>::new().row_count(), 0);
    }

    #[test]
    fn no_pattern_means_empty_table() {
        let reader = CannedReader(vec![raw(json!({ "ifo": "H1" }))]);
        let table = MetaDataTable::<SnglInspiral>::read(&reader, None).unwrap();
        assert!(table.is_empty());
        let table = MetaDataTable::<SnglInspiral>::read(&reader, Some("")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn raw_rows_are_validated_on_read() {
        let reader = CannedReader(vec![
            raw(json!({ "ifo": "H1", "snr": 5.0, "end_time": 1000, "event_id": 1 })),
            raw(json!({ "ifo": "L1", "snr": "loud", "end_time": 1000, "event_id": 1 })),
        ]);
        let err = MetaDataTable::<SnglInspiral>::read(&reader, Some("x")).unwrap_err();
        assert_matches!(
            err,
            TableError::InvalidRow { table: TableType::SnglInspiral, index: 1, .. }
        );
    }

    #[test]
    fn example_rows_with_fractional_seconds_build_and_cluster() {
        let raw_rows = vec![
            raw(json!({ "event_id": 100000500000_i64, "ifo": "H1", "snr": 5, "end_time": 1000 })),
            raw(json!({
                "event_id": 100000500000_i64, "ifo": "L1", "snr": 4, "end_time": 1000.01,
            })),
            raw(json!({ "event_id": 200000600000_i64, "ifo": "H1", "snr": 10, "end_time": 2000 })),
        ];
        let sngls = MetaDataTable::<SnglInspiral>::from_raw(raw_rows).unwrap();
        assert_eq!(sngls.row_count(), 3);
        assert_eq!(sngls.rows()[1].end_time, 1000);
        assert_eq!(sngls.rows()[1].end_time_ns, 10_000_000);

        let coincs = crate::coinc::CoincInspiralTable::build(&sngls).unwrap();
        let summary: Vec<(i64, usize, f64)> = coincs
            .iter()
            .map(|c| (c.event_id, c.numifos(), c.snrsq))
            .collect();
        assert_eq!(
            summary,
            vec![(100000500000, 2, 41.0), (200000600000, 1, 100.0)]
        );

        let clustered = coincs.cluster(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(clustered, coincs);
    }

    #[test]
    fn column_extraction_keeps_row_order() {
        let snr = triggers().numeric_column("snr").unwrap();
        assert_eq!(snr.to_vec(), vec![5.0, 4.0, 6.0, 10.0]);

        let ifos = triggers().column_as_array("ifo").unwrap();
        assert_eq!(ifos[2], Value::Text("H2".into()));
    }

    #[test]
    fn missing_and_text_columns_fail() {
        assert_matches!(
            triggers().column_as_array("ra"),
            Err(TableError::MissingColumn { ref column, .. }) if column == "ra"
        );
        assert_matches!(
            triggers().numeric_column("ifo"),
            Err(TableError::NonNumericColumn { .. })
        );
        // An empty table still knows its schema.
        assert_matches!(
            MetaDataTable::<SnglInspiral>::new().column_as_array("ra"),
            Err(TableError::MissingColumn { .. })
        );
    }

    #[test]
    fn ifo_filter_matches_prefix_and_is_idempotent() {
        let h = triggers().filter_by_ifo("H").unwrap();
        assert_eq!(h.row_count(), 3);
        assert_eq!(h.filter_by_ifo("H").unwrap(), h);

        let h1 = triggers().filter_by_ifo("H1").unwrap();
        assert_eq!(h1.row_count(), 2);
        // Anchored at the start only.
        assert_eq!(triggers().filter_by_ifo("1").unwrap().row_count(), 0);

        assert_matches!(
            triggers().filter_by_ifo("H["),
            Err(TableError::BadIfoPattern { .. })
        );
    }

    #[test]
    fn ifo_filter_needs_an_ifo_column() {
        let procs = MetaDataTable::from_rows(vec![Process {
            program: "inspiral".into(),
            ..Default::default()
        }]);
        assert_matches!(
            procs.filter_by_ifo("H1"),
            Err(TableError::MissingColumn { table: TableType::Process, .. })
        );
    }

    #[test]
    fn slide_filter_uses_event_id_digits() {
        let five = triggers().filter_by_slide(5).unwrap();
        let ids: Vec<i64> = five.iter().map(|r| r.event_id).collect();
        assert_eq!(ids, vec![100000500000, 100000500000, 300000500000]);
        assert_eq!(triggers().filter_by_slide(6).unwrap().row_count(), 1);
        assert!(triggers().filter_by_slide(0).unwrap().is_empty());
    }

    #[test]
    fn append_extends_in_place() {
        let mut table = triggers();
        table.append(&triggers().filter_by_ifo("L1").unwrap());
        assert_eq!(table.row_count(), 5);
        assert_eq!(table.rows()[4].ifo, "L1");
    }

    #[test]
    fn any_table_rejects_unknown_types_and_mismatched_appends() {
        let reader = CannedReader(Vec::new());
        assert_matches!(
            AnyTable::load(&reader, Some("x"), "sngl_ringdown"),
            Err(TableError::UnknownTableType(_))
        );

        let mut sngl = AnyTable::SnglInspiral(triggers());
        let procs = AnyTable::load(&reader, Some("x"), "process").unwrap();
        assert_eq!(procs.table_type(), TableType::Process);
        assert_matches!(
            sngl.append(&procs),
            Err(TableError::TypeMismatchOnAppend {
                table: TableType::SnglInspiral,
                other: TableType::Process,
            })
        );

        let more = AnyTable::SnglInspiral(triggers());
        sngl.append(&more).unwrap();
        assert_eq!(sngl.row_count(), 8);
        assert_eq!(sngl.filter_by_ifo("L").unwrap().row_count(), 2);
        assert!(sngl.as_sngl_inspiral().is_some());
        assert_eq!(AnyTable::empty(TableType::SimInspiral).row_count(), 0);
    }
}

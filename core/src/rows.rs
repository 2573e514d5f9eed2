//! Typed row records, one struct per metadata-table schema.
//!
//! Readers hand back loosely typed column maps; [`crate::table`] validates
//! each one into the matching struct here through serde.  Columns that an
//! analysis cannot do without (`ifo`, `snr`, `end_time`, `event_id`, ...)
//! are required; the rest default to zero or the empty string when a
//! document leaves them out.

use std::fmt;

#[cfg(feature = "python")]
use pyo3::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::reader::RawRow;
use crate::types::{Ifo, LigoTimeGps, TableType, ToValue, Value, NANOS_PER_SECOND};

/// A row of one metadata table.
pub trait TableRow: Clone + fmt::Debug + Serialize + DeserializeOwned {
    /// The table this row type belongs to.
    const TABLE_TYPE: TableType;

    /// Column names of the schema, in declaration order.
    fn columns() -> &'static [&'static str];

    /// The value of `name`, or `None` if the schema has no such column.
    fn column(&self, name: &str) -> Option<Value>;

    /// The detector column, for schemas that carry a single `ifo`.
    fn ifo(&self) -> Option<&str> {
        None
    }

    /// The event identifier, for schemas that carry one.
    fn event_id(&self) -> Option<i64> {
        None
    }

    /// Reshape a raw row before it is validated against the schema.
    fn normalize(_row: &mut RawRow) {}
}

/// Split a fractional seconds column into whole seconds, adding the
/// remainder to its nanoseconds companion.
///
/// Documents may give `end_time` as `1000.01` rather than as the pair
/// `end_time: 1000, end_time_ns: 10000000`.  Integer values and rows whose
/// nanoseconds column is not an integer are left for validation to judge.
fn fold_fractional_seconds(row: &mut RawRow, secs: &str, nanos: &str) {
    let Some(t) = row.get(secs).filter(|v| v.is_f64()).and_then(|v| v.as_f64()) else {
        return;
    };
    let base_ns = match row.get(nanos) {
        None => 0,
        Some(v) => match v.as_i64() {
            Some(ns) => ns,
            None => return,
        },
    };
    let whole = t.floor();
    if !whole.is_finite() || whole.abs() > i32::MAX as f64 {
        return;
    }
    let frac_ns = ((t - whole) * 1e9).round() as i64;
    let total = whole as i64 * NANOS_PER_SECOND + frac_ns + base_ns;
    row.insert(secs.to_string(), total.div_euclid(NANOS_PER_SECOND).into());
    row.insert(nanos.to_string(), total.rem_euclid(NANOS_PER_SECOND).into());
}

/// Declares a row struct together with its column table and lookup.
macro_rules! table_row {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl $name {
            const COLUMNS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn lookup(&self, column: &str) -> Option<Value> {
                match column {
                    $( stringify!($field) => Some(self.$field.to_value()), )*
                    _ => None,
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// process / process_params
// ---------------------------------------------------------------------------

table_row! {
    /// One executable run that contributed to a document.
    pub struct Process {
        program: String,
        #[serde(default)]
        version: String,
        #[serde(default)]
        cvs_repository: String,
        #[serde(default)]
        cvs_entry_time: i32,
        #[serde(default)]
        comment: String,
        #[serde(default)]
        is_online: i32,
        #[serde(default)]
        node: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        unix_procid: i32,
        #[serde(default)]
        start_time: i32,
        #[serde(default)]
        end_time: i32,
        #[serde(default)]
        jobid: i32,
        #[serde(default)]
        domain: String,
        #[serde(default)]
        ifos: String,
        process_id: String,
    }
}

impl TableRow for Process {
    const TABLE_TYPE: TableType = TableType::Process;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}

table_row! {
    /// A single command-line argument of a [`Process`].
    pub struct ProcessParams {
        program: String,
        process_id: String,
        param: String,
        #[serde(default)]
        value: String,
    }
}

impl TableRow for ProcessParams {
    const TABLE_TYPE: TableType = TableType::ProcessParams;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}

// ---------------------------------------------------------------------------
// search_summary / summ_value
// ---------------------------------------------------------------------------

table_row! {
    /// The span of data a search job analysed.
    pub struct SearchSummary {
        process_id: String,
        #[serde(default)]
        shared_object: String,
        #[serde(default)]
        lalwrapper_cvs_tag: String,
        #[serde(default)]
        lal_cvs_tag: String,
        #[serde(default)]
        comment: String,
        #[serde(default)]
        ifos: String,
        in_start_time: i32,
        #[serde(default)]
        in_start_time_ns: i32,
        in_end_time: i32,
        #[serde(default)]
        in_end_time_ns: i32,
        out_start_time: i32,
        #[serde(default)]
        out_start_time_ns: i32,
        out_end_time: i32,
        #[serde(default)]
        out_end_time_ns: i32,
        #[serde(default)]
        nevents: i32,
        #[serde(default)]
        nnodes: i32,
    }
}

impl TableRow for SearchSummary {
    const TABLE_TYPE: TableType = TableType::SearchSummary;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}

table_row! {
    /// A named summary statistic, e.g. an inspiral horizon distance.
    pub struct SummValue {
        program: String,
        process_id: String,
        start_time: i32,
        #[serde(default)]
        start_time_ns: i32,
        end_time: i32,
        #[serde(default)]
        end_time_ns: i32,
        ifo: String,
        name: String,
        value: f32,
        #[serde(default)]
        comment: String,
    }
}

impl TableRow for SummValue {
    const TABLE_TYPE: TableType = TableType::SummValue;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }

    fn ifo(&self) -> Option<&str> {
        Some(&self.ifo)
    }
}

// ---------------------------------------------------------------------------
// sngl_inspiral
// ---------------------------------------------------------------------------

table_row! {
    /// A single-detector inspiral trigger.
    ///
    /// `end_time`/`end_time_ns` give the coalescence time at the detector;
    /// `event_id` is shared by every trigger belonging to one coincidence.
    #[cfg_attr(feature = "python", pyclass(get_all, set_all))]
    pub struct SnglInspiral {
        #[serde(default)]
        process_id: String,
        ifo: String,
        #[serde(default)]
        search: String,
        #[serde(default)]
        channel: String,
        end_time: i32,
        #[serde(default)]
        end_time_ns: i32,
        #[serde(default)]
        end_time_gmst: f64,
        #[serde(default)]
        impulse_time: i32,
        #[serde(default)]
        impulse_time_ns: i32,
        #[serde(default)]
        template_duration: f64,
        #[serde(default)]
        event_duration: f64,
        #[serde(default)]
        amplitude: f32,
        #[serde(default)]
        eff_distance: f32,
        #[serde(default)]
        coa_phase: f32,
        #[serde(default)]
        mass1: f32,
        #[serde(default)]
        mass2: f32,
        #[serde(default)]
        mchirp: f32,
        #[serde(default)]
        mtotal: f32,
        #[serde(default)]
        eta: f32,
        #[serde(default)]
        tau0: f32,
        #[serde(default)]
        tau3: f32,
        #[serde(default)]
        ttotal: f32,
        #[serde(default)]
        f_final: f32,
        snr: f32,
        #[serde(default)]
        chisq: f32,
        #[serde(default)]
        chisq_dof: i32,
        #[serde(default)]
        sigmasq: f64,
        #[serde(default)]
        rsqveto_duration: f32,
        event_id: i64,
    }
}

impl SnglInspiral {
    /// Detector end time as a GPS timestamp.
    pub fn end_time_gps(&self) -> LigoTimeGps {
        LigoTimeGps::new(self.end_time, self.end_time_ns)
    }

    pub fn detector(&self) -> Result<Ifo, crate::types::UnknownIfo> {
        self.ifo.parse()
    }
}

impl TableRow for SnglInspiral {
    const TABLE_TYPE: TableType = TableType::SnglInspiral;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }

    fn ifo(&self) -> Option<&str> {
        Some(&self.ifo)
    }

    fn event_id(&self) -> Option<i64> {
        Some(self.event_id)
    }

    fn normalize(row: &mut RawRow) {
        fold_fractional_seconds(row, "end_time", "end_time_ns");
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl SnglInspiral {
    fn __repr__(&self) -> String {
        format!(
            "SnglInspiral(ifo={}, end_time={}, snr={:.2}, event_id={})",
            self.ifo,
            self.end_time_gps(),
            self.snr,
            self.event_id,
        )
    }
}

// ---------------------------------------------------------------------------
// sim_inspiral
// ---------------------------------------------------------------------------

table_row! {
    /// A simulated signal injected into the data.
    pub struct SimInspiral {
        #[serde(default)]
        process_id: String,
        waveform: String,
        geocent_end_time: i32,
        #[serde(default)]
        geocent_end_time_ns: i32,
        #[serde(default)]
        h_end_time: i32,
        #[serde(default)]
        h_end_time_ns: i32,
        #[serde(default)]
        l_end_time: i32,
        #[serde(default)]
        l_end_time_ns: i32,
        #[serde(default)]
        end_time_gmst: f64,
        #[serde(default)]
        source: String,
        mass1: f32,
        mass2: f32,
        #[serde(default)]
        eta: f32,
        distance: f32,
        #[serde(default)]
        longitude: f32,
        #[serde(default)]
        latitude: f32,
        #[serde(default)]
        inclination: f32,
        #[serde(default)]
        coa_phase: f32,
        #[serde(default)]
        polarization: f32,
        #[serde(default)]
        eff_dist_h: f32,
        #[serde(default)]
        eff_dist_l: f32,
        #[serde(default)]
        f_lower: f32,
    }
}

impl TableRow for SimInspiral {
    const TABLE_TYPE: TableType = TableType::SimInspiral;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}

// ---------------------------------------------------------------------------
// sngl_burst
// ---------------------------------------------------------------------------

table_row! {
    /// A single-detector burst trigger.
    pub struct SnglBurst {
        #[serde(default)]
        process_id: String,
        ifo: String,
        #[serde(default)]
        search: String,
        #[serde(default)]
        channel: String,
        start_time: i32,
        #[serde(default)]
        start_time_ns: i32,
        #[serde(default)]
        peak_time: i32,
        #[serde(default)]
        peak_time_ns: i32,
        #[serde(default)]
        duration: f32,
        #[serde(default)]
        central_freq: f32,
        #[serde(default)]
        bandwidth: f32,
        #[serde(default)]
        amplitude: f32,
        snr: f32,
        #[serde(default)]
        confidence: f32,
        #[serde(default)]
        tfvolume: f32,
        event_id: i64,
    }
}

impl TableRow for SnglBurst {
    const TABLE_TYPE: TableType = TableType::SnglBurst;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }

    fn ifo(&self) -> Option<&str> {
        Some(&self.ifo)
    }

    fn event_id(&self) -> Option<i64> {
        Some(self.event_id)
    }
}

// ---------------------------------------------------------------------------
// multi_inspiral
// ---------------------------------------------------------------------------

table_row! {
    /// A coherent multi-detector inspiral trigger.
    pub struct MultiInspiral {
        #[serde(default)]
        process_id: String,
        ifos: String,
        #[serde(default)]
        search: String,
        end_time: i32,
        #[serde(default)]
        end_time_ns: i32,
        #[serde(default)]
        end_time_gmst: f64,
        #[serde(default)]
        amplitude: f32,
        #[serde(default)]
        ifo1_eff_distance: f32,
        #[serde(default)]
        ifo2_eff_distance: f32,
        #[serde(default)]
        eff_distance: f32,
        #[serde(default)]
        coa_phase: f32,
        #[serde(default)]
        mass1: f32,
        #[serde(default)]
        mass2: f32,
        #[serde(default)]
        mchirp: f32,
        #[serde(default)]
        eta: f32,
        snr: f32,
        #[serde(default)]
        chisq: f32,
        #[serde(default)]
        chisq_dof: i32,
        #[serde(default)]
        sigmasq: f64,
        #[serde(default)]
        ligo_axis_ra: f32,
        #[serde(default)]
        ligo_axis_dec: f32,
        #[serde(default)]
        ligo_angle: f32,
        #[serde(default)]
        ligo_angle_sig: f32,
        #[serde(default)]
        inclination: f32,
        #[serde(default)]
        polarization: f32,
        event_id: i64,
    }
}

impl TableRow for MultiInspiral {
    const TABLE_TYPE: TableType = TableType::MultiInspiral;

    fn columns() -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn column(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }

    fn event_id(&self) -> Option<i64> {
        Some(self.event_id)
    }
    fn normalize(row: &mut RawRow) {
        fold_fractional_seconds(row, "end_time", "end_time_ns");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sngl_inspiral_requires_core_columns() {
        let ok: Result<SnglInspiral, _> = serde_json::from_value(json!({
            "ifo": "H1", "end_time": 1000, "snr": 5.0, "event_id": 100000500000_i64,
        }));
        let row = ok.unwrap();
        assert_eq!(row.end_time_ns, 0);
        assert_eq!(row.detector(), Ok(Ifo::H1));

        let missing: Result<SnglInspiral, _> =
            serde_json::from_value(json!({ "ifo": "H1", "end_time": 1000, "snr": 5.0 }));
        assert!(missing.unwrap_err().to_string().contains("event_id"));
    }

    #[test]
    fn column_lookup_follows_schema() {
        let row = SnglInspiral {
            ifo: "L1".into(),
            snr: 4.0,
            end_time: 1000,
            end_time_ns: 10_000_000,
            event_id: 7,
            ..Default::default()
        };
        assert_eq!(row.column("ifo"), Some(Value::Text("L1".into())));
        assert_eq!(row.column("snr"), Some(Value::Real(4.0)));
        assert_eq!(row.column("end_time"), Some(Value::Int(1000)));
        assert_eq!(row.column("nonsense"), None);
        assert_eq!(row.end_time_gps(), LigoTimeGps::new(1000, 10_000_000));
        assert!(SnglInspiral::columns().contains(&"chisq_dof"));
    }

    fn normalized(value: serde_json::Value) -> SnglInspiral {
        let mut row = value.as_object().unwrap().clone();
        SnglInspiral::normalize(&mut row);
        serde_json::from_value(serde_json::Value::Object(row)).unwrap()
    }

    #[test]
    fn fractional_end_times_fold_into_nanoseconds() {
        let row = normalized(json!({
            "event_id": 100000500000_i64, "ifo": "L1", "snr": 4, "end_time": 1000.01,
        }));
        assert_eq!((row.end_time, row.end_time_ns), (1000, 10_000_000));

        // An explicit nanoseconds column adds to the fraction and carries.
        let row = normalized(json!({
            "ifo": "H1", "snr": 5.0, "end_time": 1000.5, "end_time_ns": 600_000_000,
            "event_id": 1,
        }));
        assert_eq!((row.end_time, row.end_time_ns), (1001, 100_000_000));

        let row = normalized(json!({ "ifo": "H1", "snr": 5.0, "end_time": 2000, "event_id": 1 }));
        assert_eq!((row.end_time, row.end_time_ns), (2000, 0));

        let row = normalized(json!({ "ifo": "H1", "snr": 5.0, "end_time": -0.25, "event_id": 1 }));
        assert_eq!(row.end_time_gps().as_nanos(), -250_000_000);
    }

    #[test]
    fn schemas_without_detector_columns_say_so() {
        let p = Process {
            program: "lalapps_inspiral".into(),
            process_id: "process:process_id:0".into(),
            ..Default::default()
        };
        assert_eq!(p.ifo(), None);
        assert_eq!(p.event_id(), None);
        assert_eq!(
            p.column("program"),
            Some(Value::Text("lalapps_inspiral".into()))
        );
        assert_eq!(Process::TABLE_TYPE, TableType::Process);
    }
}

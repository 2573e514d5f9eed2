//! Common types shared across the inspiral trigger pipeline.
//!
//! These are the small scalar vocabulary types every other module speaks:
//! the enumerated table and detector names, the scalar cell value returned
//! by column extraction, the GPS time mirror, and the analysis
//! configuration consumed by the `readmeta` driver.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[cfg(feature = "python")]
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

use crate::table::TableError;

// ---------------------------------------------------------------------------
// Event identifiers
// ---------------------------------------------------------------------------

/// Modulus stripping the global part of an inspiral `event_id`.
const EVENT_ID_MODULUS: i64 = 1_000_000_000;

/// Divisor selecting the slide field from the remainder.
const SLIDE_DIVISOR: i64 = 100_000;

/// Return the time-slide index embedded in an event identifier.
///
/// The slide number lives in digits 6..9 of the id:
/// `(event_id mod 10^9) div 10^5`.  Floored arithmetic is used so that a
/// negative id still yields a slide in `0..10_000`.
pub fn slide_number(event_id: i64) -> i64 {
    event_id.rem_euclid(EVENT_ID_MODULUS).div_euclid(SLIDE_DIVISOR)
}

// ---------------------------------------------------------------------------
// TableType
// ---------------------------------------------------------------------------

/// The metadata tables a LIGO lightweight document may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    ProcessParams,
    Process,
    SearchSummary,
    SummValue,
    SnglInspiral,
    SimInspiral,
    SnglBurst,
    MultiInspiral,
}

impl TableType {
    pub const ALL: [TableType; 8] = [
        TableType::ProcessParams,
        TableType::Process,
        TableType::SearchSummary,
        TableType::SummValue,
        TableType::SnglInspiral,
        TableType::SimInspiral,
        TableType::SnglBurst,
        TableType::MultiInspiral,
    ];

    /// The table name as it appears in trigger documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::ProcessParams => "process_params",
            TableType::Process => "process",
            TableType::SearchSummary => "search_summary",
            TableType::SummValue => "summ_value",
            TableType::SnglInspiral => "sngl_inspiral",
            TableType::SimInspiral => "sim_inspiral",
            TableType::SnglBurst => "sngl_burst",
            TableType::MultiInspiral => "multi_inspiral",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableType {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TableError::UnknownTableType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Ifo
// ---------------------------------------------------------------------------

/// An interferometer site identifier.
///
/// The derived ordering (`G1 < H1 < H2 < L1 < T1 < V1`) is the order in
/// which a coincidence lists its triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ifo {
    /// GEO600, Hannover.
    G1,
    /// LIGO Hanford 4 km.
    H1,
    /// LIGO Hanford 2 km.
    H2,
    /// LIGO Livingston 4 km.
    L1,
    /// TAMA300, Tokyo.
    T1,
    /// Virgo, Cascina.
    V1,
}

/// Returned when a string does not name a known interferometer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown interferometer '{0}'")]
pub struct UnknownIfo(pub String);

impl Ifo {
    pub const ALL: [Ifo; 6] = [Ifo::G1, Ifo::H1, Ifo::H2, Ifo::L1, Ifo::T1, Ifo::V1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ifo::G1 => "G1",
            Ifo::H1 => "H1",
            Ifo::H2 => "H2",
            Ifo::L1 => "L1",
            Ifo::T1 => "T1",
            Ifo::V1 => "V1",
        }
    }
}

impl fmt::Display for Ifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ifo {
    type Err = UnknownIfo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ifo::ALL
            .iter()
            .copied()
            .find(|ifo| ifo.as_str() == s)
            .ok_or_else(|| UnknownIfo(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// One cell of a metadata table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// The cell as a float, or `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Conversion of a typed column field into a [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl ToValue for i32 {
    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

// ---------------------------------------------------------------------------
// LigoTimeGps
// ---------------------------------------------------------------------------

pub(crate) const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// GPS time with nanosecond resolution.
///
/// Field layout matches LAL's `LIGOTimeGPS` (`INT4 gpsSeconds;
/// INT4 gpsNanoSeconds;`) so the struct can be handed across an FFI
/// boundary unchanged.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LigoTimeGps {
    pub gps_seconds: i32,
    pub gps_nano_seconds: i32,
}

impl LigoTimeGps {
    pub fn new(gps_seconds: i32, gps_nano_seconds: i32) -> Self {
        Self {
            gps_seconds,
            gps_nano_seconds,
        }
    }

    /// Total nanoseconds since the GPS epoch.
    pub fn as_nanos(&self) -> i64 {
        i64::from(self.gps_seconds) * NANOS_PER_SECOND + i64::from(self.gps_nano_seconds)
    }

    /// Inverse of [`LigoTimeGps::as_nanos`], normalising the nanosecond
    /// field into `0..1e9`.
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            gps_seconds: nanos.div_euclid(NANOS_PER_SECOND) as i32,
            gps_nano_seconds: nanos.rem_euclid(NANOS_PER_SECOND) as i32,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.gps_seconds) + f64::from(self.gps_nano_seconds) * 1e-9
    }
}

impl fmt::Display for LigoTimeGps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LIGOTimeGPS({},{})", self.gps_seconds, self.gps_nano_seconds)
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl LigoTimeGps {
    #[new]
    #[pyo3(signature = (gps_seconds, gps_nano_seconds=0))]
    fn py_new(gps_seconds: i32, gps_nano_seconds: i32) -> Self {
        Self::new(gps_seconds, gps_nano_seconds)
    }

    fn __repr__(&self) -> String {
        self.to_string()
    }
}

// ---------------------------------------------------------------------------
// AnalysisParams
// ---------------------------------------------------------------------------

/// Errors raised while loading an [`AnalysisParams`] file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for a `readmeta` run.
///
/// Every field is optional in the JSON form; command-line flags take
/// precedence over values read from a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Table to read from the trigger files.
    pub table: String,

    /// Regular expression applied to the `ifo` column before any other
    /// processing.
    pub ifo_pattern: Option<String>,

    /// Keep only triggers from this time slide.
    pub slide: Option<i64>,

    /// Keep only coincidences found in exactly this set of detectors.
    pub coinc_ifos: Option<Vec<Ifo>>,

    /// Cluster coincidences over windows of this many seconds.
    pub cluster_window_s: Option<f64>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            table: TableType::SnglInspiral.as_str().to_string(),
            ifo_pattern: None,
            slide: None,
            coinc_ifos: None,
            cluster_window_s: None,
        }
    }
}

impl AnalysisParams {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Whether the run needs coincidences built from the triggers.
    pub fn wants_coincidences(&self) -> bool {
        self.coinc_ifos.is_some() || self.cluster_window_s.is_some()
    }
}

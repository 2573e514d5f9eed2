//! # inspiral-core
//!
//! Trigger bookkeeping for compact-binary inspiral searches: metadata
//! tables read from search output, coincidence reconstruction across
//! detectors, and time-windowed clustering, with optional Python bindings
//! via [PyO3](https://pyo3.rs).
//!
//! ## Overview
//!
//! | Module       | Purpose                                                      |
//! |--------------|--------------------------------------------------------------|
//! | [`reader`]   | Locates trigger documents and returns their raw table rows   |
//! | [`rows`]     | Typed row schemas (`sngl_inspiral`, `process`, ...)          |
//! | [`table`]    | Generic metadata tables: columns, ifo and slide cuts         |
//! | [`coinc`]    | Rebuilds coincidences from triggers sharing an event id      |
//! | [`cluster`]  | Keeps the loudest coincidence in each time window            |
//! | [`types`]    | Shared types (detectors, table names, GPS time, parameters)  |
//!
//! ## Rust usage
//!
//! ```no_run
//! use std::time::Duration;
//! use inspiral_core::{CoincInspiralTable, Ifo, JsonTableReader, MetaDataTable, SnglInspiral};
//!
//! let sngls: MetaDataTable<SnglInspiral> =
//!     MetaDataTable::read(&JsonTableReader, Some("triggers/.*-INSPIRAL-.*\\.json"))?;
//! let coincs = CoincInspiralTable::build(&sngls)?;
//! let loudest = coincs
//!     .filter_by_ifo_set(&[Ifo::H1, Ifo::L1])
//!     .cluster(Duration::from_secs(10))?;
//! println!("{} clustered H1L1 coincidences", loudest.row_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Python usage
//!
//! Built with `--features python`, the library exposes a module called
//! `inspiral_core`; see [`python`] for the class list.

pub mod cluster;
pub mod coinc;
#[cfg(feature = "python")]
pub mod python;
pub mod reader;
pub mod rows;
pub mod table;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use cluster::ClusterError;
pub use coinc::{CoincError, CoincInspiral, CoincInspiralTable};
pub use reader::{JsonTableReader, RawRow, ReaderError, TableReader};
pub use rows::{SnglInspiral, TableRow};
pub use table::{AnyTable, MetaDataTable, TableError};
pub use types::{slide_number, AnalysisParams, Ifo, LigoTimeGps, TableType, Value};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The top-level Python module exposed by this crate.
///
/// Registered classes:
/// - `MetaDataTable`: any table type, chosen by name
/// - `SnglInspiralTable`: single-detector triggers
/// - `CoincInspiralTable`: coincidences built from them
/// - `SnglInspiral`: one trigger row
/// - `LigoTimeGps`: GPS timestamp
#[cfg(feature = "python")]
#[pymodule]
fn inspiral_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyMetaDataTable>()?;
    m.add_class::<python::PySnglInspiralTable>()?;
    m.add_class::<python::PyCoincInspiralTable>()?;
    m.add_class::<SnglInspiral>()?;
    m.add_class::<LigoTimeGps>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "Inspiral trigger tables, coincidences and clustering.")?;

    Ok(())
}

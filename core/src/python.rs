//! Python bindings.
//!
//! Compiled with the `python` feature.  The classes keep the method names
//! of the pylal `readMeta` API so existing analysis scripts port over with
//! little change:
//!
//! ```python
//! import inspiral_core
//!
//! sngls = inspiral_core.SnglInspiralTable("triggers/.*-INSPIRAL.*\\.json")
//! procs = inspiral_core.MetaDataTable("triggers/.*-INSPIRAL.*\\.json", "process")
//! coincs = inspiral_core.CoincInspiralTable(sngls)
//! loudest = coincs.coinctype(["H1", "L1"]).cluster(10.0)
//! print(loudest.mkarray("snr", "H1"))
//! ```

use std::time::Duration;

use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::coinc::{CoincError, CoincInspiralTable};
use crate::reader::JsonTableReader;
use crate::rows::SnglInspiral;
use crate::table::{AnyTable, MetaDataTable, TableError};
use crate::types::{Ifo, Value};

fn table_err(e: TableError) -> PyErr {
    match e {
        TableError::Reader(_) => PyIOError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn parse_ifo(name: &str) -> PyResult<Ifo> {
    name.parse()
        .map_err(|e: crate::types::UnknownIfo| PyValueError::new_err(e.to_string()))
}

// ---------------------------------------------------------------------------
// MetaDataTable
// ---------------------------------------------------------------------------

/// A table of any recognised type, chosen by name.
#[pyclass(name = "MetaDataTable")]
#[derive(Clone, Debug)]
pub struct PyMetaDataTable {
    inner: AnyTable,
}

#[pymethods]
impl PyMetaDataTable {
    /// Read the `tabletype` table from the files matching `triggerfile`.
    #[new]
    #[pyo3(signature = (triggerfile, tabletype))]
    fn new(triggerfile: Option<&str>, tabletype: &str) -> PyResult<Self> {
        let inner = AnyTable::load(&JsonTableReader, triggerfile, tabletype).map_err(table_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn tabletype(&self) -> &'static str {
        self.inner.table_type().as_str()
    }

    fn nevents(&self) -> usize {
        self.inner.row_count()
    }

    fn mkarray(&self, colname: &str) -> PyResult<Vec<f64>> {
        self.inner
            .numeric_column(colname)
            .map(|a| a.to_vec())
            .map_err(table_err)
    }

    /// Every value of `colname`, numeric or text, in row order.
    fn getcolumn(&self, py: Python<'_>, colname: &str) -> PyResult<Vec<PyObject>> {
        let values = self.inner.column_as_array(colname).map_err(table_err)?;
        Ok(values
            .into_iter()
            .map(|v| match v {
                Value::Int(i) => i.into_py(py),
                Value::Real(x) => x.into_py(py),
                Value::Text(t) => t.into_py(py),
            })
            .collect())
    }

    fn ifocut(&self, ifo: &str) -> PyResult<Self> {
        let inner = self.inner.filter_by_ifo(ifo).map_err(table_err)?;
        Ok(Self { inner })
    }

    fn getslide(&self, slide_num: i64) -> PyResult<Self> {
        let inner = self.inner.filter_by_slide(slide_num).map_err(table_err)?;
        Ok(Self { inner })
    }

    fn append(&mut self, table: PyRef<'_, PyMetaDataTable>) -> PyResult<()> {
        self.inner.append(&table.inner).map_err(table_err)
    }

    fn __len__(&self) -> usize {
        self.inner.row_count()
    }

    fn __repr__(&self) -> String {
        format!(
            "MetaDataTable(tabletype={}, nevents={})",
            self.inner.table_type(),
            self.inner.row_count()
        )
    }
}

// ---------------------------------------------------------------------------
// SnglInspiralTable
// ---------------------------------------------------------------------------

/// A `sngl_inspiral` table.
#[pyclass(name = "SnglInspiralTable")]
#[derive(Clone, Debug, Default)]
pub struct PySnglInspiralTable {
    inner: MetaDataTable<SnglInspiral>,
}

#[pymethods]
impl PySnglInspiralTable {
    /// Read triggers from the files matching `triggerfile`, or start empty.
    #[new]
    #[pyo3(signature = (triggerfile=None))]
    fn new(triggerfile: Option<&str>) -> PyResult<Self> {
        let inner = MetaDataTable::read(&JsonTableReader, triggerfile).map_err(table_err)?;
        Ok(Self { inner })
    }

    fn nevents(&self) -> usize {
        self.inner.row_count()
    }

    fn mkarray(&self, colname: &str) -> PyResult<Vec<f64>> {
        self.inner
            .numeric_column(colname)
            .map(|a| a.to_vec())
            .map_err(table_err)
    }

    fn ifocut(&self, ifo: &str) -> PyResult<Self> {
        let inner = self.inner.filter_by_ifo(ifo).map_err(table_err)?;
        Ok(Self { inner })
    }

    fn append(&mut self, table: PyRef<'_, PySnglInspiralTable>) {
        self.inner.append(&table.inner);
    }

    fn getslide(&self, slide_num: i64) -> PyResult<Self> {
        let inner = self.inner.filter_by_slide(slide_num).map_err(table_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn table(&self) -> Vec<SnglInspiral> {
        self.inner.rows().to_vec()
    }

    fn __len__(&self) -> usize {
        self.inner.row_count()
    }

    fn __repr__(&self) -> String {
        format!("SnglInspiralTable(nevents={})", self.inner.row_count())
    }
}

// ---------------------------------------------------------------------------
// CoincInspiralTable
// ---------------------------------------------------------------------------

/// Coincidences reconstructed from a `sngl_inspiral` table.
#[pyclass(name = "CoincInspiralTable")]
#[derive(Clone, Debug, Default)]
pub struct PyCoincInspiralTable {
    inner: CoincInspiralTable,
}

#[pymethods]
impl PyCoincInspiralTable {
    #[new]
    #[pyo3(signature = (insp_triggers=None))]
    fn new(insp_triggers: Option<PyRef<'_, PySnglInspiralTable>>) -> PyResult<Self> {
        let inner = match insp_triggers {
            Some(t) => CoincInspiralTable::build(&t.inner).map_err(|e: CoincError| {
                PyValueError::new_err(e.to_string())
            })?,
            None => CoincInspiralTable::new(),
        };
        Ok(Self { inner })
    }

    fn nevents(&self) -> usize {
        self.inner.row_count()
    }

    /// Column `colname` of the `ifoname` trigger, 0 where absent.
    fn mkarray(&self, colname: &str, ifoname: &str) -> PyResult<Vec<f64>> {
        let ifo = parse_ifo(ifoname)?;
        self.inner
            .column_for_ifo(colname, ifo)
            .map(|a| a.to_vec())
            .map_err(table_err)
    }

    fn coinctype(&self, ifolist: Vec<String>) -> PyResult<Self> {
        let ifos = ifolist
            .iter()
            .map(|s| parse_ifo(s))
            .collect::<PyResult<Vec<Ifo>>>()?;
        Ok(Self {
            inner: self.inner.filter_by_ifo_set(&ifos),
        })
    }

    fn getsngls(&self, ifo: &str) -> PyResult<PySnglInspiralTable> {
        let ifo = parse_ifo(ifo)?;
        Ok(PySnglInspiralTable {
            inner: self.inner.extract_singles(ifo),
        })
    }

    fn getslide(&self, slide_num: i64) -> Self {
        Self {
            inner: self.inner.filter_by_slide(slide_num),
        }
    }

    /// Keep the loudest coincidence in each `cluster_window` seconds.
    fn cluster(&self, cluster_window: f64) -> PyResult<Self> {
        let window = Duration::try_from_secs_f64(cluster_window)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let inner = self
            .inner
            .cluster(window)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(Self { inner })
    }

    /// `snrsq` of every coincidence, in table order.
    fn snrsq(&self) -> Vec<f64> {
        self.inner.iter().map(|c| c.snrsq).collect()
    }

    fn __len__(&self) -> usize {
        self.inner.row_count()
    }

    fn __repr__(&self) -> String {
        format!("CoincInspiralTable(nevents={})", self.inner.row_count())
    }
}

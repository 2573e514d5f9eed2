//! Coincident inspiral triggers.
//!
//! The inspiral pipeline writes coincidences out as ordinary
//! `sngl_inspiral` rows that share an `event_id`.  [`CoincInspiralTable`]
//! puts them back together: one [`CoincInspiral`] per event id, holding
//! the contributing trigger from each detector and the sum of their
//! squared SNRs, which serves as the ranking statistic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use log::{debug, info};
use ndarray::Array1;
use serde::Serialize;

use crate::rows::{SnglInspiral, TableRow};
use crate::table::{MetaDataTable, TableError};
use crate::types::{slide_number, Ifo, LigoTimeGps, TableType, UnknownIfo};

/// Detector order used to pick a coincidence's reference trigger.
pub const REFERENCE_IFO_ORDER: [Ifo; 4] = [Ifo::G1, Ifo::H1, Ifo::H2, Ifo::L1];

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while reconstructing coincidences.
#[derive(Debug, thiserror::Error)]
pub enum CoincError {
    #[error("trigger {index}: {source}")]
    UnknownIfo {
        index: usize,
        #[source]
        source: UnknownIfo,
    },

    #[error("event {event_id} has more than one {ifo} trigger")]
    DuplicateIfo { event_id: i64, ifo: Ifo },
}

// ---------------------------------------------------------------------------
// CoincInspiral
// ---------------------------------------------------------------------------

/// All triggers sharing one event id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoincInspiral {
    pub event_id: i64,

    /// Sum of `snr²` over the contributing triggers.
    pub snrsq: f64,

    triggers: BTreeMap<Ifo, SnglInspiral>,
}

impl CoincInspiral {
    fn empty(event_id: i64) -> Self {
        Self {
            event_id,
            snrsq: 0.0,
            triggers: BTreeMap::new(),
        }
    }

    fn insert(&mut self, ifo: Ifo, trigger: SnglInspiral) -> Result<(), CoincError> {
        if self.triggers.contains_key(&ifo) {
            return Err(CoincError::DuplicateIfo {
                event_id: self.event_id,
                ifo,
            });
        }
        let snr = f64::from(trigger.snr);
        self.snrsq += snr * snr;
        self.triggers.insert(ifo, trigger);
        Ok(())
    }

    /// Number of detectors contributing to the coincidence.
    pub fn numifos(&self) -> usize {
        self.triggers.len()
    }

    pub fn get(&self, ifo: Ifo) -> Option<&SnglInspiral> {
        self.triggers.get(&ifo)
    }

    pub fn contains(&self, ifo: Ifo) -> bool {
        self.triggers.contains_key(&ifo)
    }

    /// Contributing detectors in `Ifo` order.
    pub fn ifos(&self) -> impl Iterator<Item = Ifo> + '_ {
        self.triggers.keys().copied()
    }

    pub fn triggers(&self) -> impl Iterator<Item = (Ifo, &SnglInspiral)> + '_ {
        self.triggers.iter().map(|(ifo, t)| (*ifo, t))
    }

    pub fn slide_number(&self) -> i64 {
        slide_number(self.event_id)
    }

    /// End time of the first trigger in [`REFERENCE_IFO_ORDER`], standing in
    /// for the time of the whole coincidence.
    pub fn reference_end_time(&self) -> Option<LigoTimeGps> {
        REFERENCE_IFO_ORDER
            .iter()
            .find_map(|ifo| self.triggers.get(ifo))
            .map(SnglInspiral::end_time_gps)
    }
}

// ---------------------------------------------------------------------------
// CoincInspiralTable
// ---------------------------------------------------------------------------

/// An ordered collection of coincidences.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CoincInspiralTable {
    coincs: Vec<CoincInspiral>,
}

impl CoincInspiralTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group single-detector triggers into coincidences by event id.
    ///
    /// Coincidences appear in the order their event id is first seen.
    pub fn build(triggers: &MetaDataTable<SnglInspiral>) -> Result<Self, CoincError> {
        let start = Instant::now();
        let mut coincs: Vec<CoincInspiral> = Vec::new();
        let mut index: HashMap<i64, usize> = HashMap::new();

        for (i, trigger) in triggers.iter().enumerate() {
            let ifo = trigger
                .detector()
                .map_err(|source| CoincError::UnknownIfo { index: i, source })?;
            let slot = *index.entry(trigger.event_id).or_insert_with(|| {
                coincs.push(CoincInspiral::empty(trigger.event_id));
                coincs.len() - 1
            });
            coincs[slot].insert(ifo, trigger.clone())?;
        }

        info!(
            "Built {} coincidence(s) from {} trigger(s) in {} ms",
            coincs.len(),
            triggers.row_count(),
            start.elapsed().as_millis(),
        );
        Ok(Self { coincs })
    }

    pub fn from_coincs(coincs: Vec<CoincInspiral>) -> Self {
        Self { coincs }
    }

    pub fn row_count(&self) -> usize {
        self.coincs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coincs.is_empty()
    }

    pub fn coincs(&self) -> &[CoincInspiral] {
        &self.coincs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CoincInspiral> {
        self.coincs.iter()
    }

    /// Coincidences found in exactly the detectors in `ifos`.
    ///
    /// An `[H1, L1]` selection drops `H1L1G1` triples as well as `H1`
    /// singles.
    pub fn filter_by_ifo_set(&self, ifos: &[Ifo]) -> Self {
        let wanted: BTreeSet<Ifo> = ifos.iter().copied().collect();
        let coincs: Vec<CoincInspiral> = self
            .coincs
            .iter()
            .filter(|c| c.numifos() == wanted.len() && wanted.iter().all(|ifo| c.contains(*ifo)))
            .cloned()
            .collect();
        debug!(
            "{} of {} coincidence(s) are {:?}",
            coincs.len(),
            self.coincs.len(),
            wanted,
        );
        Self { coincs }
    }

    /// The `ifo` trigger of every coincidence that has one.
    pub fn extract_singles(&self, ifo: Ifo) -> MetaDataTable<SnglInspiral> {
        self.coincs
            .iter()
            .filter_map(|c| c.get(ifo).cloned())
            .collect()
    }

    /// Coincidences belonging to time slide `slide`.
    pub fn filter_by_slide(&self, slide: i64) -> Self {
        Self {
            coincs: self
                .coincs
                .iter()
                .filter(|c| c.slide_number() == slide)
                .cloned()
                .collect(),
        }
    }

    /// One value of `column` per coincidence, taken from its `ifo`
    /// trigger, with `0.0` where that detector did not contribute.
    pub fn column_for_ifo(&self, column: &str, ifo: Ifo) -> Result<Array1<f64>, TableError> {
        if !SnglInspiral::columns().contains(&column) {
            return Err(TableError::MissingColumn {
                table: TableType::SnglInspiral,
                column: column.to_string(),
            });
        }
        self.coincs
            .iter()
            .map(|c| match c.get(ifo) {
                None => Ok(0.0),
                Some(trigger) => trigger
                    .column(column)
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| TableError::NonNumericColumn {
                        table: TableType::SnglInspiral,
                        column: column.to_string(),
                    }),
            })
            .collect::<Result<Vec<f64>, _>>()
            .map(Array1::from)
    }

    pub(crate) fn push(&mut self, coinc: CoincInspiral) {
        self.coincs.push(coinc);
    }
}

impl<'a> IntoIterator for &'a CoincInspiralTable {
    type Item = &'a CoincInspiral;
    type IntoIter = std::slice::Iter<'a, CoincInspiral>;

    fn into_iter(self) -> Self::IntoIter {
        self.coincs.iter()
    }
}

//! Time-windowed clustering of coincidences.
//!
//! A loud signal produces a burst of coincidences spread over a short
//! stretch of time.  Clustering divides the time axis into fixed windows
//! aligned to multiples of the window length and keeps only the loudest
//! coincidence (largest `snrsq`) from each window that has any.
//!
//! # Algorithm
//!
//! 1. Each coincidence is placed in time by the end time of its reference
//!    trigger (see [`CoincInspiral::reference_end_time`]).  The times of
//!    the other detectors are not consulted.
//! 2. Window keys `w * floor(t / w)` are collected in first-seen order.
//! 3. For every key the whole table is scanned again and a coincidence
//!    joins the window when `floor((t - key) / w) == 0`.
//! 4. The first coincidence with the strictly largest `snrsq` wins.
//!
//! Times are handled as integer nanoseconds, so window membership is
//! exact: a coincidence at `key + w` belongs to the next window only.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::coinc::{CoincInspiral, CoincInspiralTable};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while clustering.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("cluster window must be a positive number of nanoseconds that fits in i64, got {0:?}")]
    InvalidWindow(Duration),

    #[error("event {event_id} has no G1, H1, H2 or L1 trigger to take a time from")]
    NoReferenceIfo { event_id: i64 },

    #[error("cluster window starting at {start_ns} ns holds no coincidences")]
    EmptyClusterBucket { start_ns: i64 },
}

fn reference_nanos(coinc: &CoincInspiral) -> Result<i64, ClusterError> {
    coinc
        .reference_end_time()
        .map(|t| t.as_nanos())
        .ok_or(ClusterError::NoReferenceIfo {
            event_id: coinc.event_id,
        })
}

impl CoincInspiralTable {
    /// Keep the loudest coincidence in each `window` of time.
    pub fn cluster(&self, window: Duration) -> Result<CoincInspiralTable, ClusterError> {
        let start = Instant::now();
        let w = i64::try_from(window.as_nanos())
            .ok()
            .filter(|w| *w > 0)
            .ok_or(ClusterError::InvalidWindow(window))?;

        // -- window keys, first-seen order ---------------------------------
        let mut keys: Vec<i64> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();
        for coinc in self.iter() {
            let key = w * reference_nanos(coinc)?.div_euclid(w);
            if seen.insert(key) {
                keys.push(key);
            }
        }

        // -- loudest per window --------------------------------------------
        let mut clustered = CoincInspiralTable::new();
        for &key in &keys {
            let mut loudest: Option<&CoincInspiral> = None;
            let mut members = 0usize;
            for coinc in self.iter() {
                let t = reference_nanos(coinc)?;
                if (t - key).div_euclid(w) != 0 {
                    continue;
                }
                members += 1;
                if loudest.map_or(true, |best| coinc.snrsq > best.snrsq) {
                    loudest = Some(coinc);
                }
            }

            let winner = loudest.ok_or(ClusterError::EmptyClusterBucket { start_ns: key })?;
            debug!(
                "Window at {} ns: {} coincidence(s), kept event {} (snrsq={:.2})",
                key, members, winner.event_id, winner.snrsq,
            );
            clustered.push(winner.clone());
        }

        info!(
            "Clustered {} coincidence(s) into {} over {:?} windows in {} ms",
            self.row_count(),
            clustered.row_count(),
            window,
            start.elapsed().as_millis(),
        );
        Ok(clustered)
    }
}

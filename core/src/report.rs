//! End-of-run summary, serialized to JSON and stored with the run.
//!
//! The report carries everything a caller needs to judge a run without
//! reading the population tables: fit quality per county, draw counts per
//! municipality, role totals and the capacity ledger per destination type.

use crate::{
    assignment::AssignmentStats,
    draw::MunicipalityDraw,
    ipu::{FitReport, StopReason},
    relationship::RelationshipStats,
    types::RunId,
    vacancy::CapacityLedger,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthReport {
    pub run_id: RunId,
    pub seed: u64,
    pub records_used: u64,
    pub records_dropped: u64,
    pub fit: Vec<FitReport>,
    pub draw: Vec<MunicipalityDraw>,
    pub households: u64,
    pub persons: u64,
    pub relationships: RelationshipStats,
    pub assignment: AssignmentStats,
    /// Keyed by destination type display form, e.g. `school:primary`.
    pub capacity: BTreeMap<String, CapacityLedger>,
}

impl SynthReport {
    pub fn new(run_id: RunId, seed: u64) -> Self {
        Self {
            run_id,
            seed,
            ..Default::default()
        }
    }

    /// Largest best-so-far error over all counties.
    pub fn worst_fit_error(&self) -> Option<f64> {
        self.fit.iter().map(|f| f.error).reduce(f64::max)
    }

    /// Counties whose fit hit the iteration cap without converging.
    pub fn counties_at_iteration_cap(&self) -> usize {
        self.fit
            .iter()
            .filter(|f| f.stop_reason == StopReason::IterationCap)
            .count()
    }

    pub fn total_refills(&self) -> u64 {
        self.draw.iter().map(|d| d.refills as u64).sum()
    }
}

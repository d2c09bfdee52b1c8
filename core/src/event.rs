//! The run's event log.
//!
//! RULE: Stages report what they did ONLY through events.
//! A stage never writes to the store itself; the engine persists
//! every event a stage returns, in order.

use crate::{
    ipu::StopReason,
    types::{CountyId, MunicipalityId, RunId},
};
use serde::{Deserialize, Serialize};

/// Every event emitted during a synthesis run.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SynthEvent {
    // ── Engine events ──────────────────────────────
    RunInitialized {
        run_id: RunId,
        seed: u64,
    },
    StageStarted {
        stage: String,
    },
    StageCompleted {
        stage: String,
    },
    RecordsDropped {
        dropped: u64,
        kept: u64,
    },

    // ── Fitting ────────────────────────────────────
    CountyFitted {
        county: CountyId,
        municipalities: u64,
        iterations: u32,
        best_iteration: u32,
        error: f64,
        stop_reason: StopReason,
    },

    // ── Draw ───────────────────────────────────────
    MunicipalityDrawn {
        municipality: MunicipalityId,
        households: u32,
        persons: u64,
        refills: u32,
    },

    // ── Relationship ───────────────────────────────
    HouseholdsClassified {
        households: u64,
        children: u64,
        singles: u64,
        married: u64,
    },

    // ── Assignment ─────────────────────────────────
    DestinationsAssigned {
        destination_type: String,
        assigned: u64,
        outside_study_area: u64,
    },

    // ── Persistence ────────────────────────────────
    PopulationPersisted {
        households: u64,
        persons: u64,
        dwellings: u64,
    },
}

impl SynthEvent {
    /// Stable name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. } => "run_initialized",
            Self::StageStarted { .. } => "stage_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::RecordsDropped { .. } => "records_dropped",
            Self::CountyFitted { .. } => "county_fitted",
            Self::MunicipalityDrawn { .. } => "municipality_drawn",
            Self::HouseholdsClassified { .. } => "households_classified",
            Self::DestinationsAssigned { .. } => "destinations_assigned",
            Self::PopulationPersisted { .. } => "population_persisted",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    /// Position of the event within its run, from 0.
    pub sequence: u64,
    pub stage: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SynthEvent
}

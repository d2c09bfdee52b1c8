//! Stage trait and the state stages hand to one another.
//!
//! RULE: Every pipeline step implements SynthStage.
//! The engine calls run() on each registered stage exactly once,
//! in registration order. The order is fixed and documented in engine.rs.

use crate::{
    controls::ControlTotals,
    error::SynthResult,
    event::SynthEvent,
    geography::Geography,
    impedance::ImpedanceMatrix,
    inputs::SynthInputs,
    ipu::WeightTable,
    microdata::Microdata,
    population::Population,
    report::SynthReport,
    rng::{StageRng, StageSlot},
    vacancy::VacancyRegistry,
};

/// Everything the stages read and produce over one run.
///
/// Inputs are read-only except `vacancies`, which the assignment stage
/// consumes. `weights` and `population` start empty and are filled by
/// the fitting and draw stages.
pub struct PipelineState {
    pub microdata: Microdata,
    pub controls: ControlTotals,
    pub geography: Geography,
    pub impedance: ImpedanceMatrix,
    pub vacancies: VacancyRegistry,
    pub weights: Option<WeightTable>,
    pub population: Option<Population>,
    pub report: SynthReport,
}

impl PipelineState {
    pub fn new(inputs: SynthInputs, report: SynthReport) -> Self {
        Self {
            microdata: inputs.microdata,
            controls: inputs.controls,
            geography: inputs.geography,
            impedance: inputs.impedance,
            vacancies: inputs.vacancies,
            weights: None,
            population: None,
            report,
        }
    }
}

/// The contract every stage must fulfill.
pub trait SynthStage: Send {
    /// Unique stable name for this stage.
    fn name(&self) -> &'static str;

    /// Which RNG stream the engine hands this stage.
    fn slot(&self) -> StageSlot;

    /// Called once per run by the engine.
    ///
    /// - `state`: outputs of every earlier stage plus the inputs
    /// - `rng`:   this stage's deterministic RNG
    ///
    /// Returns the events to add to the run's event log.
    fn run(&mut self, state: &mut PipelineState, rng: &mut StageRng)
        -> SynthResult<Vec<SynthEvent>>;
}

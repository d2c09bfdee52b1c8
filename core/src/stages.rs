//! The four synthesis stages, each a thin adapter from `PipelineState`
//! onto its engine.

use crate::{
    assignment::AssignmentEngine,
    config::SynthConfig,
    draw::DrawEngine,
    error::{SynthError, SynthResult},
    event::SynthEvent,
    ipu::IpuEngine,
    relationship::RelationshipClassifier,
    rng::{StageRng, StageSlot},
    stage::{PipelineState, SynthStage},
};

// ── Fitting ────────────────────────────────────────────────────────

pub struct FittingStage {
    engine: IpuEngine,
}

impl FittingStage {
    pub fn new(config: &SynthConfig) -> SynthResult<Self> {
        Ok(Self {
            engine: IpuEngine::new(config.ipu.clone())?,
        })
    }
}

impl SynthStage for FittingStage {
    fn name(&self) -> &'static str {
        "fitting"
    }

    fn slot(&self) -> StageSlot {
        StageSlot::Fitting
    }

    // IPU is deterministic; the stream is reserved but never drawn from.
    fn run(&mut self, state: &mut PipelineState, _rng: &mut StageRng) -> SynthResult<Vec<SynthEvent>> {
        let fit = self
            .engine
            .fit(&state.microdata.records, &state.controls, &state.geography)?;

        let events = fit
            .reports
            .iter()
            .map(|r| SynthEvent::CountyFitted {
                county: r.county,
                municipalities: r.municipalities as u64,
                iterations: r.iterations,
                best_iteration: r.best_iteration,
                error: r.error,
                stop_reason: r.stop_reason,
            })
            .collect();

        state.report.fit = fit.reports;
        state.weights = Some(fit.weights);
        Ok(events)
    }
}

// ── Draw ───────────────────────────────────────────────────────────

pub struct DrawStage {
    engine: DrawEngine,
}

impl DrawStage {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            engine: DrawEngine::new(config.draw.clone()),
        }
    }
}

impl SynthStage for DrawStage {
    fn name(&self) -> &'static str {
        "draw"
    }

    fn slot(&self) -> StageSlot {
        StageSlot::Draw
    }

    fn run(&mut self, state: &mut PipelineState, rng: &mut StageRng) -> SynthResult<Vec<SynthEvent>> {
        let weights = state
            .weights
            .as_ref()
            .ok_or(SynthError::StageOrder { stage: "draw" })?;
        let outcome = self.engine.draw(
            &state.microdata.records,
            weights,
            &state.controls,
            &state.geography,
            rng,
        )?;

        let events = outcome
            .municipalities
            .iter()
            .map(|m| SynthEvent::MunicipalityDrawn {
                municipality: m.municipality,
                households: m.households,
                persons: m.persons,
                refills: m.refills,
            })
            .collect();

        state.report.households = outcome.population.household_count() as u64;
        state.report.persons = outcome.population.person_count() as u64;
        state.report.draw = outcome.municipalities;
        state.population = Some(outcome.population);
        Ok(events)
    }
}

// ── Relationship ───────────────────────────────────────────────────

pub struct RelationshipStage {
    classifier: RelationshipClassifier,
}

impl RelationshipStage {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            classifier: RelationshipClassifier::new(config.relationship.clone()),
        }
    }
}

impl SynthStage for RelationshipStage {
    fn name(&self) -> &'static str {
        "relationship"
    }

    fn slot(&self) -> StageSlot {
        StageSlot::Relationship
    }

    fn run(&mut self, state: &mut PipelineState, rng: &mut StageRng) -> SynthResult<Vec<SynthEvent>> {
        let population = state
            .population
            .as_mut()
            .ok_or(SynthError::StageOrder { stage: "relationship" })?;
        let stats = self.classifier.classify(population, rng);

        let event = SynthEvent::HouseholdsClassified {
            households: stats.households,
            children: stats.children,
            singles: stats.singles,
            married: stats.married,
        };
        state.report.relationships = stats;
        Ok(vec![event])
    }
}

// ── Assignment ─────────────────────────────────────────────────────

pub struct AssignmentStage {
    engine: AssignmentEngine,
}

impl AssignmentStage {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            engine: AssignmentEngine::new(config.assignment.clone()),
        }
    }
}

impl SynthStage for AssignmentStage {
    fn name(&self) -> &'static str {
        "assignment"
    }

    fn slot(&self) -> StageSlot {
        StageSlot::Assignment
    }

    fn run(&mut self, state: &mut PipelineState, rng: &mut StageRng) -> SynthResult<Vec<SynthEvent>> {
        let population = state
            .population
            .as_mut()
            .ok_or(SynthError::StageOrder { stage: "assignment" })?;
        let stats = self
            .engine
            .assign(population, &mut state.vacancies, &state.impedance, rng)?;

        let events = stats
            .per_type
            .iter()
            .map(|(destination_type, t)| SynthEvent::DestinationsAssigned {
                destination_type: destination_type.clone(),
                assigned: t.assigned,
                outside_study_area: t.outside_study_area,
            })
            .collect();

        state.report.capacity = state
            .vacancies
            .ledgers()
            .map(|(t, ledger)| (t.to_string(), *ledger))
            .collect();
        state.report.assignment = stats;
        Ok(events)
    }
}

//! The synthesis engine: runs the pipeline once, end to end.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Fitting       IPU weights per municipality, county by county
//!   2. Draw          exactly hhTotal households per municipality
//!   3. Relationship  CHILD / SINGLE / MARRIED per person
//!   4. Assignment    job and school destinations against live vacancies
//!   then the population and report are persisted.
//!
//! RULES:
//!   - Stages execute in registration order, once per run.
//!   - A stage reads only what earlier stages left in PipelineState.
//!   - All randomness flows through the RngBank.
//!   - Every stage outcome is recorded in the event log.

use crate::{
    config::SynthConfig,
    error::{SynthError, SynthResult},
    event::{EventLogEntry, SynthEvent},
    inputs::SynthInputs,
    population::Population,
    report::SynthReport,
    rng::RngBank,
    stage::{PipelineState, SynthStage},
    stages::{AssignmentStage, DrawStage, FittingStage, RelationshipStage},
    store::SynthStore,
    types::RunId,
    vacancy::VacancyRegistry,
};

pub struct SynthEngine {
    pub run_id: RunId,
    pub rng_bank: RngBank,
    seed: u64,
    stages: Vec<Box<dyn SynthStage>>,
    state: PipelineState,
    store: SynthStore,
    sequence: u64,
    finished: bool,
}

impl SynthEngine {
    pub fn new(run_id: RunId, seed: u64, inputs: SynthInputs, store: SynthStore) -> Self {
        Self {
            rng_bank: RngBank::new(seed),
            seed,
            stages: Vec::new(),
            state: PipelineState::new(inputs, SynthReport::new(run_id.clone(), seed)),
            store,
            sequence: 0,
            finished: false,
            run_id,
        }
    }

    /// Build a fully wired engine with all stages registered.
    /// Call this instead of new() + manual register() calls.
    pub fn build(
        run_id: RunId,
        seed: u64,
        config: &SynthConfig,
        inputs: SynthInputs,
        store: SynthStore,
    ) -> SynthResult<Self> {
        let mut engine = SynthEngine::new(run_id, seed, inputs, store);

        // EXECUTION ORDER: fixed, documented, never reordered.
        engine.register(Box::new(FittingStage::new(config)?));
        engine.register(Box::new(DrawStage::new(config)));
        engine.register(Box::new(RelationshipStage::new(config)));
        engine.register(Box::new(AssignmentStage::new(config)));
        Ok(engine)
    }

    /// In-memory engine over the built-in test region.
    pub fn build_test(run_id: &str, seed: u64) -> SynthResult<Self> {
        let store = SynthStore::in_memory()?;
        store.migrate()?;
        store.insert_run(run_id, seed, env!("CARGO_PKG_VERSION"))?;
        let config = SynthConfig::default_test();
        let inputs = SynthInputs::default_test(&config)?;
        Self::build(run_id.to_string(), seed, &config, inputs, store)
    }

    /// Register a stage. Call in the documented execution order.
    pub fn register(&mut self, stage: Box<dyn SynthStage>) {
        self.stages.push(stage);
    }

    /// Run every stage once, persist the population and return the report.
    pub fn run(&mut self) -> SynthResult<SynthReport> {
        if self.finished {
            return Err(SynthError::Other(anyhow::anyhow!(
                "run {} has already been synthesized",
                self.run_id
            )));
        }
        if self.store.run_seed(&self.run_id)?.is_none() {
            return Err(SynthError::RunNotInitialized);
        }

        self.log_event(
            "engine",
            &SynthEvent::RunInitialized {
                run_id: self.run_id.clone(),
                seed: self.seed,
            },
        )?;
        let kept = self.state.microdata.len() as u64;
        let dropped = self.state.microdata.dropped as u64;
        self.state.report.records_used = kept;
        self.state.report.records_dropped = dropped;
        if dropped > 0 {
            self.log_event("engine", &SynthEvent::RecordsDropped { dropped, kept })?;
        }

        for stage in &mut self.stages {
            let name = stage.name();
            let mut rng = self.rng_bank.for_stage(stage.slot());
            log::info!("stage {name}: started");

            let started = SynthEvent::StageStarted { stage: name.to_string() };
            append(&self.store, &self.run_id, &mut self.sequence, "engine", &started)?;

            let events = stage.run(&mut self.state, &mut rng)?;
            for event in &events {
                append(&self.store, &self.run_id, &mut self.sequence, name, event)?;
            }

            let completed = SynthEvent::StageCompleted { stage: name.to_string() };
            append(&self.store, &self.run_id, &mut self.sequence, "engine", &completed)?;
            log::info!("stage {name}: completed ({} events)", events.len());
        }

        let population = self
            .state
            .population
            .as_ref()
            .ok_or(SynthError::StageOrder { stage: "persist" })?;
        self.store.save_population(&self.run_id, population)?;
        let persisted = SynthEvent::PopulationPersisted {
            households: population.household_count() as u64,
            persons: population.person_count() as u64,
            dwellings: population.household_count() as u64,
        };
        self.log_event("engine", &persisted)?;

        let json = serde_json::to_string(&self.state.report)?;
        self.store.save_report(&self.run_id, &json)?;
        self.finished = true;
        log::debug!("report saved for run {}", self.run_id);
        Ok(self.state.report.clone())
    }

    /// The synthesized population, once the draw stage has run.
    pub fn population(&self) -> Option<&Population> {
        self.state.population.as_ref()
    }

    pub fn report(&self) -> &SynthReport {
        &self.state.report
    }

    /// Vacancies left after assignment.
    pub fn vacancies(&self) -> &VacancyRegistry {
        &self.state.vacancies
    }

    pub fn store(&self) -> &SynthStore {
        &self.store
    }

    /// Query the run's event log from the store.
    /// Used by the determinism test and replay tooling.
    pub fn store_events_for_run(&self, run_id: &str) -> SynthResult<Vec<EventLogEntry>> {
        self.store.events_for_run(run_id)
    }

    fn log_event(&mut self, stage: &str, event: &SynthEvent) -> SynthResult<()> {
        append(&self.store, &self.run_id, &mut self.sequence, stage, event)
    }
}

fn append(
    store: &SynthStore,
    run_id: &str,
    sequence: &mut u64,
    stage: &str,
    event: &SynthEvent,
) -> SynthResult<()> {
    let entry = EventLogEntry {
        id: None,
        run_id: run_id.to_string(),
        sequence: *sequence,
        stage: stage.to_string(),
        event_type: event.type_name().to_string(),
        payload: serde_json::to_string(event)?,
    };
    store.append_event(&entry)?;
    *sequence += 1;
    Ok(())
}

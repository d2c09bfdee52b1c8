//! End-to-end runs: stage order, persistence and the JSON loaders.

use popsynth_core::{
    config::SynthConfig,
    engine::SynthEngine,
    error::SynthError,
    event::SynthEvent,
    inputs::SynthInputs,
    population::{Destination, Role},
    report::SynthReport,
    store::SynthStore,
};
use serde_json::json;
use std::path::{Path, PathBuf};

fn run_test_engine(run_id: &str, seed: u64) -> (SynthEngine, SynthReport) {
    let mut engine = SynthEngine::build_test(run_id, seed).expect("test engine");
    let report = engine.run().expect("run");
    (engine, report)
}

#[test]
fn every_municipality_gets_its_household_target() {
    let (engine, report) = run_test_engine("targets", 7);
    let population = engine.population().expect("population");

    for (m, target) in [(10, 30), (11, 20), (20, 25)] {
        assert_eq!(population.households_in_municipality(m), target, "municipality {m}");
        assert_eq!(
            engine
                .store()
                .household_count_for_municipality("targets", m)
                .expect("count"),
            target as u64
        );
    }
    assert_eq!(report.households, 75);
    assert_eq!(engine.store().household_count("targets").expect("count"), 75);
    assert_eq!(engine.store().dwelling_count("targets").expect("count"), 75);
    for zone in [101, 102] {
        assert_eq!(
            engine.store().household_count_for_zone("targets", zone).expect("count"),
            population.households_in_zone(zone) as u64
        );
    }
    assert_eq!(
        engine.store().person_count("targets").expect("count"),
        population.person_count() as u64
    );
}

#[test]
fn every_person_has_a_role_and_every_eligible_person_a_destination() {
    let (engine, report) = run_test_engine("roles", 11);
    let population = engine.population().expect("population");

    for p in population.persons() {
        assert!(p.role.is_some(), "person {} has no role", p.id);
        assert_eq!(
            p.destination.is_some(),
            p.destination_type().is_some(),
            "person {} destination mismatch",
            p.id
        );
    }

    let store = engine.store();
    let by_role: u64 = [Role::Child, Role::Single, Role::Married]
        .iter()
        .map(|r| store.role_count("roles", *r).expect("role count"))
        .sum();
    assert_eq!(by_role, population.person_count() as u64);
    assert_eq!(
        store.role_count("roles", Role::Married).expect("count"),
        population.role_count(Role::Married) as u64
    );
    assert_eq!(
        report.relationships.children + report.relationships.singles + report.relationships.married,
        report.persons
    );
}

#[test]
fn assigned_seats_are_unique_and_ledgers_reconcile() {
    let (engine, report) = run_test_engine("ledger", 3);
    let population = engine.population().expect("population");

    let seats = engine.store().assigned_destinations("ledger").expect("seats");
    let mut ids: Vec<u64> = seats.iter().map(|(_, d)| *d).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), seats.len(), "a seat was handed out twice");
    assert_eq!(seats.len() as u64, report.assignment.assigned);

    for (destination_type, ledger) in engine.vacancies().ledgers() {
        assert_eq!(
            ledger.initial,
            ledger.reserved + engine.vacancies().remaining_capacity(destination_type),
            "{destination_type}"
        );
        let taken = population
            .persons()
            .filter(|p| {
                p.destination_type().as_ref() == Some(destination_type)
                    && matches!(p.destination, Some(Destination::Assigned { .. }))
            })
            .count() as u64;
        assert_eq!(taken, ledger.reserved, "{destination_type}");
    }

    // No university seats exist in the test region.
    let outside = report.assignment.per_type["school:university"];
    assert_eq!(outside.assigned, 0);
    assert!(outside.outside_study_area > 0);
    assert!(engine.store().outside_destination_count("ledger").expect("count") >= outside.outside_study_area);
}

#[test]
fn event_log_records_the_stage_order() {
    let (engine, report) = run_test_engine("events", 5);
    let entries = engine.store_events_for_run("events").expect("events");

    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..entries.len() as u64).collect::<Vec<_>>());

    assert_eq!(entries.first().map(|e| e.event_type.as_str()), Some("run_initialized"));
    assert_eq!(entries.last().map(|e| e.event_type.as_str()), Some("population_persisted"));

    let started: Vec<String> = entries
        .iter()
        .filter(|e| e.event_type == "stage_started")
        .map(|e| match serde_json::from_str::<SynthEvent>(&e.payload).expect("payload") {
            SynthEvent::StageStarted { stage } => stage,
            other => panic!("unexpected payload {other:?}"),
        })
        .collect();
    assert_eq!(started, vec!["fitting", "draw", "relationship", "assignment"]);

    let store = engine.store();
    assert_eq!(store.event_count("events", "records_dropped").expect("count"), 1);
    assert_eq!(store.event_count("events", "county_fitted").expect("count"), 2);
    assert_eq!(store.event_count("events", "municipality_drawn").expect("count"), 3);
    assert_eq!(store.event_count("events", "households_classified").expect("count"), 1);
    assert_eq!(report.records_dropped, 1);
    assert_eq!(report.records_used, 8);
}

#[test]
fn report_is_persisted_and_reloadable() {
    let (engine, report) = run_test_engine("report", 21);
    let json = engine
        .store()
        .load_report("report")
        .expect("load")
        .expect("report saved");
    let reloaded: SynthReport = serde_json::from_str(&json).expect("parse report");
    assert_eq!(reloaded.run_id, "report");
    assert_eq!(reloaded.households, report.households);
    assert_eq!(reloaded.fit.len(), report.fit.len());
    assert_eq!(reloaded.capacity, report.capacity);
    assert!(report.worst_fit_error().is_some());
}

#[test]
fn a_run_cannot_be_synthesized_twice() {
    let (mut engine, _) = run_test_engine("twice", 1);
    assert!(matches!(engine.run(), Err(SynthError::Other(_))));
}

#[test]
fn run_must_be_registered_before_it_starts() {
    let store = SynthStore::in_memory().expect("store");
    store.migrate().expect("migrate");
    assert_eq!(store.path(), None);
    let config = SynthConfig::default_test();
    let inputs = SynthInputs::default_test(&config).expect("inputs");
    let mut engine =
        SynthEngine::build("unregistered".into(), 1, &config, inputs, store).expect("engine");
    assert!(matches!(engine.run(), Err(SynthError::RunNotInitialized)));
}

// ── Loaders ────────────────────────────────────────────────────────

fn data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("popsynth-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    for sub in ["config", "microdata", "controls", "geography", "trips", "destinations"] {
        std::fs::create_dir_all(dir.join(sub)).expect("create data dir");
    }
    dir
}

fn write(dir: &Path, relative: &str, value: serde_json::Value) {
    std::fs::write(dir.join(relative), value.to_string()).expect("write fixture");
}

fn write_fixture(dir: &Path) {
    write(dir, "config/attributes.json", json!({ "household": ["hhSize"], "person": ["gender"] }));
    write(
        dir,
        "microdata/households.json",
        json!({ "households": [
            {
                "id": 1, "size": 2,
                "attributes": { "hhSize": "2" },
                "persons": [
                    { "age": 40, "gender": "male", "occupation": "employed", "job_sector": "retail",
                      "relationship": "head", "income": 30000, "attributes": { "gender": "male" } },
                    { "age": 38, "gender": "female", "occupation": "inactive",
                      "relationship": "spouse", "attributes": { "gender": "female" } }
                ],
                "dwelling": { "kind": "house", "bedrooms": 3, "year_built": 1990, "quality": 2, "monthly_cost": 900 }
            },
            {
                "id": 2, "size": 1,
                "attributes": { "hhSize": "1" },
                "persons": [
                    { "age": 67, "gender": "female", "occupation": "inactive",
                      "relationship": "head", "attributes": { "gender": "female" } }
                ],
                "dwelling": { "kind": "apartment", "bedrooms": 1, "year_built": 1972, "quality": 1, "monthly_cost": 500 }
            }
        ]}),
    );
    write(
        dir,
        "controls/municipality.json",
        json!({ "controls": [
            { "geography": 1, "attribute": "population", "count": 12.0 },
            { "geography": 1, "attribute": "hhSize=1", "count": 4.0 }
        ]}),
    );
    write(dir, "controls/county.json", json!({ "controls": [] }));
    write(
        dir,
        "controls/households.json",
        json!({ "targets": [ { "municipality": 1, "households": 8 } ] }),
    );
    write(
        dir,
        "geography/zones.json",
        json!({ "zones": [
            { "zone": 101, "municipality": 1, "county": 1, "population_share": 2.0 },
            { "zone": 102, "municipality": 1, "county": 1, "population_share": 1.0 }
        ]}),
    );
    write(
        dir,
        "geography/distances.json",
        json!({ "distances": [
            { "origin": 101, "destination": 101, "distance_km": 0.5 },
            { "origin": 101, "destination": 102, "distance_km": 3.0 },
            { "origin": 102, "destination": 101, "distance_km": 3.0 },
            { "origin": 102, "destination": 102, "distance_km": 0.5 }
        ]}),
    );
    write(
        dir,
        "trips/trip_length.json",
        json!({ "buckets": [
            { "distance_km": 0, "frequency": 10.0 },
            { "distance_km": 3, "frequency": 4.0 }
        ]}),
    );
    write(
        dir,
        "destinations/vacancies.json",
        json!({ "vacancies": [
            { "destination_type": { "kind": "job", "class": "retail" }, "zone": 102, "destinations": [7001, 7002, 7003] }
        ]}),
    );
}

#[test]
fn data_directory_loads_and_runs() {
    let dir = data_dir("load");
    write_fixture(&dir);
    let path = dir.to_str().expect("utf-8 path");

    let config = SynthConfig::load(path).expect("config");
    assert_eq!(config.schema.household, vec!["hhSize"]);
    assert_eq!(config.ipu.max_iterations, 500, "missing synthesis.json means defaults");

    let inputs = SynthInputs::load(path, &config).expect("inputs");
    assert_eq!(inputs.microdata.len(), 2);
    assert_eq!(inputs.geography.zone_count(), 2);
    assert_eq!(inputs.impedance.weight(101, 102).expect("weight"), 4.0);

    let store = SynthStore::in_memory().expect("store");
    store.migrate().expect("migrate");
    store.insert_run("loaded", 3, "test").expect("insert run");
    let mut engine = SynthEngine::build("loaded".into(), 3, &config, inputs, store).expect("engine");
    let report = engine.run().expect("run");

    assert_eq!(report.households, 8);
    assert_eq!(report.capacity["job:retail"].initial, 3);
    assert!(report.capacity["job:retail"].reserved <= 3);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn tuning_file_overrides_defaults() {
    let dir = data_dir("tuning");
    write_fixture(&dir);
    write(
        &dir,
        "config/synthesis.json",
        json!({ "ipu": { "max_iterations": 25 }, "relationship": { "child_age_threshold": 18 } }),
    );
    let config = SynthConfig::load(dir.to_str().expect("utf-8 path")).expect("config");
    assert_eq!(config.ipu.max_iterations, 25);
    assert_eq!(config.ipu.max_error, 1e-5);
    assert_eq!(config.relationship.child_age_threshold, 18);
    assert_eq!(config.draw.depletion_step, 1.0);
    let _ = std::fs::remove_dir_all(&dir);
}

fn single_household(household_attributes: serde_json::Value) -> serde_json::Value {
    json!({ "households": [
        {
            "id": 41, "size": 1,
            "attributes": household_attributes,
            "persons": [
                { "age": 52, "gender": "male", "occupation": "employed", "job_sector": "retail",
                  "relationship": "head", "attributes": { "gender": "male" } }
            ],
            "dwelling": { "kind": "house", "bedrooms": 2, "year_built": 1985, "quality": 2, "monthly_cost": 800 }
        }
    ]})
}

fn load_error(dir: &Path) -> anyhow::Error {
    let path = dir.to_str().expect("utf-8 path");
    let config = SynthConfig::load(path).expect("config");
    SynthInputs::load(path, &config).err().expect("load must fail")
}

#[test]
fn household_missing_a_schema_attribute_fails_the_load() {
    let dir = data_dir("missing-attribute");
    write_fixture(&dir);
    write(&dir, "microdata/households.json", single_household(json!({ "tenure": "own" })));

    let err = load_error(&dir);
    match err.downcast_ref::<SynthError>() {
        Some(SynthError::InvalidRecord { record_id, attribute }) => {
            assert_eq!(*record_id, 41);
            assert_eq!(attribute, "hhSize");
        }
        other => panic!("expected InvalidRecord, got {other:?}"),
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn blank_attribute_value_fails_the_load() {
    let dir = data_dir("blank-attribute");
    write_fixture(&dir);
    write(&dir, "microdata/households.json", single_household(json!({ "hhSize": "  " })));

    let err = load_error(&dir);
    assert!(
        matches!(
            err.downcast_ref::<SynthError>(),
            Some(SynthError::InvalidRecord { record_id: 41, attribute }) if attribute == "hhSize"
        ),
        "{err}"
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn vacancy_outside_the_geography_fails_the_load() {
    let dir = data_dir("vacancy-zone");
    write_fixture(&dir);
    write(
        &dir,
        "destinations/vacancies.json",
        json!({ "vacancies": [
            { "destination_type": { "kind": "job", "class": "retail" }, "zone": 102, "destinations": [7001] },
            { "destination_type": { "kind": "school", "class": "primary" }, "zone": 999, "destinations": [8001] }
        ]}),
    );

    let err = load_error(&dir);
    assert!(
        matches!(err.downcast_ref::<SynthError>(), Some(SynthError::UnknownZone { zone: 999 })),
        "{err}"
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_inputs_name_the_file() {
    let dir = data_dir("missing");
    write(&dir, "config/attributes.json", json!({ "household": [], "person": [] }));
    let path = dir.to_str().expect("utf-8 path");
    let config = SynthConfig::load(path).expect("config");
    let err = SynthInputs::load(path, &config).err().expect("load must fail");
    assert!(err.to_string().contains("microdata/households.json"), "{err}");
    let _ = std::fs::remove_dir_all(&dir);
}

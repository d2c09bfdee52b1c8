//! synth-runner: headless population synthesis runner.
//!
//! Usage:
//!   synth-runner --seed 12345 --data-dir ./data --db run.db
//!   synth-runner --seed 12345 --data-dir ./data --json

use anyhow::Result;
use popsynth_core::{
    config::SynthConfig, engine::SynthEngine, inputs::SynthInputs, population::Role,
    report::SynthReport, store::SynthStore,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let json = args.iter().any(|a| a == "--json");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    if !json {
        println!("popsynth: synth-runner");
        println!("  seed:      {seed}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = SynthConfig::load(data_dir)?;
    let inputs = SynthInputs::load(data_dir, &config)?;

    let store = SynthStore::open(db)?;
    store.migrate()?;
    log::info!("store ready at {}", store.path().unwrap_or(":memory:"));

    let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4());
    store.insert_run(&run_id, seed, env!("CARGO_PKG_VERSION"))?;
    log::info!("run {run_id} initialized");

    let mut engine = SynthEngine::build(run_id.clone(), seed, &config, inputs, store)?;
    let report = engine.run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&engine, &report)?;
    }
    Ok(())
}

fn print_summary(engine: &SynthEngine, report: &SynthReport) -> Result<()> {
    let store = engine.store();
    let run_id = &report.run_id;
    let events = engine.store_events_for_run(run_id)?.len();

    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {run_id}");
    println!("  records used:   {}", report.records_used);
    println!("  records dropped:{:>4}", report.records_dropped);
    println!("  households:     {}", store.household_count(run_id)?);
    println!("  persons:        {}", store.person_count(run_id)?);
    println!("  events logged:  {events}");
    println!();

    println!("=== FIT ===");
    for f in &report.fit {
        println!(
            "  county {:>6}: {:>4} iterations (best {:>4}), error {:.6}, {:?}",
            f.county, f.iterations, f.best_iteration, f.error, f.stop_reason
        );
    }
    if report.counties_at_iteration_cap() > 0 {
        println!(
            "  {} counties stopped at the iteration cap",
            report.counties_at_iteration_cap()
        );
    }
    println!("  pool refills:   {}", report.total_refills());
    println!();

    println!("=== HOUSEHOLD ROLES ===");
    println!("  children:       {}", store.role_count(run_id, Role::Child)?);
    println!("  single:         {}", store.role_count(run_id, Role::Single)?);
    println!("  married:        {}", store.role_count(run_id, Role::Married)?);
    println!();

    println!("=== DESTINATIONS ===");
    println!("  eligible:       {}", report.assignment.eligible);
    println!("  assigned:       {}", report.assignment.assigned);
    println!("  outside area:   {}", store.outside_destination_count(run_id)?);
    for (destination_type, ledger) in &report.capacity {
        println!(
            "  {destination_type:<20} {:>6} of {:>6} seats taken",
            ledger.reserved, ledger.initial
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

//! popsynth-core: synthetic population generation.
//!
//! Microdata households are reweighted against control totals (IPU),
//! drawn into municipalities, given household roles and sent to jobs
//! and schools. See engine.rs for the stage order.

pub mod assignment;
pub mod config;
pub mod controls;
pub mod draw;
pub mod engine;
pub mod error;
pub mod event;
pub mod frequency;
pub mod geography;
pub mod impedance;
pub mod inputs;
pub mod ipu;
pub mod microdata;
pub mod population;
pub mod relationship;
pub mod report;
pub mod rng;
pub mod stage;
pub mod stages;
pub mod store;
pub mod types;
pub mod vacancy;

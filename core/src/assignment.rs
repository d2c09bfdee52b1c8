//! Places workers and students into destination zones.
//!
//! The eligible population is shuffled once, then walked strictly in that
//! order: every reservation changes the vacancy counts the next person's
//! draw is weighted by, so this pass must stay sequential.
//!
//! Candidate zone weight = impedance(origin, zone) × seats left in zone.
//! When every candidate weighs zero the draw falls back to seats left
//! alone. Types listed in `nearest_destination_types` skip the draw and
//! take the lowest-cost zone with a seat.

use crate::{
    config::AssignmentConfig,
    error::{SynthError, SynthResult},
    impedance::ImpedanceMatrix,
    population::{Destination, DestinationType, Population},
    rng::RandomSource,
    types::ZoneId,
    vacancy::VacancyRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAssignment {
    pub assigned: u64,
    pub outside_study_area: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStats {
    pub eligible: u64,
    pub assigned: u64,
    pub outside_study_area: u64,
    /// Keyed by the type's display form, e.g. `job:retail`.
    pub per_type: BTreeMap<String, TypeAssignment>,
}

impl AssignmentStats {
    fn record(&mut self, destination_type: &DestinationType, destination: &Destination) {
        let entry = self.per_type.entry(destination_type.to_string()).or_default();
        match destination {
            Destination::Assigned { .. } => {
                self.assigned += 1;
                entry.assigned += 1;
            }
            Destination::OutsideStudyArea => {
                self.outside_study_area += 1;
                entry.outside_study_area += 1;
            }
        }
    }
}

pub struct AssignmentEngine {
    config: AssignmentConfig,
}

impl AssignmentEngine {
    pub fn new(config: AssignmentConfig) -> Self {
        Self { config }
    }

    pub fn assign<R: RandomSource>(
        &self,
        population: &mut Population,
        registry: &mut VacancyRegistry,
        impedance: &ImpedanceMatrix,
        rng: &mut R,
    ) -> SynthResult<AssignmentStats> {
        let mut eligible: Vec<(usize, usize)> = population
            .households
            .iter()
            .enumerate()
            .flat_map(|(h, household)| {
                household
                    .persons
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.destination_type().is_some())
                    .map(move |(p, _)| (h, p))
            })
            .collect();
        rng.shuffle(&mut eligible);

        let mut stats = AssignmentStats {
            eligible: eligible.len() as u64,
            ..Default::default()
        };
        for (h, p) in eligible {
            let origin = population.households[h].zone;
            let person = &mut population.households[h].persons[p];
            let Some(destination_type) = person.destination_type() else {
                continue;
            };
            let destination = self.assign_one(origin, &destination_type, registry, impedance, rng)?;
            stats.record(&destination_type, &destination);
            person.destination = Some(destination);
        }

        if stats.outside_study_area > 0 {
            log::warn!(
                "assignment: {} of {} persons found no capacity and were placed outside the study area",
                stats.outside_study_area,
                stats.eligible
            );
        }
        Ok(stats)
    }

    /// Place one person travelling from `origin`.
    pub fn assign_one<R: RandomSource>(
        &self,
        origin: ZoneId,
        destination_type: &DestinationType,
        registry: &mut VacancyRegistry,
        impedance: &ImpedanceMatrix,
        rng: &mut R,
    ) -> SynthResult<Destination> {
        let zone = {
            let candidates = registry.zones_with_vacancies(destination_type);
            if candidates.is_empty() {
                return Ok(Destination::OutsideStudyArea);
            }
            if self.config.nearest_destination_types.contains(destination_type) {
                nearest_zone(origin, candidates, impedance)?
            } else {
                weighted_zone(origin, destination_type, candidates, registry, impedance, rng)?
            }
        };

        let destination = registry.reserve_one(destination_type, zone).ok_or_else(|| {
            SynthError::Other(anyhow::anyhow!(
                "zone {zone} listed with {destination_type} vacancies but has none"
            ))
        })?;
        Ok(Destination::Assigned { zone, destination })
    }
}

/// Lowest travel cost wins; ties go to the earlier candidate.
fn nearest_zone(
    origin: ZoneId,
    candidates: &[ZoneId],
    impedance: &ImpedanceMatrix,
) -> SynthResult<ZoneId> {
    let mut best = candidates[0];
    let mut best_cost = impedance.cost(origin, best)?;
    for &zone in &candidates[1..] {
        let cost = impedance.cost(origin, zone)?;
        if cost < best_cost {
            best = zone;
            best_cost = cost;
        }
    }
    Ok(best)
}

fn weighted_zone<R: RandomSource>(
    origin: ZoneId,
    destination_type: &DestinationType,
    candidates: &[ZoneId],
    registry: &VacancyRegistry,
    impedance: &ImpedanceMatrix,
    rng: &mut R,
) -> SynthResult<ZoneId> {
    let seats: Vec<f64> = candidates
        .iter()
        .map(|&z| registry.remaining(destination_type, z) as f64)
        .collect();
    let mut weights = candidates
        .iter()
        .zip(&seats)
        .map(|(&z, &s)| -> SynthResult<f64> { Ok(impedance.weight(origin, z)? * s) })
        .collect::<SynthResult<Vec<f64>>>()?;
    let mut total: f64 = weights.iter().sum();
    if total <= 0.0 {
        weights = seats;
        total = weights.iter().sum();
    }

    let point = rng.next_f64() * total;
    let mut cumulative = 0.0;
    for (&zone, &w) in candidates.iter().zip(&weights) {
        cumulative += w;
        if w > 0.0 && cumulative > point {
            return Ok(zone);
        }
    }
    Ok(candidates
        .iter()
        .zip(&weights)
        .rev()
        .find(|(_, w)| **w > 0.0)
        .map_or(candidates[candidates.len() - 1], |(z, _)| *z))
}

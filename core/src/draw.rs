//! Monte-Carlo household draw over fitted weights.
//!
//! Draw policy (residual-weight depletion): each municipality starts a pool
//! holding its fitted weights. A draw picks a record with probability
//! proportional to its *residual* weight. A record whose residual exceeds
//! one depletion step loses exactly one step; otherwise it loses all of
//! its remaining weight and cannot be drawn again. The pool therefore
//! drifts from replacement sampling toward exhaustion as the fitted mass
//! is used up. This is the inherited policy, not an approximation of
//! either classical scheme.
//!
//! If the pool empties before the municipality's household target is met
//! it is refilled from the fitted weights and depletion starts over.

use crate::{
    config::DrawConfig,
    controls::ControlTotals,
    error::{SynthError, SynthResult},
    geography::Geography,
    ipu::WeightTable,
    microdata::MicrodataRecord,
    population::{IdAllocator, Population, SyntheticHousehold},
    rng::RandomSource,
    types::{MunicipalityId, ZoneId},
};
use serde::{Deserialize, Serialize};

/// Remaining draw mass per record for one municipality.
#[derive(Debug, Clone)]
pub struct ResidualPool {
    weights: Vec<f64>,
    total: f64,
}

impl ResidualPool {
    pub fn new(weights: &[f64]) -> Self {
        let weights: Vec<f64> = weights.iter().map(|w| w.max(0.0)).collect();
        let total = weights.iter().sum();
        Self { weights, total }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn residual(&self, record: usize) -> f64 {
        self.weights[record]
    }

    /// Cumulative-weight draw followed by depletion of the chosen record.
    /// `None` once every residual weight is gone.
    pub fn draw<R: RandomSource>(&mut self, rng: &mut R, step: f64) -> Option<usize> {
        if self.total <= 0.0 {
            return None;
        }
        let point = rng.next_f64() * self.total;
        let mut cumulative = 0.0;
        let mut selected = None;
        let mut last_positive = None;
        for (i, &w) in self.weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            last_positive = Some(i);
            cumulative += w;
            if cumulative > point {
                selected = Some(i);
                break;
            }
        }
        // Rounding can leave the point just past the final cumulative sum.
        let chosen = selected.or(last_positive)?;
        self.deplete(chosen, step);
        Some(chosen)
    }

    fn deplete(&mut self, record: usize, step: f64) {
        let w = self.weights[record];
        if w > step {
            self.weights[record] = w - step;
            self.total -= step;
        } else {
            self.weights[record] = 0.0;
            self.total -= w;
        }
        if self.total < 0.0 {
            self.total = 0.0;
        }
    }
}

/// Cumulative draw over a municipality's zone population shares.
pub fn pick_zone<R: RandomSource>(zones: &[(ZoneId, f64)], rng: &mut R) -> Option<ZoneId> {
    let total: f64 = zones.iter().map(|(_, share)| share).sum();
    if zones.is_empty() {
        return None;
    }
    if total <= 0.0 {
        let i = rng.next_u64_below(zones.len() as u64) as usize;
        return Some(zones[i].0);
    }
    let point = rng.next_f64() * total;
    let mut cumulative = 0.0;
    for &(zone, share) in zones {
        cumulative += share;
        if cumulative > point {
            return Some(zone);
        }
    }
    zones.iter().rev().find(|(_, s)| *s > 0.0).map(|(z, _)| *z)
}

/// Per-municipality outcome of the draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityDraw {
    pub municipality: MunicipalityId,
    pub households: u32,
    pub persons: u64,
    /// Times the residual pool had to be refilled.
    pub refills: u32,
    /// Residual weight left in the pool after the last draw.
    pub residual_weight: f64,
}

#[derive(Debug, Clone)]
pub struct DrawOutcome {
    pub population: Population,
    pub municipalities: Vec<MunicipalityDraw>,
}

pub struct DrawEngine {
    config: DrawConfig,
}

impl DrawEngine {
    pub fn new(config: DrawConfig) -> Self {
        Self { config }
    }

    /// Draw exactly `hhTotal` households for every municipality.
    pub fn draw<R: RandomSource>(
        &self,
        records: &[MicrodataRecord],
        weights: &WeightTable,
        controls: &ControlTotals,
        geography: &Geography,
        rng: &mut R,
    ) -> SynthResult<DrawOutcome> {
        if let Some(municipality) = controls
            .targeted_municipalities()
            .find(|&m| controls.households(m) > 0 && geography.county_of(m).is_none())
        {
            return Err(SynthError::UnknownMunicipality { municipality });
        }

        let mut ids = IdAllocator::new();
        let mut population = Population::new();
        let mut municipalities = Vec::new();

        for municipality in geography.municipalities() {
            let target = controls.households(municipality);
            if target == 0 {
                continue;
            }
            let summary = self.draw_municipality(
                municipality,
                target,
                records,
                weights,
                geography,
                &mut ids,
                &mut population,
                rng,
            )?;
            municipalities.push(summary);
        }

        Ok(DrawOutcome {
            population,
            municipalities,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_municipality<R: RandomSource>(
        &self,
        municipality: MunicipalityId,
        target: u32,
        records: &[MicrodataRecord],
        weights: &WeightTable,
        geography: &Geography,
        ids: &mut IdAllocator,
        population: &mut Population,
        rng: &mut R,
    ) -> SynthResult<MunicipalityDraw> {
        let zones = geography.zones_in(municipality);
        if zones.is_empty() {
            return Err(SynthError::NoZones { municipality });
        }
        let fitted = weights
            .get(municipality)
            .ok_or(SynthError::EmptyWeightPool { municipality })?;
        let mut pool = ResidualPool::new(fitted);
        if pool.total() <= 0.0 || records.is_empty() {
            return Err(SynthError::EmptyWeightPool { municipality });
        }

        let step = self.config.depletion_step;
        let mut refills = 0u32;
        let mut persons = 0u64;
        for _ in 0..target {
            let record = match pool.draw(rng, step) {
                Some(i) => i,
                None => {
                    refills += 1;
                    pool = ResidualPool::new(fitted);
                    pool.draw(rng, step)
                        .ok_or(SynthError::EmptyWeightPool { municipality })?
                }
            };
            let zone = pick_zone(zones, rng).ok_or(SynthError::NoZones { municipality })?;
            let household =
                SyntheticHousehold::from_record(&records[record], zone, municipality, ids);
            persons += household.size() as u64;
            population.households.push(household);
        }

        if refills > 0 {
            log::warn!(
                "municipality={municipality}: residual pool refilled {refills} times for {target} households"
            );
        }
        log::debug!(
            "municipality={municipality}: drew {target} households, residual weight {:.3}",
            pool.total()
        );

        Ok(MunicipalityDraw {
            municipality,
            households: target,
            persons,
            refills,
            residual_weight: pool.total(),
        })
    }
}

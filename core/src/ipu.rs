//! Iterative Proportional Updating over a municipality/county hierarchy.
//!
//! Counties are fitted independently. Inside a county every municipality
//! owns a disjoint weight vector (one weight per microdata record), so the
//! municipality pass and the municipality half of the error pass fan out
//! over the rayon pool with no locking. The county pass reads and rescales
//! across all partitions and therefore runs after the join.
//!
//! RULE: the engine returns the best snapshot it ever saw, not the last one.

use crate::{
    config::IpuConfig,
    controls::ControlTotals,
    error::{SynthError, SynthResult},
    frequency::FrequencyMatrix,
    geography::Geography,
    microdata::{AttributeCode, MicrodataRecord},
    types::{CountyId, MunicipalityId},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fitted weight per (record, municipality). Frozen once produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    weights: BTreeMap<MunicipalityId, Vec<f64>>,
}

impl WeightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, municipality: MunicipalityId, weights: Vec<f64>) {
        self.weights.insert(municipality, weights);
    }

    /// Weights of `municipality`, indexed like the microdata records.
    pub fn get(&self, municipality: MunicipalityId) -> Option<&[f64]> {
        self.weights.get(&municipality).map(Vec::as_slice)
    }

    pub fn municipalities(&self) -> impl Iterator<Item = MunicipalityId> + '_ {
        self.weights.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MunicipalityId, &[f64])> {
        self.weights.iter().map(|(m, w)| (*m, w.as_slice()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Error fell below `max_error`.
    Converged,
    /// Relative improvement between checkpoints fell below `improvement_error`.
    Stalled,
    /// `max_iterations` reached first.
    IterationCap,
}

/// Outcome of fitting one county.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub county: CountyId,
    pub municipalities: usize,
    pub iterations: u32,
    /// Iteration that produced the returned snapshot.
    pub best_iteration: u32,
    /// Averaged relative error of the returned snapshot.
    pub error: f64,
    pub stop_reason: StopReason,
    /// Averaged error after every iteration, in order.
    pub error_history: Vec<f64>,
}

impl FitReport {
    pub fn converged(&self) -> bool {
        self.stop_reason == StopReason::Converged
    }
}

#[derive(Debug, Clone)]
pub struct WeightFit {
    pub weights: WeightTable,
    pub reports: Vec<FitReport>,
}

/// One municipality's exclusively-owned slice of the problem.
#[derive(Debug, Clone)]
struct Partition {
    municipality: MunicipalityId,
    /// Raw targets aligned with the municipality attribute columns.
    targets: Vec<f64>,
    weights: Vec<f64>,
}

/// Elitist (weights, error) pair.
#[derive(Debug, Clone)]
struct BestFit {
    weights: Vec<(MunicipalityId, Vec<f64>)>,
    error: f64,
    iteration: u32,
}

impl BestFit {
    fn initial(partitions: &[Partition]) -> Self {
        Self {
            weights: snapshot(partitions),
            error: f64::INFINITY,
            iteration: 0,
        }
    }

    /// Replace the snapshot when `error` beats the best so far.
    fn offer(&mut self, partitions: &[Partition], error: f64, iteration: u32) -> bool {
        if error < self.error {
            self.weights = snapshot(partitions);
            self.error = error;
            self.iteration = iteration;
            true
        } else {
            false
        }
    }
}

fn snapshot(partitions: &[Partition]) -> Vec<(MunicipalityId, Vec<f64>)> {
    partitions
        .iter()
        .map(|p| (p.municipality, p.weights.clone()))
        .collect()
}

pub struct IpuEngine {
    config: IpuConfig,
    pool: rayon::ThreadPool,
}

impl IpuEngine {
    pub fn new(config: IpuConfig) -> SynthResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("ipu-worker-{i}"))
            .build()
            .map_err(|e| SynthError::Other(anyhow::anyhow!("cannot build IPU worker pool: {e}")))?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &IpuConfig {
        &self.config
    }

    /// Fit every county of `geography` against `controls`.
    pub fn fit(
        &self,
        records: &[MicrodataRecord],
        controls: &ControlTotals,
        geography: &Geography,
    ) -> SynthResult<WeightFit> {
        let municipality_codes = controls.municipality_attributes();
        let county_codes = controls.county_attributes();
        let columns: Vec<AttributeCode> = municipality_codes
            .iter()
            .chain(county_codes.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let matrix = FrequencyMatrix::build(records, columns, self.config.frequency_epsilon);

        let mut weights = WeightTable::new();
        let mut reports = Vec::new();
        for county in geography.counties() {
            let municipalities = geography.municipalities_in(county);
            let (best, report) = self.fit_county(
                county,
                &municipalities,
                &matrix,
                controls,
                &municipality_codes,
                &county_codes,
            );
            for (municipality, w) in best.weights {
                weights.insert(municipality, w);
            }
            reports.push(report);
        }
        Ok(WeightFit { weights, reports })
    }

    fn fit_county(
        &self,
        county: CountyId,
        municipalities: &[MunicipalityId],
        matrix: &FrequencyMatrix,
        controls: &ControlTotals,
        municipality_codes: &[AttributeCode],
        county_codes: &[AttributeCode],
    ) -> (BestFit, FitReport) {
        let cfg = &self.config;
        let muni_columns = column_indices(matrix, municipality_codes);
        let county_columns = column_indices(matrix, county_codes);
        let county_targets: Vec<f64> = county_codes
            .iter()
            .map(|code| controls.county_target(county, code))
            .collect();

        let mut partitions: Vec<Partition> = municipalities
            .iter()
            .map(|&m| Partition {
                municipality: m,
                targets: municipality_codes
                    .iter()
                    .map(|code| controls.municipality_target(m, code))
                    .collect(),
                weights: vec![1.0; matrix.record_count()],
            })
            .collect();

        let mut best = BestFit::initial(&partitions);
        let mut history = Vec::new();
        let mut checkpoint_error = f64::INFINITY;
        let mut stop_reason = StopReason::IterationCap;
        let mut iterations = 0;

        for iteration in 1..=cfg.max_iterations.max(1) {
            iterations = iteration;

            // Municipality pass: disjoint partitions, joined before the county pass.
            self.pool.install(|| {
                partitions.par_iter_mut().for_each(|p| {
                    for (k, &attr) in muni_columns.iter().enumerate() {
                        let ws = matrix.weighted_sum(attr, &p.weights);
                        if ws > cfg.min_weighted_sum {
                            let factor = effective_target(p.targets[k], cfg) / ws;
                            for &i in matrix.exhibitors(attr) {
                                p.weights[i] *= factor;
                            }
                        }
                    }
                });
            });

            // County pass: aggregates across every municipality of the county.
            for (k, &attr) in county_columns.iter().enumerate() {
                let ws: f64 = partitions
                    .iter()
                    .map(|p| matrix.weighted_sum(attr, &p.weights))
                    .sum();
                if ws > cfg.min_weighted_sum {
                    let factor = effective_target(county_targets[k], cfg) / ws;
                    for p in &mut partitions {
                        for &i in matrix.exhibitors(attr) {
                            p.weights[i] *= factor;
                        }
                    }
                }
            }
            debug_assert!(partitions
                .iter()
                .all(|p| p.weights.iter().all(|w| *w >= 0.0)));

            let error = self.average_error(
                &partitions,
                matrix,
                &muni_columns,
                &county_columns,
                &county_targets,
            );
            history.push(error);
            best.offer(&partitions, error, iteration);
            log::debug!("county={county} iteration={iteration} error={error:.3e}");

            if error < cfg.max_error {
                stop_reason = StopReason::Converged;
                break;
            }
            if cfg.improvement_check_interval > 0
                && iteration % cfg.improvement_check_interval == 0
            {
                let improvement = if checkpoint_error.is_finite() && checkpoint_error > 0.0 {
                    (checkpoint_error - error) / checkpoint_error
                } else {
                    f64::INFINITY
                };
                if improvement < cfg.improvement_error || error == 0.0 {
                    stop_reason = StopReason::Stalled;
                    break;
                }
                checkpoint_error = error;
            }
        }

        let report = FitReport {
            county,
            municipalities: municipalities.len(),
            iterations,
            best_iteration: best.iteration,
            error: best.error,
            stop_reason,
            error_history: history,
        };
        match stop_reason {
            StopReason::IterationCap => log::warn!(
                "county={county}: no convergence after {iterations} iterations, best error {:.3e} at iteration {}",
                best.error,
                best.iteration
            ),
            _ => log::info!(
                "county={county}: {stop_reason:?} after {iterations} iterations, error {:.3e}",
                best.error
            ),
        }
        (best, report)
    }

    /// Mean of |weightedSum − target| / target over every attribute with a
    /// non-zero target, at both levels.
    fn average_error(
        &self,
        partitions: &[Partition],
        matrix: &FrequencyMatrix,
        muni_columns: &[usize],
        county_columns: &[usize],
        county_targets: &[f64],
    ) -> f64 {
        // Collected in partition order so the reduction is seed-stable.
        let per_municipality: Vec<(f64, usize)> = self.pool.install(|| {
            partitions
                .par_iter()
                .map(|p| {
                    let mut sum = 0.0;
                    let mut n = 0usize;
                    for (k, &attr) in muni_columns.iter().enumerate() {
                        let target = p.targets[k];
                        if target > 0.0 {
                            let ws = matrix.weighted_sum(attr, &p.weights);
                            sum += (ws - target).abs() / target;
                            n += 1;
                        }
                    }
                    (sum, n)
                })
                .collect()
        });

        let (mut total, mut count) = per_municipality
            .into_iter()
            .fold((0.0, 0usize), |(s, n), (ps, pn)| (s + ps, n + pn));

        for (k, &attr) in county_columns.iter().enumerate() {
            let target = county_targets[k];
            if target > 0.0 {
                let ws: f64 = partitions
                    .iter()
                    .map(|p| matrix.weighted_sum(attr, &p.weights))
                    .sum();
                total += (ws - target).abs() / target;
                count += 1;
            }
        }

        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }
}

fn effective_target(target: f64, cfg: &IpuConfig) -> f64 {
    if target > 0.0 {
        target
    } else {
        cfg.total_epsilon
    }
}

fn column_indices(matrix: &FrequencyMatrix, codes: &[AttributeCode]) -> Vec<usize> {
    codes
        .iter()
        .filter_map(|code| matrix.index_of(code))
        .collect()
}

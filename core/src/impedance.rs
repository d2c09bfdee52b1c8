//! Zone-pair travel cost and the sampling weight derived from it.
//!
//! The weight of a pair is the trip-length frequency of its distance
//! bucket (whole kilometres, rounded down), taken verbatim. Pairs with no
//! distance on record have infinite cost and zero weight.

use crate::{
    error::{SynthError, SynthResult},
    types::ZoneId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub origin: ZoneId,
    pub destination: ZoneId,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripLengthRecord {
    pub distance_km: u32,
    pub frequency: f64,
}

/// Empirical trip-length frequency by whole-kilometre bucket.
#[derive(Debug, Clone, Default)]
pub struct TripLengthDistribution {
    buckets: BTreeMap<u32, f64>,
}

impl TripLengthDistribution {
    pub fn from_records(records: Vec<TripLengthRecord>) -> Self {
        let buckets = records
            .into_iter()
            .map(|r| (r.distance_km, r.frequency.max(0.0)))
            .collect();
        Self { buckets }
    }

    pub fn weight(&self, distance_km: f64) -> f64 {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return 0.0;
        }
        self.buckets
            .get(&(distance_km.floor() as u32))
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct ImpedanceMatrix {
    index: HashMap<ZoneId, usize>,
    size: usize,
    costs: Vec<f64>,
    weights: Vec<f64>,
}

impl ImpedanceMatrix {
    /// Dense matrix over `zones`, built once and read-only afterwards.
    pub fn build(
        zones: impl IntoIterator<Item = ZoneId>,
        distances: Vec<DistanceRecord>,
        trip_lengths: &TripLengthDistribution,
    ) -> SynthResult<Self> {
        let index: HashMap<ZoneId, usize> = zones
            .into_iter()
            .enumerate()
            .map(|(i, z)| (z, i))
            .collect();
        let size = index.len();
        let mut costs = vec![f64::INFINITY; size * size];
        for d in distances {
            let o = *index
                .get(&d.origin)
                .ok_or(SynthError::UnknownZone { zone: d.origin })?;
            let t = *index
                .get(&d.destination)
                .ok_or(SynthError::UnknownZone { zone: d.destination })?;
            costs[o * size + t] = d.distance_km;
        }
        let weights = costs.iter().map(|&c| trip_lengths.weight(c)).collect();
        Ok(Self {
            index,
            size,
            costs,
            weights,
        })
    }

    fn cell(&self, origin: ZoneId, destination: ZoneId) -> SynthResult<usize> {
        let o = self
            .index
            .get(&origin)
            .ok_or(SynthError::UnknownZone { zone: origin })?;
        let d = self
            .index
            .get(&destination)
            .ok_or(SynthError::UnknownZone { zone: destination })?;
        Ok(o * self.size + d)
    }

    /// Travel cost (km) between two zones.
    pub fn cost(&self, origin: ZoneId, destination: ZoneId) -> SynthResult<f64> {
        Ok(self.costs[self.cell(origin, destination)?])
    }

    /// Sampling weight between two zones.
    pub fn weight(&self, origin: ZoneId, destination: ZoneId) -> SynthResult<f64> {
        Ok(self.weights[self.cell(origin, destination)?])
    }

    pub fn zone_count(&self) -> usize {
        self.size
    }
}

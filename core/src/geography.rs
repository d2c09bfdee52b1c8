//! Zone → municipality → county nesting, fixed at load time.

use crate::{
    error::{SynthError, SynthResult},
    types::{CountyId, MunicipalityId, ZoneId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the zone system as delivered by the geography source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub zone: ZoneId,
    pub municipality: MunicipalityId,
    pub county: CountyId,
    /// Relative weight used to place households inside the municipality.
    pub population_share: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Geography {
    zone_municipality: BTreeMap<ZoneId, MunicipalityId>,
    municipality_county: BTreeMap<MunicipalityId, CountyId>,
    municipality_zones: BTreeMap<MunicipalityId, Vec<(ZoneId, f64)>>,
}

impl Geography {
    pub fn from_records(records: Vec<ZoneRecord>) -> SynthResult<Self> {
        let mut geo = Self::default();
        for r in records {
            if let Some(&existing) = geo.municipality_county.get(&r.municipality) {
                if existing != r.county {
                    return Err(SynthError::Other(anyhow::anyhow!(
                        "municipality {} assigned to counties {existing} and {}",
                        r.municipality,
                        r.county
                    )));
                }
            }
            if geo.zone_municipality.insert(r.zone, r.municipality).is_some() {
                return Err(SynthError::Other(anyhow::anyhow!(
                    "zone {} listed more than once",
                    r.zone
                )));
            }
            geo.municipality_county.insert(r.municipality, r.county);
            geo.municipality_zones
                .entry(r.municipality)
                .or_default()
                .push((r.zone, r.population_share.max(0.0)));
        }
        for zones in geo.municipality_zones.values_mut() {
            zones.sort_by_key(|(zone, _)| *zone);
        }
        Ok(geo)
    }

    /// Counties in ascending id order.
    pub fn counties(&self) -> Vec<CountyId> {
        let mut counties: Vec<CountyId> = self.municipality_county.values().copied().collect();
        counties.sort_unstable();
        counties.dedup();
        counties
    }

    /// Municipalities of `county` in ascending id order.
    pub fn municipalities_in(&self, county: CountyId) -> Vec<MunicipalityId> {
        self.municipality_county
            .iter()
            .filter(|(_, c)| **c == county)
            .map(|(m, _)| *m)
            .collect()
    }

    pub fn municipalities(&self) -> impl Iterator<Item = MunicipalityId> + '_ {
        self.municipality_county.keys().copied()
    }

    pub fn county_of(&self, municipality: MunicipalityId) -> Option<CountyId> {
        self.municipality_county.get(&municipality).copied()
    }

    pub fn municipality_of(&self, zone: ZoneId) -> Option<MunicipalityId> {
        self.zone_municipality.get(&zone).copied()
    }

    /// Zones of `municipality` with their population shares, by zone id.
    pub fn zones_in(&self, municipality: MunicipalityId) -> &[(ZoneId, f64)] {
        self.municipality_zones
            .get(&municipality)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn zones(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zone_municipality.keys().copied()
    }

    pub fn zone_count(&self) -> usize {
        self.zone_municipality.len()
    }
}

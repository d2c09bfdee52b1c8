//! Zonal control totals at municipality and county level.
//!
//! A label missing for a geography unit reads as a zero target.

use crate::{
    microdata::AttributeCode,
    types::{CountyId, MunicipalityId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One (geography id, attribute) → count row from the control-total source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRecord {
    pub geography: u32,
    pub attribute: AttributeCode,
    pub count: f64,
}

/// Number of households to synthesize in one municipality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdTarget {
    pub municipality: MunicipalityId,
    pub households: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ControlTotals {
    municipality: BTreeMap<MunicipalityId, BTreeMap<AttributeCode, f64>>,
    county: BTreeMap<CountyId, BTreeMap<AttributeCode, f64>>,
    households: BTreeMap<MunicipalityId, u32>,
}

impl ControlTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(
        municipality: Vec<ControlRecord>,
        county: Vec<ControlRecord>,
        households: Vec<HouseholdTarget>,
    ) -> Self {
        let mut totals = Self::new();
        for r in municipality {
            totals.set_municipality(r.geography, r.attribute, r.count);
        }
        for r in county {
            totals.set_county(r.geography, r.attribute, r.count);
        }
        for t in households {
            totals.set_households(t.municipality, t.households);
        }
        totals
    }

    pub fn set_municipality(&mut self, municipality: MunicipalityId, code: AttributeCode, count: f64) {
        self.municipality
            .entry(municipality)
            .or_default()
            .insert(code, count.max(0.0));
    }

    pub fn set_county(&mut self, county: CountyId, code: AttributeCode, count: f64) {
        self.county.entry(county).or_default().insert(code, count.max(0.0));
    }

    pub fn set_households(&mut self, municipality: MunicipalityId, households: u32) {
        self.households.insert(municipality, households);
    }

    pub fn municipality_target(&self, municipality: MunicipalityId, code: &AttributeCode) -> f64 {
        self.municipality
            .get(&municipality)
            .and_then(|t| t.get(code))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn county_target(&self, county: CountyId, code: &AttributeCode) -> f64 {
        self.county
            .get(&county)
            .and_then(|t| t.get(code))
            .copied()
            .unwrap_or(0.0)
    }

    /// `hhTotal` for a municipality; zero when none was supplied.
    pub fn households(&self, municipality: MunicipalityId) -> u32 {
        self.households.get(&municipality).copied().unwrap_or(0)
    }

    /// Municipalities with a household target, ascending.
    pub fn targeted_municipalities(&self) -> impl Iterator<Item = MunicipalityId> + '_ {
        self.households.keys().copied()
    }

    /// Every label controlled at municipality level anywhere, sorted.
    pub fn municipality_attributes(&self) -> Vec<AttributeCode> {
        union_of_labels(self.municipality.values())
    }

    /// Every label controlled at county level anywhere, sorted.
    pub fn county_attributes(&self) -> Vec<AttributeCode> {
        union_of_labels(self.county.values())
    }
}

fn union_of_labels<'a>(
    tables: impl Iterator<Item = &'a BTreeMap<AttributeCode, f64>>,
) -> Vec<AttributeCode> {
    tables
        .flat_map(|t| t.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

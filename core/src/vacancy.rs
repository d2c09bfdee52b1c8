//! Live inventory of remaining job/school seats by (type, zone).
//!
//! RULE: single writer. The assignment engine is the only caller of
//! `reserve_one`, and it calls it in a fixed order.
//!
//! Zones with capacity left are kept in a dense list per type so the
//! engine can iterate candidates cheaply; an exhausted zone is removed by
//! swapping in the last element, and an exhausted type disappears from
//! the registry. The capacity ledger survives removal so totals can still
//! be reconciled afterwards.

use crate::{
    error::{SynthError, SynthResult},
    geography::Geography,
    population::DestinationType,
    types::{DestinationId, ZoneId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Seats of one type in one zone as delivered by the job/school generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacancyRecord {
    pub destination_type: DestinationType,
    pub zone: ZoneId,
    pub destinations: Vec<DestinationId>,
}

#[derive(Debug, Clone, Default)]
struct TypeVacancies {
    zones: Vec<ZoneId>,
    position: HashMap<ZoneId, usize>,
    seats: HashMap<ZoneId, Vec<DestinationId>>,
}

impl TypeVacancies {
    fn add(&mut self, zone: ZoneId, destinations: impl IntoIterator<Item = DestinationId>) -> u64 {
        let slot = self.seats.entry(zone).or_default();
        let before = slot.len();
        // Stored reversed so seats are handed out in the order given.
        let mut incoming: Vec<DestinationId> = destinations.into_iter().collect();
        incoming.reverse();
        incoming.append(slot);
        *slot = incoming;
        let added = (slot.len() - before) as u64;
        if before == 0 && !slot.is_empty() {
            self.position.insert(zone, self.zones.len());
            self.zones.push(zone);
        }
        if slot.is_empty() {
            self.seats.remove(&zone);
        }
        added
    }

    fn remove_zone(&mut self, zone: ZoneId) {
        if let Some(pos) = self.position.remove(&zone) {
            self.zones.swap_remove(pos);
            if let Some(&moved) = self.zones.get(pos) {
                self.position.insert(moved, pos);
            }
        }
        self.seats.remove(&zone);
    }
}

/// Initial versus consumed capacity of one destination type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLedger {
    pub initial: u64,
    pub reserved: u64,
}

impl CapacityLedger {
    pub fn remaining(&self) -> u64 {
        self.initial - self.reserved
    }
}

#[derive(Debug, Clone, Default)]
pub struct VacancyRegistry {
    types: BTreeMap<DestinationType, TypeVacancies>,
    ledger: BTreeMap<DestinationType, CapacityLedger>,
}

impl VacancyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<VacancyRecord>) -> Self {
        let mut grouped: BTreeMap<(DestinationType, ZoneId), Vec<DestinationId>> = BTreeMap::new();
        for r in records {
            grouped
                .entry((r.destination_type, r.zone))
                .or_default()
                .extend(r.destinations);
        }
        let mut registry = Self::new();
        for ((destination_type, zone), destinations) in grouped {
            registry.add(destination_type, zone, destinations);
        }
        registry
    }

    /// Like `from_records`, but every seat must sit in a zone of `geography`.
    pub fn from_records_in(records: Vec<VacancyRecord>, geography: &Geography) -> SynthResult<Self> {
        if let Some(r) = records
            .iter()
            .find(|r| geography.municipality_of(r.zone).is_none())
        {
            return Err(SynthError::UnknownZone { zone: r.zone });
        }
        Ok(Self::from_records(records))
    }

    pub fn add(
        &mut self,
        destination_type: DestinationType,
        zone: ZoneId,
        destinations: impl IntoIterator<Item = DestinationId>,
    ) {
        let added = self
            .types
            .entry(destination_type.clone())
            .or_default()
            .add(zone, destinations);
        self.ledger.entry(destination_type.clone()).or_default().initial += added;
        if self.types.get(&destination_type).is_some_and(|t| t.zones.is_empty()) {
            self.types.remove(&destination_type);
        }
    }

    /// Zones that still hold seats of `destination_type`.
    pub fn zones_with_vacancies(&self, destination_type: &DestinationType) -> &[ZoneId] {
        self.types
            .get(destination_type)
            .map(|t| t.zones.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_vacancies(&self, destination_type: &DestinationType) -> bool {
        self.types.contains_key(destination_type)
    }

    pub fn remaining(&self, destination_type: &DestinationType, zone: ZoneId) -> usize {
        self.types
            .get(destination_type)
            .and_then(|t| t.seats.get(&zone))
            .map_or(0, Vec::len)
    }

    /// Hand out one seat of `destination_type` in `zone`, or `None` if
    /// the zone has nothing left.
    pub fn reserve_one(
        &mut self,
        destination_type: &DestinationType,
        zone: ZoneId,
    ) -> Option<DestinationId> {
        let vacancies = self.types.get_mut(destination_type)?;
        let seats = vacancies.seats.get_mut(&zone)?;
        let destination = seats.pop()?;
        if seats.is_empty() {
            vacancies.remove_zone(zone);
        }
        if vacancies.zones.is_empty() {
            self.types.remove(destination_type);
        }
        if let Some(ledger) = self.ledger.get_mut(destination_type) {
            ledger.reserved += 1;
        }
        Some(destination)
    }

    pub fn ledger(&self, destination_type: &DestinationType) -> CapacityLedger {
        self.ledger.get(destination_type).copied().unwrap_or_default()
    }

    /// Every type ever registered, including exhausted ones.
    pub fn ledgers(&self) -> impl Iterator<Item = (&DestinationType, &CapacityLedger)> {
        self.ledger.iter()
    }

    pub fn remaining_capacity(&self, destination_type: &DestinationType) -> u64 {
        self.types
            .get(destination_type)
            .map_or(0, |t| t.seats.values().map(|s| s.len() as u64).sum())
    }
}

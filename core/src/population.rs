//! Synthesized households, persons and dwellings.
//!
//! A household owns its persons and exactly one dwelling. After the draw
//! only two fields ever change: `SyntheticPerson::role` (relationship
//! classifier) and `SyntheticPerson::destination` (spatial assignment).

use crate::{
    microdata::{Gender, MicrodataRecord, Occupation, RelationshipCode},
    types::{DestinationId, EntityId, MunicipalityId, ZoneId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of seat a worker or student needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "class", rename_all = "snake_case")]
pub enum DestinationType {
    Job(String),
    School(String),
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job(sector) => write!(f, "job:{sector}"),
            Self::School(level) => write!(f, "school:{level}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Child,
    Single,
    Married,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::Single => "single",
            Self::Married => "married",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Destination {
    Assigned {
        zone: ZoneId,
        destination: DestinationId,
    },
    /// No capacity of the required type was left anywhere.
    OutsideStudyArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticPerson {
    pub id: EntityId,
    pub household_id: EntityId,
    pub age: u32,
    pub gender: Gender,
    pub occupation: Occupation,
    pub job_sector: Option<String>,
    pub school_level: Option<String>,
    pub education: u8,
    pub relationship: RelationshipCode,
    pub income: u32,
    pub role: Option<Role>,
    pub destination: Option<Destination>,
}

impl SyntheticPerson {
    /// The seat this person competes for, if any.
    pub fn destination_type(&self) -> Option<DestinationType> {
        match self.occupation {
            Occupation::Employed => self.job_sector.clone().map(DestinationType::Job),
            Occupation::Student => self.school_level.clone().map(DestinationType::School),
            Occupation::Inactive => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDwelling {
    pub id: EntityId,
    pub household_id: EntityId,
    pub zone: ZoneId,
    pub kind: String,
    pub bedrooms: u32,
    pub year_built: u32,
    pub quality: u8,
    pub monthly_cost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticHousehold {
    pub id: EntityId,
    pub zone: ZoneId,
    pub municipality: MunicipalityId,
    /// Id of the microdata record this household was copied from.
    pub source_record: u64,
    pub persons: Vec<SyntheticPerson>,
    pub dwelling: SyntheticDwelling,
}

impl SyntheticHousehold {
    /// Copy `record` into a fresh household placed in `zone`.
    pub fn from_record(
        record: &MicrodataRecord,
        zone: ZoneId,
        municipality: MunicipalityId,
        ids: &mut IdAllocator,
    ) -> Self {
        let household_id = ids.next_household();
        let persons = record
            .persons
            .iter()
            .map(|p| SyntheticPerson {
                id: ids.next_person(),
                household_id,
                age: p.age,
                gender: p.gender,
                occupation: p.occupation,
                job_sector: p.job_sector.clone(),
                school_level: p.school_level.clone(),
                education: p.education,
                relationship: p.relationship,
                income: p.income,
                role: None,
                destination: None,
            })
            .collect();
        let d = &record.dwelling;
        let dwelling = SyntheticDwelling {
            id: ids.next_dwelling(),
            household_id,
            zone,
            kind: d.kind.clone(),
            bedrooms: d.bedrooms,
            year_built: d.year_built,
            quality: d.quality,
            monthly_cost: d.monthly_cost,
        };
        Self {
            id: household_id,
            zone,
            municipality,
            source_record: record.id,
            persons,
            dwelling,
        }
    }

    pub fn size(&self) -> usize {
        self.persons.len()
    }
}

/// Hands out sequential ids per entity kind, starting at 1.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    household: EntityId,
    person: EntityId,
    dwelling: EntityId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            household: 1,
            person: 1,
            dwelling: 1,
        }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_household(&mut self) -> EntityId {
        let id = self.household;
        self.household += 1;
        id
    }

    pub fn next_person(&mut self) -> EntityId {
        let id = self.person;
        self.person += 1;
        id
    }

    pub fn next_dwelling(&mut self) -> EntityId {
        let id = self.dwelling;
        self.dwelling += 1;
        id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub households: Vec<SyntheticHousehold>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn household_count(&self) -> usize {
        self.households.len()
    }

    pub fn person_count(&self) -> usize {
        self.households.iter().map(|h| h.persons.len()).sum()
    }

    pub fn persons(&self) -> impl Iterator<Item = &SyntheticPerson> {
        self.households.iter().flat_map(|h| h.persons.iter())
    }

    pub fn households_in_municipality(&self, municipality: MunicipalityId) -> usize {
        self.households
            .iter()
            .filter(|h| h.municipality == municipality)
            .count()
    }

    pub fn households_in_zone(&self, zone: ZoneId) -> usize {
        self.households.iter().filter(|h| h.zone == zone).count()
    }

    pub fn role_count(&self, role: Role) -> usize {
        self.persons().filter(|p| p.role == Some(role)).count()
    }
}

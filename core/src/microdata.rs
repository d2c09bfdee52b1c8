//! Household survey sample used as the template for synthesis.
//!
//! Raw records come from the loader as string-keyed attribute maps.
//! `MicrodataRecord::from_raw` pins them to the schema's fixed order
//! and rejects anything with a missing code. Records whose declared
//! household size disagrees with their person list are dropped and
//! counted rather than failing the run.

use crate::error::{SynthError, SynthResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A categorical value such as `gender=female`, keying both
/// microdata frequencies and control totals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeCode(String);

impl AttributeCode {
    /// Matches every person in a household.
    pub const POPULATION: &'static str = "population";
    /// Matches every household exactly once.
    pub const HOUSEHOLDS: &'static str = "households";

    pub fn new(name: &str, value: &str) -> Self {
        Self(format!("{name}={value}"))
    }

    pub fn population() -> Self {
        Self(Self::POPULATION.into())
    }

    pub fn households() -> Self {
        Self(Self::HOUSEHOLDS.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttributeCode {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}

impl fmt::Display for AttributeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute names every record must carry, in their fixed order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub household: Vec<String>,
    pub person: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupation {
    Employed,
    Student,
    Inactive,
}

/// Relationship to the household head as coded in the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipCode {
    Head,
    Spouse,
    Child,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl Occupation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employed => "employed",
            Self::Student => "student",
            Self::Inactive => "inactive",
        }
    }
}

impl RelationshipCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Spouse => "spouse",
            Self::Child => "child",
            Self::Other => "other",
        }
    }
}

// ── Loader records ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPerson {
    pub age: u32,
    pub gender: Gender,
    pub occupation: Occupation,
    #[serde(default)]
    pub job_sector: Option<String>,
    #[serde(default)]
    pub school_level: Option<String>,
    #[serde(default)]
    pub education: u8,
    pub relationship: RelationshipCode,
    #[serde(default)]
    pub income: u32,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHousehold {
    pub id: u64,
    /// Household size as declared by the survey.
    pub size: u32,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub persons: Vec<RawPerson>,
    pub dwelling: MicrodataDwelling,
}

// ── Validated records ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrodataDwelling {
    pub kind: String,
    pub bedrooms: u32,
    pub year_built: u32,
    pub quality: u8,
    pub monthly_cost: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MicrodataPerson {
    pub age: u32,
    pub gender: Gender,
    pub occupation: Occupation,
    pub job_sector: Option<String>,
    pub school_level: Option<String>,
    pub education: u8,
    pub relationship: RelationshipCode,
    pub income: u32,
    /// One code per `AttributeSchema::person` entry, same order.
    pub codes: Vec<AttributeCode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MicrodataRecord {
    pub id: u64,
    /// One code per `AttributeSchema::household` entry, same order.
    pub codes: Vec<AttributeCode>,
    pub persons: Vec<MicrodataPerson>,
    pub dwelling: MicrodataDwelling,
}

impl MicrodataRecord {
    pub fn from_raw(raw: RawHousehold, schema: &AttributeSchema) -> SynthResult<Self> {
        let codes = code_attributes(raw.id, &raw.attributes, &schema.household)?;
        let persons = raw
            .persons
            .into_iter()
            .map(|p| {
                let codes = code_attributes(raw.id, &p.attributes, &schema.person)?;
                Ok(MicrodataPerson {
                    age: p.age,
                    gender: p.gender,
                    occupation: p.occupation,
                    job_sector: p.job_sector,
                    school_level: p.school_level,
                    education: p.education,
                    relationship: p.relationship,
                    income: p.income,
                    codes,
                })
            })
            .collect::<SynthResult<Vec<_>>>()?;

        Ok(Self {
            id: raw.id,
            codes,
            persons,
            dwelling: raw.dwelling,
        })
    }

    /// How many members of this household exhibit `code`.
    /// Household-level codes count once; person-level codes count
    /// once per matching person.
    pub fn frequency(&self, code: &AttributeCode) -> u32 {
        match code.as_str() {
            AttributeCode::POPULATION => self.persons.len() as u32,
            AttributeCode::HOUSEHOLDS => 1,
            _ => {
                let household = self.codes.iter().filter(|c| *c == code).count();
                let persons = self
                    .persons
                    .iter()
                    .filter(|p| p.codes.contains(code))
                    .count();
                (household + persons) as u32
            }
        }
    }
}

fn code_attributes(
    record_id: u64,
    values: &BTreeMap<String, String>,
    names: &[String],
) -> SynthResult<Vec<AttributeCode>> {
    names
        .iter()
        .map(|name| match values.get(name) {
            Some(value) if !value.trim().is_empty() => Ok(AttributeCode::new(name, value.trim())),
            _ => Err(SynthError::InvalidRecord {
                record_id,
                attribute: name.clone(),
            }),
        })
        .collect()
}

/// The validated sample plus what was dropped on the way in.
#[derive(Debug, Clone, Default)]
pub struct Microdata {
    pub records: Vec<MicrodataRecord>,
    /// Records discarded for a household/person count mismatch.
    pub dropped: usize,
}

impl Microdata {
    pub fn from_raw(raw: Vec<RawHousehold>, schema: &AttributeSchema) -> SynthResult<Self> {
        let mut records = Vec::with_capacity(raw.len());
        let mut dropped = 0usize;
        for household in raw {
            if household.size as usize != household.persons.len() {
                log::debug!(
                    "microdata: dropping record {} (size {} but {} persons)",
                    household.id,
                    household.size,
                    household.persons.len()
                );
                dropped += 1;
                continue;
            }
            records.push(MicrodataRecord::from_raw(household, schema)?);
        }
        if dropped > 0 {
            log::warn!("microdata: dropped {dropped} records with inconsistent household size");
        }
        Ok(Self { records, dropped })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

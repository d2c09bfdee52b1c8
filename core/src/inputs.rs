//! Every external table the pipeline consumes, loaded once.
//!
//! Layout under the data directory:
//!   microdata/households.json     survey households with persons and dwelling
//!   controls/municipality.json    municipality-level control totals
//!   controls/county.json          county-level control totals
//!   controls/households.json      household targets per municipality
//!   geography/zones.json          zone → municipality → county, population shares
//!   geography/distances.json      zone-pair distances (km)
//!   trips/trip_length.json        trip-length frequency by km bucket
//!   destinations/vacancies.json   job and school seats per zone

use crate::{
    config::SynthConfig,
    controls::{ControlRecord, ControlTotals, HouseholdTarget},
    geography::{Geography, ZoneRecord},
    impedance::{DistanceRecord, ImpedanceMatrix, TripLengthDistribution, TripLengthRecord},
    microdata::{
        AttributeCode, Gender, Microdata, MicrodataDwelling, Occupation, RawHousehold, RawPerson,
        RelationshipCode,
    },
    population::DestinationType,
    types::{DestinationId, ZoneId},
    vacancy::{VacancyRecord, VacancyRegistry},
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct HouseholdsFile {
    households: Vec<RawHousehold>,
}

#[derive(Debug, Deserialize)]
struct ControlsFile {
    controls: Vec<ControlRecord>,
}

#[derive(Debug, Deserialize)]
struct HouseholdTargetsFile {
    targets: Vec<HouseholdTarget>,
}

#[derive(Debug, Deserialize)]
struct ZonesFile {
    zones: Vec<ZoneRecord>,
}

#[derive(Debug, Deserialize)]
struct DistancesFile {
    distances: Vec<DistanceRecord>,
}

#[derive(Debug, Deserialize)]
struct TripLengthFile {
    buckets: Vec<TripLengthRecord>,
}

#[derive(Debug, Deserialize)]
struct VacanciesFile {
    vacancies: Vec<VacancyRecord>,
}

fn read_json<T: DeserializeOwned>(data_dir: &str, relative: &str) -> anyhow::Result<T> {
    let path = format!("{data_dir}/{relative}");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

pub struct SynthInputs {
    pub microdata: Microdata,
    pub controls: ControlTotals,
    pub geography: Geography,
    pub impedance: ImpedanceMatrix,
    pub vacancies: VacancyRegistry,
}

impl SynthInputs {
    /// Load from the data/ directory.
    /// In tests, use SynthInputs::default_test().
    pub fn load(data_dir: &str, config: &SynthConfig) -> anyhow::Result<Self> {
        let households: HouseholdsFile = read_json(data_dir, "microdata/households.json")?;
        let microdata = Microdata::from_raw(households.households, &config.schema)?;

        let municipality: ControlsFile = read_json(data_dir, "controls/municipality.json")?;
        let county: ControlsFile = read_json(data_dir, "controls/county.json")?;
        let targets: HouseholdTargetsFile = read_json(data_dir, "controls/households.json")?;
        let controls =
            ControlTotals::from_records(municipality.controls, county.controls, targets.targets);

        let zones: ZonesFile = read_json(data_dir, "geography/zones.json")?;
        let geography = Geography::from_records(zones.zones)?;

        let distances: DistancesFile = read_json(data_dir, "geography/distances.json")?;
        let trips: TripLengthFile = read_json(data_dir, "trips/trip_length.json")?;
        let trip_lengths = TripLengthDistribution::from_records(trips.buckets);
        let impedance = ImpedanceMatrix::build(geography.zones(), distances.distances, &trip_lengths)?;

        let vacancies: VacanciesFile = read_json(data_dir, "destinations/vacancies.json")?;
        let vacancies = VacancyRegistry::from_records_in(vacancies.vacancies, &geography)?;

        log::info!(
            "inputs: {} microdata records ({} dropped), {} zones",
            microdata.len(),
            microdata.dropped,
            geography.zone_count()
        );

        Ok(Self {
            microdata,
            controls,
            geography,
            impedance,
            vacancies,
        })
    }

    /// A small two-county region for unit and integration tests.
    /// Matches the schema of `SynthConfig::default_test()`.
    pub fn default_test(config: &SynthConfig) -> anyhow::Result<Self> {
        let households = test_households();
        let microdata = Microdata::from_raw(households, &config.schema)?;

        let zone_rows = [
            (101, 10, 1, 0.6),
            (102, 10, 1, 0.4),
            (111, 11, 1, 0.5),
            (112, 11, 1, 0.5),
            (201, 20, 2, 0.7),
            (202, 20, 2, 0.3),
        ];
        let geography = Geography::from_records(
            zone_rows
                .iter()
                .map(|&(zone, municipality, county, population_share)| ZoneRecord {
                    zone,
                    municipality,
                    county,
                    population_share,
                })
                .collect(),
        )?;

        let mut controls = ControlTotals::new();
        let municipality_rows = [
            (10, 30, 70.0, 36.0, 9.0),
            (11, 20, 45.0, 23.0, 7.0),
            (20, 25, 60.0, 31.0, 6.0),
        ];
        for (m, households, population, female, single) in municipality_rows {
            controls.set_households(m, households);
            controls.set_municipality(m, AttributeCode::population(), population);
            controls.set_municipality(m, AttributeCode::new("gender", "female"), female);
            controls.set_municipality(m, AttributeCode::new("hhSize", "1"), single);
        }
        controls.set_county(1, AttributeCode::new("dwellingType", "house"), 18.0);
        controls.set_county(1, AttributeCode::new("ageGroup", "65+"), 8.0);
        controls.set_county(2, AttributeCode::new("dwellingType", "house"), 9.0);
        controls.set_county(2, AttributeCode::new("ageGroup", "65+"), 5.0);

        // Zones laid out on a line, 2.5 km apart, 0.5 km intrazonal.
        let zones: Vec<ZoneId> = zone_rows.iter().map(|r| r.0).collect();
        let mut distances = Vec::new();
        for (i, &origin) in zones.iter().enumerate() {
            for (j, &destination) in zones.iter().enumerate() {
                distances.push(DistanceRecord {
                    origin,
                    destination,
                    distance_km: 0.5 + 2.5 * i.abs_diff(j) as f64,
                });
            }
        }
        let trip_lengths = TripLengthDistribution::from_records(
            (0..20)
                .map(|km| TripLengthRecord {
                    distance_km: km,
                    frequency: 100.0 / (1.0 + km as f64),
                })
                .collect(),
        );
        let impedance = ImpedanceMatrix::build(zones.iter().copied(), distances, &trip_lengths)?;

        let mut next_id: DestinationId = 1000;
        let mut seats = |n: u64| -> Vec<DestinationId> {
            let ids = (next_id..next_id + n).collect();
            next_id += n;
            ids
        };
        let job = |s: &str| DestinationType::Job(s.into());
        let school = |s: &str| DestinationType::School(s.into());
        let vacancies = VacancyRegistry::from_records_in(
            vec![
                VacancyRecord { destination_type: job("retail"), zone: 101, destinations: seats(15) },
                VacancyRecord { destination_type: job("retail"), zone: 201, destinations: seats(10) },
                VacancyRecord { destination_type: job("office"), zone: 111, destinations: seats(20) },
                VacancyRecord { destination_type: job("office"), zone: 202, destinations: seats(5) },
                VacancyRecord { destination_type: school("primary"), zone: 102, destinations: seats(10) },
                VacancyRecord { destination_type: school("primary"), zone: 201, destinations: seats(8) },
                VacancyRecord { destination_type: school("secondary"), zone: 112, destinations: seats(6) },
            ],
            &geography,
        )?;

        Ok(Self {
            microdata,
            controls,
            geography,
            impedance,
            vacancies,
        })
    }
}

fn age_group(age: u32) -> &'static str {
    match age {
        0..=15 => "0-15",
        16..=64 => "16-64",
        _ => "65+",
    }
}

fn test_person(
    age: u32,
    gender: Gender,
    occupation: Occupation,
    destination: Option<&str>,
    relationship: RelationshipCode,
) -> RawPerson {
    let (job_sector, school_level) = match occupation {
        Occupation::Employed => (destination.map(String::from), None),
        Occupation::Student => (None, destination.map(String::from)),
        Occupation::Inactive => (None, None),
    };
    let mut attributes = BTreeMap::new();
    attributes.insert("gender".to_string(), gender.as_str().to_string());
    attributes.insert("ageGroup".to_string(), age_group(age).to_string());
    RawPerson {
        age,
        gender,
        occupation,
        job_sector,
        school_level,
        education: if age < 16 { 1 } else { 3 },
        relationship,
        income: if occupation == Occupation::Employed { 32_000 } else { 0 },
        attributes,
    }
}

fn test_household(id: u64, dwelling: &str, persons: Vec<RawPerson>) -> RawHousehold {
    let mut attributes = BTreeMap::new();
    attributes.insert("hhSize".to_string(), persons.len().to_string());
    attributes.insert("dwellingType".to_string(), dwelling.to_string());
    RawHousehold {
        id,
        size: persons.len() as u32,
        attributes,
        persons,
        dwelling: MicrodataDwelling {
            kind: dwelling.to_string(),
            bedrooms: if dwelling == "house" { 3 } else { 2 },
            year_built: 1985,
            quality: 2,
            monthly_cost: if dwelling == "house" { 1_200 } else { 750 },
        },
    }
}

fn test_households() -> Vec<RawHousehold> {
    use Gender::{Female, Male};
    use Occupation::{Employed, Inactive, Student};
    use RelationshipCode::{Child, Head, Other, Spouse};

    let mut inconsistent = test_household(
        8,
        "apartment",
        vec![
            test_person(52, Male, Employed, Some("office"), Head),
            test_person(50, Female, Inactive, None, Spouse),
        ],
    );
    inconsistent.size = 3;

    vec![
        test_household(1, "apartment", vec![test_person(34, Male, Employed, Some("retail"), Head)]),
        test_household(
            2,
            "house",
            vec![
                test_person(45, Male, Employed, Some("office"), Head),
                test_person(43, Female, Employed, Some("retail"), Spouse),
            ],
        ),
        test_household(
            3,
            "house",
            vec![
                test_person(38, Male, Employed, Some("office"), Head),
                test_person(36, Female, Inactive, None, Spouse),
                test_person(8, Female, Student, Some("primary"), Child),
                test_person(14, Male, Student, Some("secondary"), Child),
            ],
        ),
        test_household(4, "apartment", vec![test_person(71, Female, Inactive, None, Head)]),
        test_household(
            5,
            "apartment",
            vec![
                test_person(29, Female, Student, Some("university"), Head),
                test_person(31, Male, Employed, Some("retail"), Spouse),
            ],
        ),
        test_household(
            6,
            "apartment",
            vec![
                test_person(41, Female, Employed, Some("office"), Head),
                test_person(10, Male, Student, Some("primary"), Child),
            ],
        ),
        test_household(
            7,
            "apartment",
            vec![
                test_person(24, Male, Employed, Some("retail"), Head),
                test_person(26, Male, Employed, Some("office"), Other),
                test_person(25, Female, Student, Some("university"), Other),
            ],
        ),
        test_household(
            9,
            "house",
            vec![
                test_person(68, Male, Inactive, None, Head),
                test_person(66, Female, Inactive, None, Spouse),
            ],
        ),
        inconsistent,
    ]
}

use crate::types::{MunicipalityId, ZoneId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Microdata record {record_id} is missing attribute '{attribute}'")]
    InvalidRecord { record_id: u64, attribute: String },

    #[error("Zone {zone} is not part of the geography")]
    UnknownZone { zone: ZoneId },

    #[error("Municipality {municipality} is not part of the geography")]
    UnknownMunicipality { municipality: MunicipalityId },

    #[error("Municipality {municipality} has no zones to place households in")]
    NoZones { municipality: MunicipalityId },

    #[error("Municipality {municipality} needs households but carries no weight")]
    EmptyWeightPool { municipality: MunicipalityId },

    #[error("Stage '{stage}' ran before its inputs were produced")]
    StageOrder { stage: &'static str },

    #[error("Run not initialized")]
    RunNotInitialized,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SynthResult<T> = Result<T, SynthError>;

//! Shared primitive types used across the entire synthesis pipeline.

/// A traffic analysis zone, the finest geography level.
pub type ZoneId = u32;

/// A municipality. Every zone belongs to exactly one.
pub type MunicipalityId = u32;

/// A county. Every municipality belongs to exactly one.
pub type CountyId = u32;

/// A concrete job or school seat handed out by the vacancy registry.
pub type DestinationId = u64;

/// A sequential identifier for a synthesized household, person or dwelling.
pub type EntityId = u64;

/// The canonical run identifier.
pub type RunId = String;

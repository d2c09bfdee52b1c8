use crate::{microdata::AttributeSchema, population::DestinationType};
use serde::{Deserialize, Serialize};

// ── Weight fitting ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpuConfig {
    /// Hard cap on iterations per county.
    pub max_iterations: u32,
    /// Averaged relative error below which a county counts as converged.
    pub max_error: f64,
    /// Minimum relative improvement between checkpoints before giving up.
    pub improvement_error: f64,
    /// Iterations between improvement checkpoints.
    pub improvement_check_interval: u32,
    /// Weighted sums at or below this are not rescaled.
    pub min_weighted_sum: f64,
    /// Stand-in for a zero frequency cell.
    pub frequency_epsilon: f64,
    /// Stand-in for a zero control total.
    pub total_epsilon: f64,
    /// Size of the municipality worker pool. 0 lets rayon decide.
    pub worker_threads: usize,
}

impl Default for IpuConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            max_error: 1e-5,
            improvement_error: 0.001,
            improvement_check_interval: 2,
            min_weighted_sum: 0.001,
            frequency_epsilon: 1e-7,
            total_epsilon: 0.1,
            worker_threads: 0,
        }
    }
}

// ── Household draw ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Weight removed from a record each time it is drawn.
    pub depletion_step: f64,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self { depletion_step: 1.0 }
    }
}

// ── Relationship classification ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipConfig {
    /// Members younger than this are children in multi-person households.
    pub child_age_threshold: u32,
    /// Age gap (years) at which the marriage probability reaches zero.
    pub marriage_age_gap: f64,
    /// Divisor turning the remaining gap into an acceptance probability.
    pub marriage_acceptance_scale: f64,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            child_age_threshold: 16,
            marriage_age_gap: 20.0,
            marriage_acceptance_scale: 10.0,
        }
    }
}

// ── Spatial assignment ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Types placed at the lowest-cost zone instead of by weighted draw.
    pub nearest_destination_types: Vec<DestinationType>,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            nearest_destination_types: vec![DestinationType::School("primary".into())],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SynthesisFile {
    ipu: IpuConfig,
    draw: DrawConfig,
    relationship: RelationshipConfig,
    assignment: AssignmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    pub schema: AttributeSchema,
    pub ipu: IpuConfig,
    pub draw: DrawConfig,
    pub relationship: RelationshipConfig,
    pub assignment: AssignmentConfig,
}

impl SynthConfig {
    /// Load from the data/ directory.
    /// In tests, use SynthConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let schema_path = format!("{data_dir}/config/attributes.json");
        let schema_content = std::fs::read_to_string(&schema_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {schema_path}: {e}"))?;
        let schema: AttributeSchema = serde_json::from_str(&schema_content)?;

        // Tuning is optional; every field has a default.
        let synthesis_path = format!("{data_dir}/config/synthesis.json");
        let synthesis = match std::fs::read_to_string(&synthesis_path) {
            Ok(content) => serde_json::from_str::<SynthesisFile>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{synthesis_path} not found, using default tuning");
                SynthesisFile::default()
            }
            Err(e) => return Err(anyhow::anyhow!("Cannot read {synthesis_path}: {e}")),
        };

        Ok(Self {
            schema,
            ipu: synthesis.ipu,
            draw: synthesis.draw,
            relationship: synthesis.relationship,
            assignment: synthesis.assignment,
        })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            schema: AttributeSchema {
                household: vec!["hhSize".into(), "dwellingType".into()],
                person: vec!["gender".into(), "ageGroup".into()],
            },
            ipu: IpuConfig {
                worker_threads: 2,
                ..IpuConfig::default()
            },
            draw: DrawConfig::default(),
            relationship: RelationshipConfig::default(),
            assignment: AssignmentConfig::default(),
        }
    }
}

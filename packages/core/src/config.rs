//! Simulation configuration file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::plan::SeedSource;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Shape of the JSON configuration consumed by the plan builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of work units.
    pub chunks: usize,
    /// Samples drawn by each unit.
    pub iterations_per_chunk: u64,
    /// One seed per chunk; may be omitted when seeds are randomized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seeds: Vec<u64>,
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check the shape against the requested seeding mode.
    pub fn validate(&self, randomize_seeds: bool) -> Result<(), ConfigError> {
        if self.chunks == 0 {
            return Err(ConfigError::Invalid("chunks must be positive".into()));
        }
        if self.iterations_per_chunk == 0 {
            return Err(ConfigError::Invalid(
                "iterations_per_chunk must be positive".into(),
            ));
        }
        if !randomize_seeds && self.seeds.len() != self.chunks {
            return Err(ConfigError::Invalid(format!(
                "{} seeds configured for {} chunks",
                self.seeds.len(),
                self.chunks
            )));
        }
        Ok(())
    }

    pub fn seed_source(&self, randomize_seeds: bool) -> SeedSource {
        if randomize_seeds {
            SeedSource::randomized()
        } else {
            SeedSource::explicit(&self.seeds)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_and_validates() {
        let cfg = SimConfig::from_json(
            r#"{"chunks": 3, "iterations_per_chunk": 500, "seeds": [1, 2, 3]}"#,
        )
        .unwrap();
        assert!(cfg.validate(false).is_ok());
        assert_eq!(cfg.seed_source(false), SeedSource::explicit(["1", "2", "3"]));
    }

    #[test]
    fn seeds_optional_only_when_randomized() {
        let cfg = SimConfig::from_json(r#"{"chunks": 2, "iterations_per_chunk": 10}"#).unwrap();
        assert!(cfg.validate(true).is_ok());
        assert!(matches!(cfg.validate(false), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"chunks": 1, "iterations_per_chunk": 7, "seeds": [42]}}"#).unwrap();
        let cfg = SimConfig::load(file.path()).unwrap();
        assert_eq!(cfg.iterations_per_chunk, 7);

        let missing = SimConfig::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}

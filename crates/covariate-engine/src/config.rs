//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `filters/Eigen1.ref` .. `filters/Eigen3.ref`
    pub elements_dir: PathBuf,

    /// Fine sampling resolution used when a script sets none (ms)
    pub default_sampling_ms: u32,

    /// Sampling interval of the canonical eigenvector kernels (ms)
    pub eigen_reference_ms: u32,

    /// Sampling interval of efficiency filter files (ms)
    pub efficiency_reference_ms: u32,

    /// Deepest allowed chain of nested `include` directives
    pub max_include_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            elements_dir: PathBuf::from("elements"),
            default_sampling_ms: 100,
            eigen_reference_ms: 2000,
            efficiency_reference_ms: 2000,
            max_include_depth: 32,
        }
    }
}

impl EngineConfig {
    /// Load from `path` (or an optional `gds.toml` in the working directory),
    /// then apply `GDS_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name("gds").required(false),
        };
        config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("GDS"))
            .build()?
            .try_deserialize()
    }

    /// Path of the `index`-th (1-based) eigenvector kernel
    pub fn eigen_kernel(&self, index: usize) -> PathBuf {
        self.elements_dir.join("filters").join(format!("Eigen{}.ref", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_sampling_ms, 100);
        assert_eq!(config.eigen_kernel(2), PathBuf::from("elements/filters/Eigen2.ref"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gds.toml");
        std::fs::write(&path, "elements_dir = \"/opt/vb/elements\"\ndefault_sampling_ms = 50\n").unwrap();
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.elements_dir, PathBuf::from("/opt/vb/elements"));
        assert_eq!(config.default_sampling_ms, 50);
        assert_eq!(config.eigen_reference_ms, 2000);
    }
}

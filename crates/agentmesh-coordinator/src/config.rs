use std::path::Path;

use agentmesh_core::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};

/// Tuning knobs for the coordinator, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// A task with more requirements than this goes to a collaboration.
    #[serde(default = "default_requirement_threshold")]
    pub collab_requirement_threshold: usize,
    /// How many agents a scheduler-created collaboration claims (at most).
    #[serde(default = "default_team_size")]
    pub collab_team_size: usize,
    /// Timeout stamped onto request-kind session messages, in seconds.
    #[serde(default = "default_response_timeout")]
    pub default_response_timeout_secs: f64,
    /// Hard cap on the pending queue; submissions beyond it are rejected.
    #[serde(default = "default_max_queued")]
    pub max_queued_tasks: usize,
}

fn default_requirement_threshold() -> usize {
    2
}

fn default_team_size() -> usize {
    3
}

fn default_response_timeout() -> f64 {
    30.0
}

fn default_max_queued() -> usize {
    1024
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            collab_requirement_threshold: default_requirement_threshold(),
            collab_team_size: default_team_size(),
            default_response_timeout_secs: default_response_timeout(),
            max_queued_tasks: default_max_queued(),
        }
    }
}

impl CoordinatorConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> MeshResult<Self> {
        toml::from_str(text).map_err(|e| MeshError::Config(format!("invalid config: {e}")))
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> MeshResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Sanity-check the knobs.
    pub fn validate(&self) -> MeshResult<()> {
        if self.collab_team_size == 0 {
            return Err(MeshError::Config("collab_team_size must be at least 1".into()));
        }
        if self.default_response_timeout_secs <= 0.0 {
            return Err(MeshError::Config(
                "default_response_timeout_secs must be positive".into(),
            ));
        }
        if self.max_queued_tasks == 0 {
            return Err(MeshError::Config("max_queued_tasks must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.collab_requirement_threshold, 2);
        assert_eq!(cfg.collab_team_size, 3);
        assert_eq!(cfg.default_response_timeout_secs, 30.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg = CoordinatorConfig::from_toml_str("collab_team_size = 5\n").unwrap();
        assert_eq!(cfg.collab_team_size, 5);
        assert_eq!(cfg.collab_requirement_threshold, 2);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = CoordinatorConfig::from_toml_str("collab_team_size = \"many\"");
        assert!(matches!(result, Err(MeshError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_team() {
        let cfg = CoordinatorConfig {
            collab_team_size: 0,
            ..CoordinatorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentmesh.toml");
        std::fs::write(&path, "max_queued_tasks = 16\n").unwrap();
        let cfg = CoordinatorConfig::from_toml_file(&path).unwrap();
        assert_eq!(cfg.max_queued_tasks, 16);
    }
}

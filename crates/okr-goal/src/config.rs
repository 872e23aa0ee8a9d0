// config.rs - Project layout and engine tuning.
//
// `OkrConfig::for_project()` lays everything out under a `.okr/` directory
// in the project root. Engine settings live in `.okr/config.toml`; a
// missing file means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GoalError, GoalResult};
use crate::metric::TaskWeighting;
use crate::status::StatusPolicy;

/// Where a project keeps its OKR state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkrConfig {
    /// Root directory of the project.
    pub project_root: PathBuf,

    /// Directory for the JSON record store.
    pub store_dir: PathBuf,

    /// Append-only JSONL journal of recalculation events.
    pub journal_path: PathBuf,

    /// Engine settings file.
    pub config_path: PathBuf,
}

impl OkrConfig {
    /// Standard `.okr/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let okr_dir = root.join(".okr");
        Self {
            project_root: root,
            store_dir: okr_dir.join("store"),
            journal_path: okr_dir.join("journal.jsonl"),
            config_path: okr_dir.join("config.toml"),
        }
    }

    /// Load `config.toml`, falling back to defaults when it doesn't exist.
    pub fn load_engine_config(&self) -> GoalResult<EngineConfig> {
        EngineConfig::load(&self.config_path)
    }
}

/// Tunables read from `.okr/config.toml`.
///
/// ```toml
/// [metrics]
/// task_weighting = "weighted"    # or "unweighted"
///
/// [status]
/// at_risk_window_days = 7
/// at_risk_margin = 20
/// recovery_margin = 10
///
/// [concurrency]
/// max_conflict_retries = 3
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub status: StatusPolicy,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default)]
    pub task_weighting: TaskWeighting,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyConfig {
    /// Attempts made by `with_conflict_retry` before giving up.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

fn default_max_conflict_retries() -> u32 {
    3
}

impl EngineConfig {
    pub fn load(path: &Path) -> GoalResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| GoalError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text).map_err(|message| GoalError::ConfigError {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| e.to_string())?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), String> {
        let status = &self.status;
        let values = [
            ("status.at_risk_window_days", status.at_risk_window_days),
            ("status.at_risk_margin", status.at_risk_margin),
            ("status.recovery_margin", status.recovery_margin),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number", name));
            }
        }
        if status.recovery_margin > status.at_risk_margin {
            return Err(
                "status.recovery_margin must not exceed status.at_risk_margin".to_string(),
            );
        }
        Ok(())
    }
}

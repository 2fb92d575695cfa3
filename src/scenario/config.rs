use crate::catalog::CatalogOptions;
use crate::distance::DistanceConfig;
use crate::error::ModelError;
use crate::model::ModelOptions;
use crate::solver::SolverConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// All parameters of one scenario run.  Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
  /// Prefix of the output files; the instance directory name when unset
  pub name: Option<String>,
  pub time_limit_secs: u64,
  pub catalog: CatalogOptions,
  pub distance: DistanceConfig,
  pub model: ModelOptions,
  pub solver: SolverConfig,
}

impl Default for ScenarioConfig {
  fn default() -> Self {
    ScenarioConfig {
      name: None,
      time_limit_secs: 300,
      catalog: CatalogOptions::default(),
      distance: DistanceConfig::default(),
      model: ModelOptions::default(),
      solver: SolverConfig::default(),
    }
  }
}

impl ScenarioConfig {
  pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
    crate::utils::read_json(path)
  }

  pub fn time_limit(&self) -> Result<Duration, ModelError> {
    if self.time_limit_secs == 0 {
      return Err(ModelError::InvalidConfig("time_limit_secs must be positive".into()));
    }
    Ok(Duration::from_secs(self.time_limit_secs))
  }

  pub fn scenario_name(&self, instance_dir: Option<&Path>) -> String {
    self.name.clone()
      .or_else(|| instance_dir?.file_name()?.to_str().map(str::to_string))
      .unwrap_or_else(|| "scenario".to_string())
  }
}

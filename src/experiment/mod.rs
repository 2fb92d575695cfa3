use crate::milp::Instance;
use crate::solution::SolutionSummary;
use crate::solver::{SolveOutcome, Termination};
use serde::{Deserialize, Serialize};

mod stopwatch;
pub use stopwatch::{Lap, Stopwatch};

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSize {
  pub num_vars: usize,
  pub num_binvars: usize,
  pub num_constrs: usize,
}

impl ModelSize {
  pub fn from_instance(instance: &Instance) -> Self {
    ModelSize {
      num_vars: instance.num_vars(),
      num_binvars: instance.num_binvars(),
      num_constrs: instance.num_constrs(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverInfo {
  pub solver: String,
  pub termination: Termination,
  pub objective: Option<f64>,
  pub runtime: f64,
  pub has_incumbent: bool,
}

impl SolverInfo {
  pub fn new(solver: &str, outcome: &SolveOutcome) -> Self {
    SolverInfo {
      solver: solver.to_string(),
      termination: outcome.termination,
      objective: outcome.objective,
      runtime: outcome.runtime.as_secs_f64(),
      has_incumbent: outcome.has_incumbent(),
    }
  }
}

/// Everything recorded about one scenario run, written as `<name>-report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
  pub scenario: String,
  pub size: Option<ModelSize>,
  pub solver: Option<SolverInfo>,
  pub solution: Option<SolutionSummary>,
  /// Set when the run stopped before producing routes
  pub error: Option<String>,
  pub time: Vec<Lap>,
  pub commit_hash: String,
}

impl ScenarioReport {
  pub fn new(scenario: impl Into<String>) -> Self {
    ScenarioReport {
      scenario: scenario.into(),
      size: None,
      solver: None,
      solution: None,
      error: None,
      time: Vec::new(),
      commit_hash: crate::COMMIT_HASH.to_string(),
    }
  }

  pub fn termination(&self) -> Option<Termination> {
    self.solver.as_ref().map(|s| s.termination)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn report_json() {
    let mut inst = Instance::new("t");
    let x = inst.add_binvar("x");
    inst.add_ctsvar("z", 0.0, 1.0);
    inst.add_constr("c", (x * 1.0).leq(1.0));
    let mut report = ScenarioReport::new("small");
    report.size = Some(ModelSize::from_instance(&inst));
    report.solver = Some(SolverInfo::new("glpk", &SolveOutcome::new(Termination::Infeasible, Duration::from_millis(1500))));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["size"]["num_vars"], 2);
    assert_eq!(json["size"]["num_binvars"], 1);
    assert_eq!(json["solver"]["termination"], "Infeasible");
    assert_eq!(json["solver"]["runtime"], 1.5);
    assert_eq!(json["solver"]["has_incumbent"], false);
    assert_eq!(report.termination(), Some(Termination::Infeasible));
  }
}

pub mod glpk;
#[cfg(feature = "gurobi")]
pub mod gurobi;

use crate::error::ModelError;
use crate::milp::{Assignment, Instance};
use clap::ArgEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Termination {
  Optimal,
  Feasible,
  Infeasible,
  TimedOut,
  Error,
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
  pub termination: Termination,
  pub assignment: Option<Assignment>,
  pub objective: Option<f64>,
  pub runtime: Duration,
  /// Solver output kept for diagnostics when the termination is `Error`
  pub message: Option<String>,
}

impl SolveOutcome {
  pub fn new(termination: Termination, runtime: Duration) -> Self {
    SolveOutcome { termination, assignment: None, objective: None, runtime, message: None }
  }

  pub fn with_assignment(mut self, instance: &Instance, assignment: Assignment) -> Self {
    self.objective = Some(instance.objective_value(&assignment));
    self.assignment = Some(assignment);
    self
  }

  pub fn has_incumbent(&self) -> bool {
    self.assignment.is_some()
  }

  /// The variable values, if the outcome carries a usable solution.
  pub fn values(&self) -> Option<&Assignment> {
    match self.termination {
      Termination::Optimal | Termination::Feasible | Termination::TimedOut => self.assignment.as_ref(),
      Termination::Infeasible | Termination::Error => None,
    }
  }

  /// Fails on terminations without a solution, so they can't be mistaken for success.
  pub fn into_result(self) -> Result<Self, ModelError> {
    match self.termination {
      Termination::Infeasible => Err(ModelError::Infeasible),
      Termination::Error => Err(ModelError::Solver(self.message.unwrap_or_else(|| "unknown solver error".into()))),
      Termination::TimedOut if self.assignment.is_none() => Err(ModelError::SolverTimeout { has_incumbent: false }),
      _ => Ok(self),
    }
  }
}

pub trait MilpSolver {
  fn name(&self) -> &'static str;

  /// Solves `instance` within `time_limit`.  Infeasibility and timeouts are outcomes, not errors.
  fn solve(&self, instance: &Instance, time_limit: Duration) -> Result<SolveOutcome, ModelError>;
}

pub(crate) fn check_inputs(instance: &Instance, time_limit: Duration) -> Result<(), ModelError> {
  if time_limit == Duration::from_secs(0) {
    return Err(ModelError::InvalidConfig("solver time limit must be positive".into()));
  }
  instance.validate()
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ArgEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
  Glpk,
  Gurobi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
  pub kind: SolverKind,
  /// Path to the `glpsol` executable
  pub glpsol: String,
  /// Relative MIP gap at which to stop
  pub mip_gap: Option<f64>,
}

impl Default for SolverConfig {
  fn default() -> Self {
    SolverConfig { kind: SolverKind::Glpk, glpsol: "glpsol".to_string(), mip_gap: None }
  }
}

pub fn create(config: &SolverConfig) -> Result<Box<dyn MilpSolver>, ModelError> {
  match config.kind {
    SolverKind::Glpk => Ok(Box::new(glpk::Glpk::new(config))),
    #[cfg(feature = "gurobi")]
    SolverKind::Gurobi => Ok(Box::new(gurobi::Gurobi::new(config))),
    #[cfg(not(feature = "gurobi"))]
    SolverKind::Gurobi => Err(ModelError::InvalidConfig("built without the `gurobi` feature".into())),
  }
}

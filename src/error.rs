use std::fmt;

/// Kind of identifier involved in a failed lookup.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EntityKind {
  Node,
  Depot,
  Client,
  VehicleType,
  VehicleClass,
  Product,
  Metric,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      EntityKind::Node => "node",
      EntityKind::Depot => "depot",
      EntityKind::Client => "client",
      EntityKind::VehicleType => "vehicle type",
      EntityKind::VehicleClass => "vehicle class",
      EntityKind::Product => "product",
      EntityKind::Metric => "distance metric",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
  DuplicateId { kind: EntityKind, id: String },
  NegativeAttribute { id: String, attribute: &'static str, value: f64 },
  EmptySet(EntityKind),
  MissingColumn { file: String, column: String },
  BadValue { file: String, line: u64, column: String, value: String },
}

impl fmt::Display for InputError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InputError::DuplicateId { kind, id } => write!(f, "duplicate {} identifier `{}`", kind, id),
      InputError::NegativeAttribute { id, attribute, value } =>
        write!(f, "`{}` has negative {} ({})", id, attribute, value),
      InputError::EmptySet(kind) => write!(f, "no {} records supplied", kind),
      InputError::MissingColumn { file, column } => write!(f, "{}: missing column `{}`", file, column),
      InputError::BadValue { file, line, column, value } =>
        write!(f, "{}:{}: cannot parse `{}` in column `{}`", file, line, value, column),
    }
  }
}

/// Failures of the model-building pipeline.
///
/// `Infeasible` and `SolverTimeout` are terminal outcomes rather than defects; the solver adapter
/// reports them through [`crate::solver::Termination`] and only converts them into errors on request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
  UnknownEntity { kind: EntityKind, id: String },
  DistanceService(String),
  Infeasible,
  SolverTimeout { has_incumbent: bool },
  MalformedInstance(String),
  InvalidInput(InputError),
  InvalidConfig(String),
  Solver(String),
}

impl ModelError {
  pub fn unknown(kind: EntityKind, id: impl ToString) -> Self {
    ModelError::UnknownEntity { kind, id: id.to_string() }
  }
}

impl fmt::Display for ModelError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ModelError::UnknownEntity { kind, id } => write!(f, "unknown {} `{}`", kind, id),
      ModelError::DistanceService(msg) => write!(f, "distance service error: {}", msg),
      ModelError::Infeasible => f.write_str("model is infeasible"),
      ModelError::SolverTimeout { has_incumbent: true } =>
        f.write_str("solver hit the time limit (incumbent available, not proven optimal)"),
      ModelError::SolverTimeout { has_incumbent: false } =>
        f.write_str("solver hit the time limit without finding a feasible solution"),
      ModelError::MalformedInstance(msg) => write!(f, "malformed instance: {}", msg),
      ModelError::InvalidInput(e) => write!(f, "invalid input: {}", e),
      ModelError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
      ModelError::Solver(msg) => write!(f, "solver error: {}", msg),
    }
  }
}

impl std::error::Error for ModelError {}

impl From<InputError> for ModelError {
  fn from(e: InputError) -> Self {
    ModelError::InvalidInput(e)
  }
}

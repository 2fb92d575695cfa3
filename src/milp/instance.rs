use super::expr::*;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum VarKind {
  Binary,
  Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarInfo {
  pub name: String,
  pub kind: VarKind,
  pub lb: f64,
  pub ub: f64,
}

/// Handle to a constraint of one [`Instance`], by position.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Constr(pub(crate) usize);

impl Constr {
  pub fn index(&self) -> usize {
    self.0
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstrInfo {
  pub name: String,
  pub expr: IneqExpr,
}

/// Values for every variable of an instance, by variable index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment(Vec<f64>);

impl Assignment {
  pub fn new(values: Vec<f64>) -> Self {
    Assignment(values)
  }

  pub fn zeros(n: usize) -> Self {
    Assignment(vec![0.0; n])
  }

  #[inline(always)]
  pub fn value(&self, var: Var) -> f64 {
    self.0[var.0]
  }

  pub fn set(&mut self, var: Var, value: f64) {
    self.0[var.0] = value;
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn values(&self) -> &[f64] {
    &self.0
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
  Constr { name: String, lhs: f64, sense: Sense, rhs: f64 },
  Bound { name: String, value: f64, lb: f64, ub: f64 },
  Integrality { name: String, value: f64 },
}

impl Violation {
  pub fn name(&self) -> &str {
    match self {
      Violation::Constr { name, .. } | Violation::Bound { name, .. } | Violation::Integrality { name, .. } => name,
    }
  }
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Violation::Constr { name, lhs, sense, rhs } => write!(f, "{}: {} {} {}", name, lhs, sense, rhs),
      Violation::Bound { name, value, lb, ub } => write!(f, "{} = {} outside [{}, {}]", name, value, lb, ub),
      Violation::Integrality { name, value } => write!(f, "{} = {} is not binary", name, value),
    }
  }
}

/// A minimisation MILP: variables, linear constraints and a linear objective.
#[derive(Debug, Clone, Default)]
pub struct Instance {
  pub name: String,
  vars: Vec<VarInfo>,
  constrs: Vec<ConstrInfo>,
  objective: LinExpr,
}

impl Instance {
  pub fn new(name: impl Into<String>) -> Self {
    Instance { name: name.into(), ..Instance::default() }
  }

  pub fn add_binvar(&mut self, name: impl Into<String>) -> Var {
    self.add_var(VarInfo { name: name.into(), kind: VarKind::Binary, lb: 0.0, ub: 1.0 })
  }

  /// Continuous variable with bounds `lb..=ub`; either may be infinite.
  pub fn add_ctsvar(&mut self, name: impl Into<String>, lb: f64, ub: f64) -> Var {
    self.add_var(VarInfo { name: name.into(), kind: VarKind::Continuous, lb, ub })
  }

  fn add_var(&mut self, info: VarInfo) -> Var {
    self.vars.push(info);
    Var(self.vars.len() - 1)
  }

  pub fn add_constr(&mut self, name: impl Into<String>, expr: IneqExpr) -> Constr {
    self.constrs.push(ConstrInfo { name: name.into(), expr });
    Constr(self.constrs.len() - 1)
  }

  /// Replaces the objective.  Duplicate terms are merged.
  pub fn set_objective(&mut self, objective: LinExpr) {
    self.objective = objective.simplify();
  }

  pub fn objective(&self) -> &LinExpr {
    &self.objective
  }

  pub fn num_vars(&self) -> usize {
    self.vars.len()
  }

  pub fn num_constrs(&self) -> usize {
    self.constrs.len()
  }

  pub fn num_binvars(&self) -> usize {
    self.vars.iter().filter(|v| v.kind == VarKind::Binary).count()
  }

  pub fn var(&self, var: Var) -> &VarInfo {
    &self.vars[var.0]
  }

  pub fn vars(&self) -> impl Iterator<Item=(Var, &VarInfo)> + '_ {
    self.vars.iter().enumerate().map(|(i, v)| (Var(i), v))
  }

  pub fn constrs(&self) -> impl Iterator<Item=(Constr, &ConstrInfo)> + '_ {
    self.constrs.iter().enumerate().map(|(i, c)| (Constr(i), c))
  }

  pub fn var_by_name(&self, name: &str) -> Option<Var> {
    self.vars.iter().position(|v| v.name == name).map(Var)
  }

  /// Checks that the instance is well-formed: every referenced variable exists, every coefficient, bound
  /// and right-hand side is a number, and bounds are ordered.
  pub fn validate(&self) -> Result<(), ModelError> {
    let n = self.vars.len();
    if n == 0 {
      return Err(ModelError::MalformedInstance("instance has no variables".into()));
    }
    for v in &self.vars {
      if v.lb.is_nan() || v.ub.is_nan() || v.lb > v.ub || v.lb == f64::INFINITY || v.ub == f64::NEG_INFINITY {
        return Err(ModelError::MalformedInstance(format!("variable {} has bounds [{}, {}]", v.name, v.lb, v.ub)));
      }
    }

    let check_terms = |owner: &str, expr: &LinExpr| -> Result<(), ModelError> {
      for (var, coeff) in expr.terms() {
        if var.0 >= n {
          return Err(ModelError::MalformedInstance(format!("{} references unknown variable {}", owner, var.0)));
        }
        if !coeff.is_finite() {
          return Err(ModelError::MalformedInstance(format!(
            "{} has coefficient {} on {}", owner, coeff, self.vars[var.0].name
          )));
        }
      }
      Ok(())
    };

    check_terms("objective", &self.objective)?;
    if !self.objective.get_constant().is_finite() {
      return Err(ModelError::MalformedInstance("objective constant is not finite".into()));
    }
    for c in &self.constrs {
      check_terms(&c.name, &c.expr.lhs)?;
      if !c.expr.rhs.is_finite() {
        return Err(ModelError::MalformedInstance(format!("{} has right-hand side {}", c.name, c.expr.rhs)));
      }
    }
    Ok(())
  }

  /// Every bound, integrality and constraint violated by more than `tol` under `assignment`.
  pub fn violations(&self, assignment: &Assignment, tol: f64) -> Vec<Violation> {
    let values = assignment.values();
    let mut violations = Vec::new();
    for (v, x) in self.vars.iter().zip(values) {
      if *x < v.lb - tol || *x > v.ub + tol {
        violations.push(Violation::Bound { name: v.name.clone(), value: *x, lb: v.lb, ub: v.ub });
      } else if v.kind == VarKind::Binary && (x - x.round()).abs() > tol {
        violations.push(Violation::Integrality { name: v.name.clone(), value: *x });
      }
    }
    for c in &self.constrs {
      if c.expr.violation(values) > tol {
        violations.push(Violation::Constr {
          name: c.name.clone(),
          lhs: c.expr.lhs.eval(values),
          sense: c.expr.sense,
          rhs: c.expr.rhs,
        });
      }
    }
    violations
  }

  pub fn objective_value(&self, assignment: &Assignment) -> f64 {
    self.objective.eval(assignment.values())
  }
}

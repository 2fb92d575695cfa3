use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// Handle to a variable of one [`Instance`](super::Instance), by position.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Var(pub(crate) usize);

impl Var {
  #[inline(always)]
  pub fn index(&self) -> usize {
    self.0
  }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Sense {
  Le,
  Eq,
  Ge,
}

impl fmt::Display for Sense {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Sense::Le => "<=",
      Sense::Eq => "=",
      Sense::Ge => ">=",
    };
    f.write_str(s)
  }
}

/// Sparse linear expression `Σ coeff·var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
  terms: Vec<(Var, f64)>,
  constant: f64,
}

impl LinExpr {
  pub fn new() -> Self {
    LinExpr::default()
  }

  pub fn constant(c: f64) -> Self {
    LinExpr { terms: Vec::new(), constant: c }
  }

  pub fn add_term(&mut self, coeff: f64, var: Var) -> &mut Self {
    self.terms.push((var, coeff));
    self
  }

  pub fn get_constant(&self) -> f64 {
    self.constant
  }

  pub fn len(&self) -> usize {
    self.terms.len()
  }

  pub fn is_empty(&self) -> bool {
    self.terms.is_empty()
  }

  /// Terms in insertion order.  Not merged unless [`LinExpr::simplify`] has been called.
  pub fn terms(&self) -> &[(Var, f64)] {
    &self.terms
  }

  /// Sorts terms by variable, merges duplicates and drops zero coefficients.
  pub fn simplify(mut self) -> Self {
    self.terms.sort_unstable_by_key(|(v, _)| *v);
    let mut merged: Vec<(Var, f64)> = Vec::with_capacity(self.terms.len());
    for (var, coeff) in self.terms {
      match merged.last_mut() {
        Some((last, c)) if *last == var => *c += coeff,
        _ => merged.push((var, coeff)),
      }
    }
    merged.retain(|(_, c)| *c != 0.0);
    self.terms = merged;
    self
  }

  /// Evaluates the expression, given a lookup from variable index to value.
  pub fn eval(&self, values: &[f64]) -> f64 {
    self.terms.iter().map(|(v, c)| c * values[v.0]).sum::<f64>() + self.constant
  }

  pub fn leq(self, rhs: impl Into<LinExpr>) -> IneqExpr {
    IneqExpr::new(self, Sense::Le, rhs.into())
  }

  pub fn equals(self, rhs: impl Into<LinExpr>) -> IneqExpr {
    IneqExpr::new(self, Sense::Eq, rhs.into())
  }

  pub fn geq(self, rhs: impl Into<LinExpr>) -> IneqExpr {
    IneqExpr::new(self, Sense::Ge, rhs.into())
  }
}

impl From<Var> for LinExpr {
  fn from(v: Var) -> Self {
    LinExpr { terms: vec![(v, 1.0)], constant: 0.0 }
  }
}

impl From<f64> for LinExpr {
  fn from(c: f64) -> Self {
    LinExpr::constant(c)
  }
}

impl AddAssign<LinExpr> for LinExpr {
  fn add_assign(&mut self, rhs: LinExpr) {
    self.terms.extend(rhs.terms);
    self.constant += rhs.constant;
  }
}

impl AddAssign<Var> for LinExpr {
  fn add_assign(&mut self, rhs: Var) {
    self.terms.push((rhs, 1.0));
  }
}

impl AddAssign<(f64, Var)> for LinExpr {
  fn add_assign(&mut self, (coeff, var): (f64, Var)) {
    self.terms.push((var, coeff));
  }
}

impl AddAssign<f64> for LinExpr {
  fn add_assign(&mut self, rhs: f64) {
    self.constant += rhs;
  }
}

impl SubAssign<LinExpr> for LinExpr {
  fn sub_assign(&mut self, rhs: LinExpr) {
    self.terms.extend(rhs.terms.into_iter().map(|(v, c)| (v, -c)));
    self.constant -= rhs.constant;
  }
}

impl<T> Add<T> for LinExpr where LinExpr: AddAssign<T> {
  type Output = LinExpr;
  fn add(mut self, rhs: T) -> LinExpr {
    self += rhs;
    self
  }
}

impl Sub<LinExpr> for LinExpr {
  type Output = LinExpr;
  fn sub(mut self, rhs: LinExpr) -> LinExpr {
    self -= rhs;
    self
  }
}

impl Sub<Var> for LinExpr {
  type Output = LinExpr;
  fn sub(mut self, rhs: Var) -> LinExpr {
    self.terms.push((rhs, -1.0));
    self
  }
}

impl Add<Var> for Var {
  type Output = LinExpr;
  fn add(self, rhs: Var) -> LinExpr {
    LinExpr { terms: vec![(self, 1.0), (rhs, 1.0)], constant: 0.0 }
  }
}

impl Add<f64> for Var {
  type Output = LinExpr;
  fn add(self, rhs: f64) -> LinExpr {
    LinExpr { terms: vec![(self, 1.0)], constant: rhs }
  }
}

impl Add<LinExpr> for Var {
  type Output = LinExpr;
  fn add(self, rhs: LinExpr) -> LinExpr {
    rhs + self
  }
}

impl Sub<Var> for Var {
  type Output = LinExpr;
  fn sub(self, rhs: Var) -> LinExpr {
    LinExpr { terms: vec![(self, 1.0), (rhs, -1.0)], constant: 0.0 }
  }
}

impl Sub<LinExpr> for Var {
  type Output = LinExpr;
  fn sub(self, rhs: LinExpr) -> LinExpr {
    let mut e = LinExpr::from(self);
    e -= rhs;
    e
  }
}

impl Mul<f64> for Var {
  type Output = LinExpr;
  fn mul(self, rhs: f64) -> LinExpr {
    LinExpr { terms: vec![(self, rhs)], constant: 0.0 }
  }
}

impl Mul<Var> for f64 {
  type Output = LinExpr;
  fn mul(self, rhs: Var) -> LinExpr {
    rhs * self
  }
}

impl Sum<Var> for LinExpr {
  fn sum<I: Iterator<Item=Var>>(iter: I) -> Self {
    LinExpr { terms: iter.map(|v| (v, 1.0)).collect(), constant: 0.0 }
  }
}

impl Sum<LinExpr> for LinExpr {
  fn sum<I: Iterator<Item=LinExpr>>(iter: I) -> Self {
    let mut total = LinExpr::new();
    for e in iter {
      total += e;
    }
    total
  }
}

impl Sum<(f64, Var)> for LinExpr {
  fn sum<I: Iterator<Item=(f64, Var)>>(iter: I) -> Self {
    LinExpr { terms: iter.map(|(c, v)| (v, c)).collect(), constant: 0.0 }
  }
}

/// A linear constraint `lhs <sense> rhs` with every variable moved to the left and every constant to the right.
#[derive(Debug, Clone, PartialEq)]
pub struct IneqExpr {
  pub lhs: LinExpr,
  pub sense: Sense,
  pub rhs: f64,
}

impl IneqExpr {
  pub fn new(lhs: LinExpr, sense: Sense, rhs: LinExpr) -> Self {
    let mut lhs = (lhs - rhs).simplify();
    let rhs = -lhs.constant;
    lhs.constant = 0.0;
    IneqExpr { lhs, sense, rhs }
  }

  /// Signed amount by which `values` violate the constraint; zero or less means satisfied.
  pub fn violation(&self, values: &[f64]) -> f64 {
    let lhs = self.lhs.eval(values);
    match self.sense {
      Sense::Le => lhs - self.rhs,
      Sense::Ge => self.rhs - lhs,
      Sense::Eq => (lhs - self.rhs).abs(),
    }
  }
}

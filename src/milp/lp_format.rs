//! CPLEX-LP text output.
use super::*;
use crate::utils::fmt_num;
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use std::io::{self, Write};

const MAX_LINE: usize = 200;

lazy_static! {
  static ref INVALID_NAME_CHAR: Regex = Regex::new(r##"[^A-Za-z0-9!"#$%&()/,.;?@_`'{}|~]"##).unwrap();
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LpNames {
  /// `x1, x2, ...` and `c1, c2, ...`; column `k` is variable `k - 1`
  Indexed,
  /// The instance's own names, made LP-safe
  Descriptive,
}

pub fn sanitize_name(name: &str) -> String {
  let name = name.replace('[', "(").replace(']', ")");
  let mut name = INVALID_NAME_CHAR.replace_all(&name, "_").into_owned();
  if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E') {
    name.insert(0, '_');
  }
  name
}

struct LineWriter<'a, W> {
  out: &'a mut W,
  width: usize,
}

impl<'a, W: Write> LineWriter<'a, W> {
  fn new(out: &'a mut W) -> Self {
    LineWriter { out, width: 0 }
  }

  fn token(&mut self, s: &str) -> io::Result<()> {
    if self.width > 0 && self.width + s.len() + 1 > MAX_LINE {
      writeln!(self.out)?;
      self.width = 0;
    }
    write!(self.out, " {}", s)?;
    self.width += s.len() + 1;
    Ok(())
  }

  fn end_line(&mut self) -> io::Result<()> {
    writeln!(self.out)?;
    self.width = 0;
    Ok(())
  }
}

fn term(coeff: f64, name: &str) -> String {
  if coeff < 0.0 {
    format!("- {} {}", fmt_num(-coeff), name)
  } else {
    format!("+ {} {}", fmt_num(coeff), name)
  }
}

fn fmt_bound(x: f64) -> Cow<'static, str> {
  if x == f64::INFINITY {
    "+inf".into()
  } else if x == f64::NEG_INFINITY {
    "-inf".into()
  } else {
    fmt_num(x).to_string().into()
  }
}

/// Writes `instance` in CPLEX-LP format.  Every variable appears in the objective, in index order, so that
/// solvers number columns the same way as the instance.  The objective constant is not written.
pub fn write_lp(instance: &Instance, names: LpNames, out: &mut impl Write) -> io::Result<()> {
  let var_names: Vec<String> = match names {
    LpNames::Indexed => (1..=instance.num_vars()).map(|k| format!("x{}", k)).collect(),
    LpNames::Descriptive => instance.vars().map(|(_, v)| sanitize_name(&v.name)).collect(),
  };

  writeln!(out, "\\* {} *\\", instance.name)?;
  writeln!(out, "Minimize")?;
  let mut obj = vec![0.0; instance.num_vars()];
  for &(v, c) in instance.objective().terms() {
    obj[v.index()] += c;
  }
  let mut line = LineWriter::new(out);
  line.token("obj:")?;
  for (c, name) in obj.iter().zip(&var_names) {
    line.token(&term(*c, name))?;
  }
  line.end_line()?;

  writeln!(line.out, "Subject To")?;
  for (k, c) in instance.constrs() {
    let name = match names {
      LpNames::Indexed => format!("c{}:", k.index() + 1),
      LpNames::Descriptive => format!("{}:", sanitize_name(&c.name)),
    };
    line.token(&name)?;
    if c.expr.lhs.is_empty() {
      line.token(&term(0.0, &var_names[0]))?;
    }
    for &(v, coeff) in c.expr.lhs.terms() {
      line.token(&term(coeff, &var_names[v.index()]))?;
    }
    line.token(&format!("{} {}", c.expr.sense, fmt_num(c.expr.rhs)))?;
    line.end_line()?;
  }

  writeln!(line.out, "Bounds")?;
  for ((_, v), name) in instance.vars().zip(&var_names) {
    if v.kind == VarKind::Binary || (v.lb == 0.0 && v.ub == f64::INFINITY) {
      continue;
    }
    if v.lb == f64::NEG_INFINITY && v.ub == f64::INFINITY {
      writeln!(line.out, " {} free", name)?;
    } else {
      writeln!(line.out, " {} <= {} <= {}", fmt_bound(v.lb), name, fmt_bound(v.ub))?;
    }
  }

  writeln!(line.out, "Binaries")?;
  for ((_, v), name) in instance.vars().zip(&var_names) {
    if v.kind == VarKind::Binary {
      line.token(name)?;
    }
  }
  line.end_line()?;
  writeln!(line.out, "End")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write(instance: &Instance, names: LpNames) -> String {
    let mut buf = Vec::new();
    write_lp(instance, names, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
  }

  #[test]
  fn output_shape() {
    let mut inst = Instance::new("tiny");
    let x = inst.add_binvar("y[NBodega1,NCliente1,Truck,1]");
    let u = inst.add_ctsvar("u[NCliente1,Truck,1]", 0.0, 3.0);
    let z = inst.add_ctsvar("km", 0.0, f64::INFINITY);
    inst.add_constr("link", (LinExpr::from(u) - x * 2.0).geq(-1.0));
    inst.add_constr("empty", LinExpr::new().leq(0.0));
    inst.set_objective(LinExpr::from(x) + 7.0);
    let _ = z;

    let lp = write(&inst, LpNames::Indexed);
    let expected = "\\* tiny *\\\nMinimize\n obj: + 1 x1 + 0 x2 + 0 x3\nSubject To\n c1: - 2 x1 + 1 x2 >= -1\n c2: + 0 x1 <= 0\nBounds\n 0 <= x2 <= 3\nBinaries\n x1\nEnd\n";
    assert_eq!(lp, expected);

    let lp = write(&inst, LpNames::Descriptive);
    assert!(lp.contains("y(NBodega1,NCliente1,Truck,1)"));
    assert!(lp.contains(" link:"));
  }

  #[test]
  fn long_rows_wrap() {
    let mut inst = Instance::new("wide");
    let vars: Vec<_> = (0..100).map(|i| inst.add_binvar(format!("v{}", i))).collect();
    inst.add_constr("sum", vars.iter().copied().sum::<LinExpr>().leq(1.0));
    let lp = write(&inst, LpNames::Indexed);
    assert!(lp.lines().all(|l| l.len() <= MAX_LINE));
    assert!(lp.lines().count() > 10);
  }

  #[test]
  fn names() {
    assert_eq!(sanitize_name("a b[1]"), "a_b(1)");
    assert_eq!(sanitize_name("3x"), "_3x");
    assert_eq!(sanitize_name("e1"), "_e1");
  }
}

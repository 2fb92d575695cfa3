//! GLPK backend: runs `glpsol` on a CPLEX-LP file and reads back its raw solution file.
use super::*;
use crate::milp::{write_lp, LpNames};
use std::io::{BufWriter, Write};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SolutionKind {
  Mip,
  Basic,
}

/// Contents of a `glpsol -w` file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawSolution {
  kind: SolutionKind,
  /// `o`, `f`, `n`, `u` for MIP, primal status (`f`, `i`, `n`, `u`) for basic solutions
  status: char,
  dual_status: Option<char>,
  objective: f64,
  values: Vec<f64>,
}

fn parse_err(line: usize, msg: impl std::fmt::Display) -> ModelError {
  ModelError::Solver(format!("GLPK solution line {}: {}", line, msg))
}

fn field<T: std::str::FromStr>(tok: Option<&str>, line: usize, what: &str) -> Result<T, ModelError> {
  tok.and_then(|s| s.parse().ok()).ok_or_else(|| parse_err(line, format!("missing or invalid {}", what)))
}

pub(crate) fn parse_solution(text: &str, n_cols: usize) -> Result<RawSolution, ModelError> {
  let mut header = None;
  let mut values = vec![0.0; n_cols];

  for (k, line) in text.lines().enumerate() {
    let lineno = k + 1;
    let mut tok = line.split_whitespace();
    match tok.next() {
      Some("s") => {
        let kind = match tok.next() {
          Some("mip") => SolutionKind::Mip,
          Some("bas") => SolutionKind::Basic,
          other => return Err(parse_err(lineno, format!("unsupported solution type {:?}", other))),
        };
        let _rows: usize = field(tok.next(), lineno, "row count")?;
        let cols: usize = field(tok.next(), lineno, "column count")?;
        if cols != n_cols {
          return Err(parse_err(lineno, format!("expected {} columns, found {}", n_cols, cols)));
        }
        let status: char = field(tok.next(), lineno, "status")?;
        let dual_status = match kind {
          SolutionKind::Basic => Some(field(tok.next(), lineno, "dual status")?),
          SolutionKind::Mip => None,
        };
        let objective: f64 = field(tok.next(), lineno, "objective")?;
        header = Some((kind, status, dual_status, objective));
      }
      Some("j") => {
        let kind = header.map(|h| h.0).ok_or_else(|| parse_err(lineno, "column before solution header"))?;
        let col: usize = field(tok.next(), lineno, "column index")?;
        if col == 0 || col > n_cols {
          return Err(parse_err(lineno, format!("column {} out of range", col)));
        }
        if kind == SolutionKind::Basic {
          // basis status precedes the primal value
          tok.next();
        }
        values[col - 1] = field(tok.next(), lineno, "column value")?;
      }
      _ => {}
    }
  }

  let (kind, status, dual_status, objective) = header.ok_or_else(|| parse_err(0, "no solution header"))?;
  Ok(RawSolution { kind, status, dual_status, objective, values })
}

#[derive(Debug, Default, Copy, Clone)]
struct LogFlags {
  timed_out: bool,
  infeasible: bool,
}

impl LogFlags {
  fn from_output(stdout: &str) -> Self {
    LogFlags {
      timed_out: stdout.contains("TIME LIMIT EXCEEDED"),
      infeasible: stdout.contains("NO PRIMAL FEASIBLE") || stdout.contains("NO INTEGER FEASIBLE"),
    }
  }
}

/// Termination, and whether `sol` carries usable values.
fn termination(sol: &RawSolution, flags: LogFlags) -> (Termination, bool) {
  if flags.infeasible {
    return (Termination::Infeasible, false);
  }
  let feasible = match sol.kind {
    SolutionKind::Mip => matches!(sol.status, 'o' | 'f'),
    SolutionKind::Basic => sol.status == 'f',
  };
  let proven_optimal = match sol.kind {
    SolutionKind::Mip => sol.status == 'o',
    SolutionKind::Basic => sol.status == 'f' && sol.dual_status == Some('f'),
  };

  let t = if proven_optimal && !flags.timed_out {
    Termination::Optimal
  } else if flags.timed_out {
    Termination::TimedOut
  } else if feasible {
    Termination::Feasible
  } else if matches!(sol.status, 'n' | 'i') {
    Termination::Infeasible
  } else {
    Termination::Error
  };
  (t, feasible)
}

fn tail(s: &str, n: usize) -> String {
  let lines: Vec<_> = s.lines().collect();
  lines[lines.len().saturating_sub(n)..].join("\n")
}

pub struct Glpk {
  glpsol: String,
  mip_gap: Option<f64>,
}

impl Glpk {
  pub fn new(config: &SolverConfig) -> Self {
    Glpk { glpsol: config.glpsol.clone(), mip_gap: config.mip_gap }
  }
}

impl MilpSolver for Glpk {
  fn name(&self) -> &'static str {
    "glpk"
  }

  #[tracing::instrument(level = "info", skip_all, fields(instance = %instance.name))]
  fn solve(&self, instance: &Instance, time_limit: Duration) -> Result<SolveOutcome, ModelError> {
    check_inputs(instance, time_limit)?;
    let io_err = |e: std::io::Error| ModelError::Solver(format!("GLPK working files: {}", e));

    let dir = tempfile::tempdir().map_err(io_err)?;
    let lp_path = dir.path().join("model.lp");
    let sol_path = dir.path().join("sol.txt");
    {
      let mut out = BufWriter::new(std::fs::File::create(&lp_path).map_err(io_err)?);
      write_lp(instance, LpNames::Indexed, &mut out).map_err(io_err)?;
      out.flush().map_err(io_err)?;
    }

    // glpsol takes whole seconds
    let secs = time_limit.as_secs_f64().ceil().max(1.0) as u64;
    let mut cmd = Command::new(&self.glpsol);
    cmd.arg("--lp").arg(&lp_path)
      .arg("--tmlim").arg(secs.to_string())
      .arg("-w").arg(&sol_path);
    if let Some(gap) = self.mip_gap {
      cmd.arg("--mipgap").arg(gap.to_string());
    }
    debug!(?cmd);

    let start = Instant::now();
    let output = cmd.output()
      .map_err(|e| ModelError::Solver(format!("unable to run `{}`: {}", self.glpsol, e)))?;
    let runtime = start.elapsed();
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
      trace!(glpsol = line);
    }

    let flags = LogFlags::from_output(&stdout);
    if !output.status.success() {
      let log = tail(&stdout, 5) + &String::from_utf8_lossy(&output.stderr);
      if stdout.contains("processing error") {
        return Err(ModelError::MalformedInstance(log));
      }
      let mut outcome = SolveOutcome::new(Termination::Error, runtime);
      outcome.message = Some(log);
      return Ok(outcome);
    }

    let text = match std::fs::read_to_string(&sol_path) {
      Ok(t) => t,
      Err(e) => {
        warn!(error=%e, "glpsol wrote no solution file");
        let t = if flags.infeasible {
          Termination::Infeasible
        } else if flags.timed_out {
          Termination::TimedOut
        } else {
          Termination::Error
        };
        let mut outcome = SolveOutcome::new(t, runtime);
        outcome.message = Some(tail(&stdout, 5));
        return Ok(outcome);
      }
    };

    let sol = parse_solution(&text, instance.num_vars())?;
    let (termination, usable) = termination(&sol, flags);
    info!(?termination, glpk_obj = sol.objective, secs = runtime.as_secs_f64(), "glpsol finished");
    let mut outcome = SolveOutcome::new(termination, runtime);
    if usable {
      outcome = outcome.with_assignment(instance, Assignment::new(sol.values));
    }
    if termination == Termination::Error {
      outcome.message = Some(tail(&stdout, 5));
    }
    Ok(outcome)
  }
}

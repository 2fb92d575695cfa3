use super::*;
use crate::milp::{Sense, VarKind};
use grb::expr::LinExpr as GrbExpr;
use grb::{attr, c, param, Env, Model, Status, VarType};
use std::time::Instant;
use tracing::{error, info};

fn grb_err(e: grb::Error) -> ModelError {
  ModelError::Solver(format!("Gurobi: {}", e))
}

pub struct Gurobi {
  mip_gap: Option<f64>,
}

impl Gurobi {
  pub fn new(config: &SolverConfig) -> Self {
    Gurobi { mip_gap: config.mip_gap }
  }

  fn build(&self, instance: &Instance, time_limit: Duration) -> grb::Result<(Model, Vec<grb::Var>)> {
    let mut env = Env::empty()?;
    env.set(param::OutputFlag, 0)?;
    let env = env.start()?;
    let mut model = Model::with_env(&instance.name, &env)?;
    model.set_param(param::TimeLimit, time_limit.as_secs_f64())?;
    if let Some(gap) = self.mip_gap {
      model.set_param(param::MIPGap, gap)?;
    }

    let mut obj = vec![0.0; instance.num_vars()];
    for &(var, coeff) in instance.objective().terms() {
      obj[var.index()] = coeff;
    }

    let mut vars = Vec::with_capacity(instance.num_vars());
    for (var, info) in instance.vars() {
      let vtype = match info.kind {
        VarKind::Binary => VarType::Binary,
        VarKind::Continuous => VarType::Continuous,
      };
      let ub = if info.ub.is_finite() { info.ub } else { grb::INFINITY };
      vars.push(model.add_var(&info.name, vtype, obj[var.index()], info.lb, ub, std::iter::empty())?);
    }

    for (_, info) in instance.constrs() {
      let mut lhs = GrbExpr::new();
      for &(var, coeff) in info.expr.lhs.terms() {
        lhs.add_term(coeff, vars[var.index()]);
      }
      let rhs = info.expr.rhs;
      let ineq = match info.expr.sense {
        Sense::Le => c!(lhs <= rhs),
        Sense::Eq => c!(lhs == rhs),
        Sense::Ge => c!(lhs >= rhs),
      };
      model.add_constr(&info.name, ineq)?;
    }
    model.update()?;
    Ok((model, vars))
  }
}

impl MilpSolver for Gurobi {
  fn name(&self) -> &'static str {
    "gurobi"
  }

  #[tracing::instrument(level = "info", skip_all, fields(instance = %instance.name))]
  fn solve(&self, instance: &Instance, time_limit: Duration) -> Result<SolveOutcome, ModelError> {
    check_inputs(instance, time_limit)?;
    let (mut model, vars) = self.build(instance, time_limit).map_err(grb_err)?;

    let start = Instant::now();
    model.optimize().map_err(grb_err)?;
    let runtime = start.elapsed();

    let status = model.status().map_err(grb_err)?;
    let n_sols = model.get_attr(attr::SolCount).map_err(grb_err)?;
    info!(?status, n_sols, secs = runtime.as_secs_f64(), "gurobi finished");

    let termination = match status {
      Status::Optimal => Termination::Optimal,
      Status::Infeasible | Status::InfOrUnbd => Termination::Infeasible,
      Status::TimeLimit => Termination::TimedOut,
      Status::SubOptimal | Status::SolutionLimit | Status::NodeLimit if n_sols > 0 => Termination::Feasible,
      other => {
        error!(status=?other, "unexpected Gurobi status");
        let mut outcome = SolveOutcome::new(Termination::Error, runtime);
        outcome.message = Some(format!("Gurobi status {:?}", other));
        return Ok(outcome);
      }
    };

    let mut outcome = SolveOutcome::new(termination, runtime);
    if n_sols > 0 && termination != Termination::Infeasible {
      let values = model.get_obj_attr_batch(attr::X, vars).map_err(grb_err)?;
      outcome = outcome.with_assignment(instance, Assignment::new(values));
    }
    Ok(outcome)
  }
}

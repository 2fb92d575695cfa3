//! One build-and-solve invocation: catalog, distances, model, solve and route extraction.
use crate::catalog::{Catalog, RawData};
use crate::distance::network::{MatrixService, Osrm};
use crate::distance::TravelMatrices;
use crate::entities::Metric;
use crate::error::ModelError;
use crate::experiment::{ModelSize, ScenarioReport, SolverInfo, Stopwatch};
use crate::milp::{write_lp, LpNames};
use crate::model::ModelBuilder;
use crate::solution::{ArcSelection, RouteSet};
use crate::solver::{self, MilpSolver, Termination};
use crate::utils::IoContext;
use crate::Result;
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};

mod config;
pub use config::ScenarioConfig;

pub enum Source<'a> {
  Dir(&'a Path),
  Raw(RawData),
}

/// Result of a run.  The report is always present, even when an earlier phase failed.
pub struct ScenarioRun {
  pub name: String,
  pub report: ScenarioReport,
  pub catalog: Option<Catalog>,
  pub routes: Option<RouteSet>,
}

impl ScenarioRun {
  /// 0 on success, 2 when infeasible, 3 on a timeout without incumbent, 1 on any other failure.
  pub fn exit_code(&self) -> i32 {
    match self.report.termination() {
      Some(Termination::Infeasible) => 2,
      Some(Termination::TimedOut) if self.routes.is_none() => 3,
      Some(Termination::Error) => 1,
      _ if self.report.error.is_some() => 1,
      _ => 0,
    }
  }

  pub fn routes_path(&self, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}-routes.csv", self.name))
  }

  pub fn report_path(&self, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}-report.json", self.name))
  }

  pub fn write_outputs(&self, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir).write_context(out_dir)?;
    if let (Some(catalog), Some(routes)) = (&self.catalog, &self.routes) {
      routes.write_csv(catalog, self.routes_path(out_dir))?;
    }
    let path = self.report_path(out_dir);
    crate::utils::write_json(&self.report, &path)?;
    info!(path=%path.display(), "report written");
    Ok(())
  }
}

pub struct Pipeline<'a> {
  config: &'a ScenarioConfig,
  service: Option<&'a dyn MatrixService>,
  solver: Option<&'a dyn MilpSolver>,
  model_file: Option<&'a Path>,
}

#[derive(Default)]
struct Partial {
  catalog: Option<Catalog>,
  routes: Option<RouteSet>,
}

impl<'a> Pipeline<'a> {
  pub fn new(config: &'a ScenarioConfig) -> Self {
    Pipeline { config, service: None, solver: None, model_file: None }
  }

  /// Replaces the network service built from the configuration.
  pub fn with_service(mut self, service: &'a dyn MatrixService) -> Self {
    self.service = Some(service);
    self
  }

  /// Replaces the solver built from the configuration.
  pub fn with_solver(mut self, solver: &'a dyn MilpSolver) -> Self {
    self.solver = Some(solver);
    self
  }

  /// Also writes the model as a CPLEX-LP file with descriptive names.
  pub fn with_model_file(mut self, path: &'a Path) -> Self {
    self.model_file = Some(path);
    self
  }

  pub fn run(&self, source: Source) -> ScenarioRun {
    let name = match &source {
      Source::Dir(dir) => self.config.scenario_name(Some(dir)),
      Source::Raw(_) => self.config.scenario_name(None),
    };
    let _span = info_span!("scenario", %name).entered();
    let mut report = ScenarioReport::new(&name);
    let mut stopwatch = Stopwatch::new();
    let mut partial = Partial::default();

    if let Err(e) = self.execute(source, &name, &mut report, &mut stopwatch, &mut partial) {
      let phase = stopwatch.current_phase().unwrap_or("setup");
      error!(phase, "{:#}", e);
      report.error = Some(format!("{}: {:#}", phase, e));
    }
    report.time = stopwatch.into_laps();
    ScenarioRun { name, report, catalog: partial.catalog, routes: partial.routes }
  }

  fn execute(&self, source: Source, name: &str, report: &mut ScenarioReport, sw: &mut Stopwatch, partial: &mut Partial) -> Result<()> {
    let time_limit = self.config.time_limit()?;

    sw.start("catalog");
    let raw = match source {
      Source::Dir(dir) => crate::dataset::load_dir(dir, &self.config.catalog.products)?,
      Source::Raw(raw) => raw,
    };
    let catalog = &*partial.catalog.insert(Catalog::build(&raw, &self.config.catalog)?);
    info!(
      depots = catalog.depots().len(),
      clients = catalog.clients().len(),
      recharge = catalog.recharge_nodes().len(),
      vehicles = catalog.vehicles().len(),
      "catalog ready"
    );

    sw.lap("distance");
    let needs_network = catalog.vehicles().any(|v| catalog.vehicle(v).metric == Metric::Network);
    let osrm;
    let service = match self.service {
      Some(s) => Some(s),
      None if needs_network => {
        osrm = Osrm::new(self.config.distance.network.clone())?;
        Some(&osrm as &dyn MatrixService)
      }
      None => None,
    };
    let travel = TravelMatrices::build(catalog, &self.config.distance, service)?;

    sw.lap("build");
    let model = ModelBuilder::new(catalog, &travel, &self.config.model).build(name)?;
    report.size = Some(ModelSize::from_instance(&model.instance));
    if let Some(path) = self.model_file {
      let file = std::fs::File::create(path).write_context(path)?;
      let mut out = std::io::BufWriter::new(file);
      write_lp(&model.instance, LpNames::Descriptive, &mut out).write_context(path)?;
      out.flush().write_context(path)?;
      info!(path=%path.display(), "model written");
    }

    sw.lap("solve");
    let owned_solver;
    let solver = match self.solver {
      Some(s) => s,
      None => {
        owned_solver = solver::create(&self.config.solver)?;
        owned_solver.as_ref()
      }
    };
    let outcome = solver.solve(&model.instance, time_limit)
      .with_context(|| format!("{} failed", solver.name()))?;
    report.solver = Some(SolverInfo::new(solver.name(), &outcome));
    info!(termination=?outcome.termination, objective=?outcome.objective, "solve finished");

    sw.lap("extract");
    match outcome.values() {
      Some(values) => {
        let selection = ArcSelection::from_assignment(&model, values);
        let routes = selection.routes(catalog);
        report.solution = Some(routes.summary(catalog, &travel, outcome.objective)?);
        partial.routes = Some(routes);
      }
      None => match outcome.termination {
        Termination::Infeasible => warn!("{}", ModelError::Infeasible),
        Termination::TimedOut => warn!("{}", ModelError::SolverTimeout { has_incumbent: false }),
        _ => warn!(message=?outcome.message, "solver returned no solution"),
      },
    }
    sw.stop();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::milp::{Assignment, Instance};
  use crate::solution::RouteKind;
  use crate::solver::SolveOutcome;
  use crate::test::*;
  use std::time::Duration;

  /// Returns a fixed set of active variables, by name.
  struct Scripted {
    termination: Termination,
    active: Vec<(&'static str, f64)>,
  }

  impl MilpSolver for Scripted {
    fn name(&self) -> &'static str {
      "scripted"
    }

    fn solve(&self, instance: &Instance, _: Duration) -> std::result::Result<SolveOutcome, ModelError> {
      let mut a = Assignment::zeros(instance.num_vars());
      for &(name, value) in &self.active {
        let var = instance.var_by_name(name).ok_or_else(|| ModelError::Solver(format!("no variable {}", name)))?;
        a.set(var, value);
      }
      let outcome = SolveOutcome::new(self.termination, Duration::from_millis(5));
      Ok(match self.termination {
        Termination::Infeasible => outcome,
        _ => outcome.with_assignment(instance, a),
      })
    }
  }

  fn tour_solver() -> Scripted {
    Scripted {
      termination: Termination::Optimal,
      active: vec![
        ("y[NBodega1,NCliente1,Truck,1]", 1.0),
        ("y[NCliente1,NCliente2,Truck,1]", 1.0),
        ("y[NCliente2,NBodega1,Truck,1]", 1.0),
        ("u[NCliente2,Truck,1]", 1.0),
      ],
    }
  }

  #[test]
  fn single_tour_run() {
    crate::logging::init_test_logging();
    let config = ScenarioConfig { name: Some("line".into()), ..ScenarioConfig::default() };
    let solver = tour_solver();
    let run = Pipeline::new(&config)
      .with_solver(&solver)
      .run(Source::Raw(raw_data(&[(0., 0.)], &[(1., 0.), (2., 0.)], 10.0)));

    assert_eq!(run.report.error, None);
    assert_eq!(run.exit_code(), 0);
    let routes = run.routes.as_ref().unwrap();
    assert_eq!(routes.routes.len(), 1);
    assert_eq!(routes.routes[0].kind, RouteKind::Tour);
    let summary = run.report.solution.as_ref().unwrap();
    assert_eq!(summary.objective, Some(4.0));
    let phases: Vec<_> = run.report.time.iter().map(|l| l.phase.as_str()).collect();
    assert_eq!(phases, vec!["catalog", "distance", "build", "solve", "extract"]);

    let dir = tempfile::tempdir().unwrap();
    run.write_outputs(dir.path()).unwrap();
    let csv = std::fs::read_to_string(dir.path().join("line-routes.csv")).unwrap();
    assert_eq!(csv.lines().count(), 4);
    let report: serde_json::Value = crate::utils::read_json(dir.path().join("line-report.json")).unwrap();
    assert_eq!(report["solver"]["termination"], "Optimal");
    assert_eq!(report["size"]["num_binvars"], 6);
  }

  #[test]
  fn injected_network_service_prices_the_tour() {
    use crate::distance::network::{FixedTable, NetworkTable};
    use crate::distance::DistanceMatrix;
    let mut config = ScenarioConfig::default();
    config.catalog.default_metric = Metric::Network;
    let km = DistanceMatrix::from_data(3, vec![0., 10., 20., 11., 0., 5., 21., 6., 0.]).unwrap();
    let min = DistanceMatrix::from_data(3, vec![0., 1., 2., 1., 0., 3., 2., 3., 0.]).unwrap();
    let service = FixedTable(NetworkTable { distances_km: km, durations_min: min });
    let solver = tour_solver();
    let run = Pipeline::new(&config)
      .with_service(&service)
      .with_solver(&solver)
      .run(Source::Raw(raw_data(&[(0., 0.)], &[(1., 0.), (2., 0.)], 10.0)));

    assert_eq!(run.report.error, None);
    let summary = run.report.solution.as_ref().unwrap();
    assert_eq!(summary.objective, Some(36.0));
  }

  #[test]
  fn infeasible_run_still_reports() {
    let config = ScenarioConfig::default();
    let solver = Scripted { termination: Termination::Infeasible, active: vec![] };
    let run = Pipeline::new(&config)
      .with_solver(&solver)
      .run(Source::Raw(raw_data(&[(0., 0.)], &[(1., 0.)], 0.5)));
    assert_eq!(run.exit_code(), 2);
    assert!(run.routes.is_none());
    assert_eq!(run.report.termination(), Some(Termination::Infeasible));
    assert_eq!(run.report.error, None);
  }

  #[test]
  fn catalog_errors_abort_before_solving() {
    let config = ScenarioConfig::default();
    let solver = tour_solver();
    let run = Pipeline::new(&config)
      .with_solver(&solver)
      .run(Source::Raw(raw_data(&[(0., 0.)], &[], 10.0)));
    assert_eq!(run.exit_code(), 1);
    assert!(run.report.solver.is_none());
    assert!(run.report.error.as_ref().unwrap().starts_with("catalog:"));
  }

  #[test]
  fn catalog_is_kept_when_solving_fails() {
    let config = ScenarioConfig::default();
    let solver = Scripted { termination: Termination::Optimal, active: vec![("y[NBodega1,NCliente9,Truck,1]", 1.0)] };
    let run = Pipeline::new(&config)
      .with_solver(&solver)
      .run(Source::Raw(raw_data(&[(0., 0.)], &[(1., 0.)], 10.0)));
    assert_eq!(run.exit_code(), 1);
    assert!(run.report.error.as_ref().unwrap().starts_with("solve:"));
    assert_eq!(run.catalog.as_ref().unwrap().clients().len(), 1);
    assert!(run.routes.is_none());
  }

  #[test]
  fn model_file_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("line.lp");
    let config = ScenarioConfig::default();
    let solver = tour_solver();
    let run = Pipeline::new(&config)
      .with_solver(&solver)
      .with_model_file(&path)
      .run(Source::Raw(raw_data(&[(0., 0.)], &[(1., 0.), (2., 0.)], 10.0)));
    assert_eq!(run.exit_code(), 0);
    let lp = std::fs::read_to_string(&path).unwrap();
    assert!(lp.contains("y(NBodega1,NCliente1,Truck,1)"));
  }

  #[test]
  fn loads_scenario_directory() {
    let config = ScenarioConfig::default();
    let solver = Scripted { termination: Termination::Infeasible, active: vec![] };
    let run = Pipeline::new(&config)
      .with_solver(&solver)
      .run(Source::Dir(&test_data_dir().join("small")));
    assert_eq!(run.name, "small");
    assert_eq!(run.report.error, None);
    assert_eq!(run.catalog.as_ref().unwrap().clients().len(), 3);
  }

  #[cfg(feature = "solver-tests")]
  mod glpk {
    use super::*;
    use crate::model::ModelOptions;
    use crate::solver::glpk::Glpk;
    use crate::solver::SolverConfig;

    #[test]
    fn three_clients_one_closed_tour() {
      let config = ScenarioConfig { time_limit_secs: 30, ..ScenarioConfig::default() };
      let run = Pipeline::new(&config)
        .run(Source::Raw(raw_data(&[(0., 0.)], &[(1., 0.), (1., 1.), (0., 1.)], 100.0)));
      assert_eq!(run.report.error, None);
      assert_eq!(run.exit_code(), 0);
      assert_eq!(run.report.termination(), Some(Termination::Optimal));

      let routes = run.routes.as_ref().unwrap();
      assert_eq!(routes.routes.len(), 1);
      assert_eq!(routes.routes[0].kind, RouteKind::Tour);
      let catalog = run.catalog.as_ref().unwrap();
      let mut visited: Vec<_> = routes.routes[0].clients(catalog).collect();
      visited.sort_unstable();
      assert_eq!(visited, vec![1, 2, 3]);
      let objective = run.report.solution.as_ref().unwrap().objective.unwrap();
      assert!((objective - 4.0).abs() < 1e-6);
    }

    #[test]
    fn over_demand_is_infeasible() {
      let config = ScenarioConfig { time_limit_secs: 30, ..ScenarioConfig::default() };
      let run = Pipeline::new(&config)
        .run(Source::Raw(raw_data(&[(0., 0.)], &[(1., 0.), (2., 0.)], 0.5)));
      assert_eq!(run.report.termination(), Some(Termination::Infeasible));
      assert_eq!(run.exit_code(), 2);
      assert!(run.routes.is_none());
      assert_eq!(run.report.error, None);
    }

    #[test]
    fn solved_arcs_visit_each_client_once() {
      // capacity 2 with four unit demands needs at least two tours
      let catalog = catalog(&[(0., 0.)], &[(1., 0.), (2., 0.), (0., 1.), (0., 2.)], 2.0);
      let model = build_model(&catalog, &ModelOptions::default());
      let outcome = Glpk::new(&SolverConfig::default()).solve(&model.instance, Duration::from_secs(30)).unwrap();
      assert_eq!(outcome.termination, Termination::Optimal);
      let values = outcome.values().unwrap();
      assert!(model.instance.violations(values, 1e-6).is_empty());

      let selection = ArcSelection::from_assignment(&model, values);
      let counts = selection.visit_counts(&catalog);
      assert_eq!(counts.len(), 4);
      assert!(counts.values().all(|c| c.inbound == 1 && c.outbound == 1));

      let routes = selection.routes(catalog);
      assert_eq!(routes.subtours().count(), 0);
      assert!(routes.routes.len() >= 2);
      assert!(routes.routes.iter().all(|r| r.kind == RouteKind::Tour));
    }
  }
}

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use vrp_milp::scenario::{Pipeline, ScenarioConfig, Source};
use vrp_milp::solver::{SolverKind, Termination};
use vrp_milp::*;

#[derive(Debug, Clone, Parser)]
#[clap(name = "vrp-milp", about = "Build and solve a vehicle-routing MILP scenario")]
struct Args {
  /// Directory holding the scenario's CSV tables
  #[clap(parse(from_os_str))]
  instance: PathBuf,
  /// Scenario configuration (JSON)
  #[clap(short, long, parse(from_os_str))]
  config: Option<PathBuf>,
  /// Solver time limit in seconds, overriding the configuration
  #[clap(short, long)]
  timelimit: Option<u64>,
  #[clap(short, long, parse(from_os_str), default_value = "output")]
  output: PathBuf,
  #[clap(long, arg_enum)]
  solver: Option<SolverKind>,
  /// Also write the model in CPLEX-LP format
  #[clap(long, parse(from_os_str))]
  model_file: Option<PathBuf>,
  /// JSON trace log
  #[clap(long, parse(from_os_str))]
  log_file: Option<PathBuf>,
  #[clap(long, parse(from_os_str), default_value = "vrp-milp.logfilter")]
  log_filter: PathBuf,
  /// Only print warnings and errors to stderr, and skip the route tables
  #[clap(short, long)]
  quiet: bool,
}

fn load_config(args: &Args) -> Result<ScenarioConfig> {
  let mut config = match &args.config {
    Some(path) => ScenarioConfig::load(path)?,
    None => ScenarioConfig::default(),
  };
  if let Some(t) = args.timelimit {
    config.time_limit_secs = t;
  }
  if let Some(kind) = args.solver {
    config.solver.kind = kind;
  }
  Ok(config)
}

fn main() -> Result<()> {
  let args = Args::parse();
  let _g = logging::init_logging(args.log_file.as_deref(), Some(args.log_filter.as_path()), args.quiet)?;
  info!(commit = COMMIT_HASH, ?args);

  let config = load_config(&args)?;
  let mut pipeline = Pipeline::new(&config);
  if let Some(path) = &args.model_file {
    pipeline = pipeline.with_model_file(path);
  }
  let run = pipeline.run(Source::Dir(&args.instance));
  run.write_outputs(&args.output)?;

  if !args.quiet {
    if let (Some(catalog), Some(routes)) = (&run.catalog, &run.routes) {
      routes.pretty_print(catalog);
    }
  }

  match run.report.termination() {
    Some(Termination::Infeasible) => error!("scenario is infeasible"),
    Some(Termination::TimedOut) if run.routes.is_none() => error!("time limit reached without a feasible solution"),
    Some(t) => info!(termination=?t, objective=?run.report.solution.as_ref().and_then(|s| s.objective), "done"),
    None => {}
  }
  if let Some(e) = &run.report.error {
    error!(error=%e, "scenario failed");
  }

  let code = run.exit_code();
  if code != 0 {
    drop(_g);
    std::process::exit(code);
  }
  Ok(())
}

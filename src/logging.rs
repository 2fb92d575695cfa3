use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{info, warn};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

/// Comma-joined directives of a log-filter file, skipping `#` comment lines.
fn read_filter_file(path: &Path) -> Option<String> {
  let contents = std::fs::read_to_string(path).ok()?;
  let directives: Vec<_> = contents.lines()
    .map(str::trim)
    .filter(|s| !s.is_empty() && !s.starts_with('#'))
    .collect();
  Some(directives.join(","))
}

fn build_and_set_global_subscriber(
  logfile: Option<&Path>,
  logfilter_file: Option<&Path>,
  quiet: bool,
  is_test: bool,
) -> anyhow::Result<Option<WorkerGuard>> {
  let filter_from_file = logfilter_file.and_then(read_filter_file);
  let filter_file_missing = logfilter_file.is_some() && filter_from_file.is_none();

  let env_filter = match &filter_from_file {
    Some(directives) => EnvFilter::try_new(directives)
      .with_context(|| format!("invalid directives in log-filter file: {}", directives))?,
    None => EnvFilter::from_default_env(),
  };

  let stderr_level = if quiet { LevelFilter::WARN } else { LevelFilter::TRACE };
  let stderr_log = fmt::layer()
    .with_target(false)
    .without_time()
    .with_writer(std::io::stderr)
    .with_filter(stderr_level);
  let r = registry().with(env_filter).with(stderr_log);

  let flush_guard = match logfile {
    Some(p) => {
      let logfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(p)
        .with_context(|| format!("unable to open log file {}", p.display()))?;
      let (writer, guard) = non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .finish(logfile);
      let json = fmt::layer()
        .json()
        .with_span_list(true)
        .with_current_span(false)
        .with_writer(writer);

      let r = r.with(json);
      if is_test { r.try_init().ok(); } else { r.try_init().context("logging already initialised")?; }
      Some(guard)
    }
    None => {
      if is_test { r.try_init().ok(); } else { r.try_init().context("logging already initialised")?; }
      None
    }
  };

  if let Some(filename) = logfilter_file.map(Path::display) {
    if filter_file_missing {
      warn!(%filename, "unable to open log-filter file, falling back to RUST_LOG env var");
    } else {
      info!(%filename, "using log-filter file");
    }
  }

  Ok(flush_guard)
}

/// Installs the global subscriber.  The returned guard must be held until exit so the log file is flushed.
pub fn init_logging(logfile: Option<&Path>, logfilter_file: Option<&Path>, quiet: bool) -> anyhow::Result<Option<WorkerGuard>> {
  build_and_set_global_subscriber(logfile, logfilter_file, quiet, false)
}

#[cfg(test)]
pub(crate) fn init_test_logging() {
  build_and_set_global_subscriber(None, None, false, true).ok();
}

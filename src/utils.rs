use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;

pub trait IoContext<T> {
  fn read_context(self, path: impl AsRef<Path>) -> anyhow::Result<T>;
  fn write_context(self, path: impl AsRef<Path>) -> anyhow::Result<T>;
}

impl<T, E> IoContext<T> for std::result::Result<T, E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn read_context(self, path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref().display().to_string();
    self.with_context(|| format!("failed to read {}", path))
  }

  fn write_context(self, path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref().display().to_string();
    self.with_context(|| format!("failed to write {}", path))
  }
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
  let path = path.as_ref();
  let file = std::fs::File::open(path).read_context(path)?;
  let value = serde_json::from_reader(std::io::BufReader::new(file))
    .with_context(|| format!("failed to parse JSON in {}", path.display()))?;
  Ok(value)
}

pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> anyhow::Result<()> {
  let path = path.as_ref();
  let file = std::fs::File::create(path).write_context(path)?;
  serde_json::to_writer_pretty(std::io::BufWriter::new(file), value).write_context(path)?;
  Ok(())
}

/// Formats a `f64` for use in text formats: never scientific notation, no trailing `.0` on integers.
pub fn fmt_num(x: f64) -> impl Display {
  struct Num(f64);
  impl Display for Num {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      if self.0 == self.0.trunc() && self.0.abs() < 1e15 {
        write!(f, "{}", self.0 as i64)
      } else {
        write!(f, "{}", self.0)
      }
    }
  }
  Num(x)
}

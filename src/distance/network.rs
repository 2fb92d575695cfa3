//! Batched distance/duration lookups from an OSRM-compatible table service.
use super::DistanceMatrix;
use crate::entities::Coord;
use crate::error::ModelError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Full pairwise matrices in catalog order, already converted to kilometres and minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkTable {
  pub distances_km: DistanceMatrix,
  pub durations_min: DistanceMatrix,
}

pub trait MatrixService {
  /// One lookup for the whole coordinate list.  Row and column `i` of the result refer to `coords[i]`.
  fn table(&self, coords: &[Coord]) -> Result<NetworkTable, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
  pub base_url: String,
  pub profile: String,
  pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    NetworkConfig {
      base_url: "https://router.project-osrm.org".to_string(),
      profile: "driving".to_string(),
      request_timeout_secs: 60,
    }
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableResponse {
  code: String,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  distances: Option<Vec<Vec<Option<f64>>>>,
  #[serde(default)]
  durations: Option<Vec<Vec<Option<f64>>>>,
}

fn to_matrix(rows: Option<Vec<Vec<Option<f64>>>>, n: usize, what: &str, scale: f64) -> Result<DistanceMatrix, ModelError> {
  let rows = rows.ok_or_else(|| ModelError::DistanceService(format!("response has no {} matrix", what)))?;
  if rows.len() != n || rows.iter().any(|r| r.len() != n) {
    return Err(ModelError::DistanceService(format!("{} matrix is not {}x{}", what, n, n)));
  }
  let mut m = DistanceMatrix::new(n);
  for (i, row) in rows.into_iter().enumerate() {
    for (j, value) in row.into_iter().enumerate() {
      if i == j {
        continue;
      }
      match value {
        Some(x) if x >= 0.0 => m.set(i, j, x * scale),
        _ => return Err(ModelError::DistanceService(format!("no {} between points {} and {}", what, i, j))),
      }
    }
  }
  Ok(m)
}

impl TableResponse {
  /// Meters become kilometres, seconds become minutes.
  pub(crate) fn into_table(self, n: usize) -> Result<NetworkTable, ModelError> {
    if self.code != "Ok" {
      return Err(ModelError::DistanceService(format!(
        "service returned code `{}`: {}", self.code, self.message.unwrap_or_default()
      )));
    }
    Ok(NetworkTable {
      distances_km: to_matrix(self.distances, n, "distance", 1e-3)?,
      durations_min: to_matrix(self.durations, n, "duration", 1.0 / 60.0)?,
    })
  }
}

enum Failure {
  Transient(String),
  Fatal(String),
}

pub struct Osrm {
  client: reqwest::blocking::Client,
  config: NetworkConfig,
}

impl Osrm {
  pub fn new(config: NetworkConfig) -> Result<Self, ModelError> {
    let client = reqwest::blocking::Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .build()
      .map_err(|e| ModelError::DistanceService(e.to_string()))?;
    Ok(Osrm { client, config })
  }

  pub fn url(&self, coords: &[Coord]) -> String {
    let points = coords.iter().map(|c| format!("{},{}", c.lon, c.lat)).join(";");
    format!(
      "{}/table/v1/{}/{}?annotations=distance,duration",
      self.config.base_url.trim_end_matches('/'), self.config.profile, points
    )
  }

  fn request(&self, url: &str) -> Result<TableResponse, Failure> {
    let response = self.client.get(url).send().map_err(|e| {
      if e.is_timeout() || e.is_connect() {
        Failure::Transient(e.to_string())
      } else {
        Failure::Fatal(e.to_string())
      }
    })?;

    let status = response.status();
    if status.is_server_error() {
      return Err(Failure::Transient(format!("HTTP {}", status)));
    }
    if !status.is_success() {
      let body = response.text().unwrap_or_default();
      return Err(Failure::Fatal(format!("HTTP {}: {}", status, body)));
    }
    response.json().map_err(|e| Failure::Fatal(format!("unable to decode response: {}", e)))
  }
}

impl MatrixService for Osrm {
  #[tracing::instrument(level = "info", skip_all, fields(n = coords.len()))]
  fn table(&self, coords: &[Coord]) -> Result<NetworkTable, ModelError> {
    let url = self.url(coords);
    debug!(%url);
    let response = match self.request(&url) {
      Ok(r) => r,
      Err(Failure::Transient(e)) => {
        warn!(error=%e, "transient distance service failure, retrying once");
        match self.request(&url) {
          Ok(r) => r,
          Err(Failure::Transient(e)) | Err(Failure::Fatal(e)) => return Err(ModelError::DistanceService(e)),
        }
      }
      Err(Failure::Fatal(e)) => return Err(ModelError::DistanceService(e)),
    };
    let table = response.into_table(coords.len())?;
    info!("network matrices received");
    Ok(table)
  }
}

/// A fixed table, for tests and for matrices precomputed outside the pipeline.
#[derive(Debug, Clone)]
pub struct FixedTable(pub NetworkTable);

impl MatrixService for FixedTable {
  fn table(&self, coords: &[Coord]) -> Result<NetworkTable, ModelError> {
    if self.0.distances_km.size() != coords.len() || self.0.durations_min.size() != coords.len() {
      return Err(ModelError::DistanceService(format!(
        "table has {} points but {} were requested", self.0.distances_km.size(), coords.len()
      )));
    }
    Ok(self.0.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::{Catalog, CatalogOptions};
  use crate::distance::{DistanceConfig, TravelMatrices};
  use crate::entities::Metric;
  use crate::test::raw_data;

  fn parse(json: &str, n: usize) -> Result<NetworkTable, ModelError> {
    let response: TableResponse = serde_json::from_str(json).unwrap();
    response.into_table(n)
  }

  #[test]
  fn unit_conversion() -> anyhow::Result<()> {
    let t = parse(r#"{"code":"Ok","distances":[[0,1500],[2000,0]],"durations":[[0,120],[90,0]]}"#, 2)?;
    assert_eq!(t.distances_km.get(0, 1), 1.5);
    assert_eq!(t.distances_km.get(1, 0), 2.0);
    assert_eq!(t.durations_min.get(0, 1), 2.0);
    assert_eq!(t.durations_min.get(1, 0), 1.5);
    Ok(())
  }

  #[test]
  fn service_errors() {
    assert!(matches!(parse(r#"{"code":"InvalidQuery","message":"bad"}"#, 2), Err(ModelError::DistanceService(_))));
    assert!(matches!(
      parse(r#"{"code":"Ok","distances":[[0,1]],"durations":[[0,1]]}"#, 2),
      Err(ModelError::DistanceService(_))
    ));
    assert!(matches!(
      parse(r#"{"code":"Ok","distances":[[0,null],[1,0]],"durations":[[0,1],[1,0]]}"#, 2),
      Err(ModelError::DistanceService(_))
    ));
  }

  #[test]
  fn request_url() -> anyhow::Result<()> {
    let osrm = Osrm::new(NetworkConfig { base_url: "http://localhost:5000/".into(), ..NetworkConfig::default() })?;
    let url = osrm.url(&[Coord::new(-74.1, 4.6), Coord::new(-74.2, 4.7)]);
    assert_eq!(url, "http://localhost:5000/table/v1/driving/-74.1,4.6;-74.2,4.7?annotations=distance,duration");
    Ok(())
  }

  #[test]
  fn positional_slicing_depots_first() -> anyhow::Result<()> {
    let mut raw = raw_data(&[(0., 0.)], &[(1., 0.), (2., 0.)], 10.0);
    raw.vehicles[0].vehicle_type = "Ev".into();
    let options = CatalogOptions { default_metric: Metric::Network, ..CatalogOptions::default() };
    let catalog = Catalog::build(&raw, &options)?;

    // row/column 0 is the depot, then the two clients
    let km = DistanceMatrix::from_data(3, vec![0., 10., 20., 11., 0., 5., 21., 6., 0.]).unwrap();
    let min = DistanceMatrix::from_data(3, vec![0., 1., 2., 1., 0., 3., 2., 3., 0.]).unwrap();
    let service = FixedTable(NetworkTable { distances_km: km, durations_min: min });
    let travel = TravelMatrices::build(&catalog, &DistanceConfig::default(), Some(&service))?;

    let m = travel.matrix(Metric::Network)?;
    let depot_row: Vec<f64> = catalog.clients().map(|c| m.get(0, c)).collect();
    assert_eq!(depot_row, vec![10., 20.]);
    assert_eq!(travel.travel_time(Metric::Network, 1, 2)?, 3.0);
    Ok(())
  }

  #[test]
  fn fixed_table_size_mismatch() {
    let t = NetworkTable { distances_km: DistanceMatrix::new(2), durations_min: DistanceMatrix::new(2) };
    assert!(FixedTable(t).table(&[Coord::new(0., 0.)]).is_err());
  }
}

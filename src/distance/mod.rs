pub mod network;

use crate::catalog::Catalog;
use crate::entities::{Coord, Metric, NodeIdx};
use crate::error::{EntityKind, ModelError};
use crate::Map;
use network::{MatrixService, NetworkConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Planar Euclidean distance on raw coordinate pairs
pub fn euclidean(a: Coord, b: Coord) -> f64 {
  ((a.lon - b.lon).powi(2) + (a.lat - b.lat).powi(2)).sqrt()
}

/// Great-circle distance in kilometres
pub fn haversine(a: Coord, b: Coord) -> f64 {
  let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
  let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
  let dlat = lat2 - lat1;
  let dlon = lon2 - lon1;
  let h = (dlat / 2.).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.).sin().powi(2);
  let c = 2. * h.sqrt().atan2((1. - h).sqrt());
  EARTH_RADIUS_KM * c
}

/// A dense n×n matrix in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
  data: Vec<f64>,
  size: usize,
}

impl DistanceMatrix {
  pub fn new(size: usize) -> Self {
    DistanceMatrix { data: vec![0.0; size * size], size }
  }

  /// Builds the matrix from a pairwise function.  The diagonal is always zero.
  pub fn from_fn(size: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
    let mut m = Self::new(size);
    for i in 0..size {
      for j in 0..size {
        if i != j {
          m.set(i, j, f(i, j));
        }
      }
    }
    m
  }

  pub fn from_coords(coords: &[Coord], metric: fn(Coord, Coord) -> f64) -> Self {
    Self::from_fn(coords.len(), |i, j| metric(coords[i], coords[j]))
  }

  /// Returns `None` if `data` is not `size * size` long.
  pub fn from_data(size: usize, data: Vec<f64>) -> Option<Self> {
    if data.len() != size * size {
      return None;
    }
    Some(DistanceMatrix { data, size })
  }

  #[inline(always)]
  pub fn get(&self, from: usize, to: usize) -> f64 {
    self.data[from * self.size + to]
  }

  #[inline(always)]
  pub fn set(&mut self, from: usize, to: usize, value: f64) {
    self.data[from * self.size + to] = value;
  }

  pub fn size(&self) -> usize {
    self.size
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistanceConfig {
  /// Average speed used to derive travel times for metrics without a duration source
  pub speed_kmh: f64,
  pub network: NetworkConfig,
}

impl Default for DistanceConfig {
  fn default() -> Self {
    DistanceConfig { speed_kmh: 60.0, network: NetworkConfig::default() }
  }
}

/// Distances (and travel times, in minutes) over the catalog nodes for every metric in use.
#[derive(Debug, Clone)]
pub struct TravelMatrices {
  distances: Map<Metric, DistanceMatrix>,
  durations: Map<Metric, DistanceMatrix>,
  speed_kmh: f64,
}

impl TravelMatrices {
  pub fn new(speed_kmh: f64) -> Self {
    TravelMatrices { distances: Map::default(), durations: Map::default(), speed_kmh }
  }

  /// Computes a matrix for each metric used by some vehicle type.  The network service is queried at most once.
  #[tracing::instrument(level = "info", skip_all)]
  pub fn build(catalog: &Catalog, config: &DistanceConfig, service: Option<&dyn MatrixService>) -> Result<Self, ModelError> {
    if !(config.speed_kmh > 0.0) {
      return Err(ModelError::InvalidConfig("speed_kmh must be positive".into()));
    }
    let coords = catalog.coords();
    let mut matrices = TravelMatrices::new(config.speed_kmh);
    let mut metrics: Vec<_> = catalog.vehicles().map(|v| catalog.vehicle(v).metric).collect();
    metrics.sort();
    metrics.dedup();

    for metric in metrics {
      match metric {
        Metric::Planar => matrices.insert(metric, DistanceMatrix::from_coords(&coords, euclidean), None),
        Metric::Haversine => matrices.insert(metric, DistanceMatrix::from_coords(&coords, haversine), None),
        Metric::Network => {
          let service = service.ok_or_else(|| ModelError::InvalidConfig(
            "a vehicle type uses the network metric but no distance service is configured".into()
          ))?;
          let table = service.table(&coords)?;
          matrices.insert(metric, table.distances_km, Some(table.durations_min));
        }
      }
      info!(?metric, nodes = coords.len(), "distance matrix ready");
    }
    Ok(matrices)
  }

  pub fn insert(&mut self, metric: Metric, distances: DistanceMatrix, durations: Option<DistanceMatrix>) {
    self.distances.insert(metric, distances);
    match durations {
      Some(d) => { self.durations.insert(metric, d); }
      None => { self.durations.remove(&metric); }
    }
  }

  pub fn matrix(&self, metric: Metric) -> Result<&DistanceMatrix, ModelError> {
    self.distances.get(&metric).ok_or_else(|| ModelError::unknown(EntityKind::Metric, format!("{:?}", metric)))
  }

  pub fn distance(&self, metric: Metric, from: NodeIdx, to: NodeIdx) -> Result<f64, ModelError> {
    Ok(self.matrix(metric)?.get(from, to))
  }

  /// Travel time in minutes
  pub fn travel_time(&self, metric: Metric, from: NodeIdx, to: NodeIdx) -> Result<f64, ModelError> {
    match self.durations.get(&metric) {
      Some(m) => Ok(m.get(from, to)),
      None => Ok(self.distance(metric, from, to)? / self.speed_kmh * 60.0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test::*;
  use proptest::prelude::*;

  #[test]
  fn bogota_medellin() {
    let bogota = Coord::new(-74.0721, 4.7110);
    let medellin = Coord::new(-75.5812, 6.2442);
    let d = haversine(bogota, medellin);
    assert!((d - 238.67).abs() < 0.01, "got {}", d);
  }

  #[test]
  fn reference_formula() {
    // one degree of longitude on the equator
    let d = haversine(Coord::new(0., 0.), Coord::new(1., 0.));
    assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI / 180.).abs() < 1e-9);
  }

  #[test]
  fn planar() {
    assert_eq!(euclidean(Coord::new(0., 0.), Coord::new(3., 4.)), 5.0);
  }

  #[test]
  fn diagonal_is_zero_even_for_nan_coords() {
    let coords = [Coord::new(f64::NAN, 0.), Coord::new(1., 1.)];
    let m = DistanceMatrix::from_coords(&coords, euclidean);
    assert_eq!(m.get(0, 0), 0.0);
    assert_eq!(m.get(1, 1), 0.0);
  }

  #[test]
  fn from_data_is_row_major() {
    let m = DistanceMatrix::from_data(3, vec![0., 1., 2., 3., 0., 5., 6., 7., 0.]).unwrap();
    assert_eq!((m.get(0, 1), m.get(0, 2), m.get(1, 0), m.get(2, 1)), (1., 2., 3., 7.));
    assert!(DistanceMatrix::from_data(2, vec![0.]).is_none());
  }

  #[test]
  fn travel_time_from_speed() -> anyhow::Result<()> {
    let catalog = catalog(&[(0., 0.)], &[(30., 40.)], 10.0);
    let travel = TravelMatrices::build(&catalog, &DistanceConfig::default(), None)?;
    assert_eq!(travel.distance(Metric::Planar, 0, 1)?, 50.0);
    assert_eq!(travel.travel_time(Metric::Planar, 0, 1)?, 50.0);
    assert!(travel.distance(Metric::Haversine, 0, 1).is_err());
    Ok(())
  }

  #[test]
  fn network_metric_needs_a_service() {
    let mut raw = raw_data(&[(0., 0.)], &[(1., 1.)], 10.0);
    raw.vehicles[0].vehicle_type = "Gas Car".into();
    let mut options = crate::catalog::CatalogOptions::default();
    options.default_metric = Metric::Network;
    let catalog = crate::catalog::Catalog::build(&raw, &options).unwrap();
    assert!(matches!(
      TravelMatrices::build(&catalog, &DistanceConfig::default(), None),
      Err(ModelError::InvalidConfig(_))
    ));
  }

  fn coord() -> impl Strategy<Value=Coord> {
    (-180.0..180.0f64, -90.0..90.0f64).prop_map(|(lon, lat)| Coord::new(lon, lat))
  }

  proptest! {
    #[test]
    fn haversine_symmetric(a in coord(), b in coord()) {
      let d1 = haversine(a, b);
      let d2 = haversine(b, a);
      prop_assert!((d1 - d2).abs() < 1e-9);
      prop_assert!(d1 >= 0.0);
      prop_assert!(d1 <= EARTH_RADIUS_KM * std::f64::consts::PI + 1e-6);
    }

    #[test]
    fn haversine_zero_on_diagonal(a in coord()) {
      prop_assert_eq!(haversine(a, a), 0.0);
    }
  }
}

use crate::catalog::*;
use crate::distance::{DistanceConfig, TravelMatrices};
use crate::entities::{Coord, Day, NodeIdx};
use crate::milp::Assignment;
use crate::model::routing::RoutingVars;
use crate::model::{BuiltModel, ModelBuilder, ModelOptions, ModelVars};
use itertools::Itertools;
use std::path::Path;

pub fn test_data_dir() -> &'static Path {
  Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/"))
}

/// Depots and clients at the given planar coordinates, raw ids numbered from 1.  Every client demands one
/// unit of `Product`, and there is a single `Truck` vehicle type with the given capacity and a range of 1000.
pub fn raw_data(depots: &[(f64, f64)], clients: &[(f64, f64)], capacity: f64) -> RawData {
  RawData {
    depots: depots.iter().enumerate()
      .map(|(i, &(x, y))| DepotRecord { id: (i + 1).to_string(), coord: Coord::new(x, y) })
      .collect(),
    clients: clients.iter().enumerate()
      .map(|(i, &(x, y))| ClientRecord {
        id: (i + 1).to_string(),
        coord: Coord::new(x, y),
        demand: vec![("Product".to_string(), 1.0)],
      })
      .collect(),
    vehicles: vec![VehicleRecord {
      vehicle_type: "Truck".to_string(),
      capacity,
      product_capacity: vec![],
      range: 1000.0,
      battery_capacity: None,
    }],
    recharge: vec![],
    depot_capacities: vec![],
  }
}

pub fn catalog(depots: &[(f64, f64)], clients: &[(f64, f64)], capacity: f64) -> Catalog {
  Catalog::build(&raw_data(depots, clients, capacity), &CatalogOptions::default())
    .expect("test catalog should be valid")
}

pub fn build_model(catalog: &Catalog, options: &ModelOptions) -> BuiltModel {
  let travel = TravelMatrices::build(catalog, &DistanceConfig::default(), None).expect("planar matrices");
  ModelBuilder::new(catalog, &travel, options).build("test").expect("test model should build")
}

pub fn routing_vars(model: &BuiltModel) -> &RoutingVars {
  match &model.vars {
    ModelVars::Routing(v) => v,
    ModelVars::Assignment(_) => panic!("expected a routing model"),
  }
}

/// Sets the arcs along `path` (node indices) for vehicle type 0 on `day`.
pub fn set_path(a: &mut Assignment, vars: &RoutingVars, path: &[NodeIdx], day: Day) {
  for (&o, &d) in path.iter().tuple_windows() {
    a.set(vars.y[&(o, d, 0, day)], 1.0);
  }
}

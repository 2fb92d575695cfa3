use serde::{Deserialize, Serialize};

/// Position of a node in the catalog (depots, then clients, then recharge nodes).
pub type NodeIdx = usize;
pub type VehicleIdx = usize;
pub type ProductIdx = usize;
/// Day of the planning horizon, starting at 1.
pub type Day = u32;

pub const CLIENT_PREFIX: &str = "NCliente";
pub const DEPOT_PREFIX: &str = "NBodega";
pub const RECHARGE_PREFIX: &str = "NRecarga";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum NodeRole {
  Depot,
  Client,
  Recharge,
}

impl NodeRole {
  pub fn prefix(&self) -> &'static str {
    match self {
      NodeRole::Depot => DEPOT_PREFIX,
      NodeRole::Client => CLIENT_PREFIX,
      NodeRole::Recharge => RECHARGE_PREFIX,
    }
  }

  /// Identifier of a raw record in the shared node namespace.
  pub fn node_id(&self, raw_id: &str) -> String {
    format!("{}{}", self.prefix(), raw_id.trim())
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coord {
  pub lon: f64,
  pub lat: f64,
}

impl Coord {
  pub fn new(lon: f64, lat: f64) -> Self {
    Coord { lon, lat }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RechargeSpec {
  /// kWh per minute
  pub rate: f64,
  /// Tariff per kWh
  pub tariff: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
  pub id: String,
  pub raw_id: String,
  pub role: NodeRole,
  pub coord: Coord,
  /// Demand per product, clients only (zeros elsewhere).
  pub demand: Vec<f64>,
  /// Supply limit per product, depots only (zeros elsewhere).
  pub capacity: Vec<f64>,
  pub recharge: Option<RechargeSpec>,
}

impl Node {
  #[inline(always)]
  pub fn is_client(&self) -> bool {
    self.role == NodeRole::Client
  }

  #[inline(always)]
  pub fn is_depot(&self) -> bool {
    self.role == NodeRole::Depot
  }

  pub fn total_demand(&self) -> f64 {
    self.demand.iter().sum()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capacity {
  Total(f64),
  PerProduct(Vec<f64>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
  Planar,
  Haversine,
  Network,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleType {
  pub id: String,
  pub capacity: Capacity,
  pub range: f64,
  pub battery_capacity: f64,
  pub cost_per_distance: f64,
  /// Cost per hour of travel
  pub cost_per_time: f64,
  /// Charged once per route dispatched (per assignment in the assignment formulation)
  pub fixed_cost: f64,
  /// Charged per day a maintenance is triggered
  pub maintenance_cost: f64,
  /// kg CO2 per distance unit
  pub emission_rate: f64,
  pub loading_cost: f64,
  /// Hours per client served
  pub loading_time: f64,
  pub metric: Metric,
}

/// Trims and title-cases a vehicle type name, so that `" gas car"` and `"Gas Car"` refer to the same class.
pub fn normalize_vehicle_name(name: &str) -> String {
  name.split_whitespace()
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<String>>()
    .join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefixed_ids_do_not_collide() {
    let c = NodeRole::Client.node_id("3");
    let d = NodeRole::Depot.node_id("3");
    assert_eq!(c, "NCliente3");
    assert_eq!(d, "NBodega3");
    assert_ne!(c, d);
  }

  #[test]
  fn vehicle_names() {
    assert_eq!(normalize_vehicle_name("  gas CAR "), "Gas Car");
    assert_eq!(normalize_vehicle_name("drone"), "Drone");
    assert_eq!(normalize_vehicle_name("EV"), "Ev");
  }
}

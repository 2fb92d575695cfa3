use crate::entities::*;
use crate::error::{EntityKind, InputError, ModelError};
use crate::Map;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
  pub id: String,
  pub coord: Coord,
  pub demand: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepotRecord {
  pub id: String,
  pub coord: Coord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
  pub vehicle_type: String,
  pub capacity: f64,
  /// Per-product capacities; when non-empty these replace `capacity`.
  pub product_capacity: Vec<(String, f64)>,
  pub range: f64,
  pub battery_capacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RechargeRecord {
  pub id: String,
  pub coord: Coord,
  pub rate: Option<f64>,
  pub tariff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepotCapacityRecord {
  pub depot_id: String,
  pub capacity: Vec<(String, f64)>,
}

/// Raw per-entity records of one scenario, identifiers not yet prefixed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawData {
  pub clients: Vec<ClientRecord>,
  pub depots: Vec<DepotRecord>,
  pub vehicles: Vec<VehicleRecord>,
  pub recharge: Vec<RechargeRecord>,
  pub depot_capacities: Vec<DepotCapacityRecord>,
}

/// Cost and metric attributes shared by every vehicle type of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VehicleClass {
  pub metric: Option<Metric>,
  #[serde(alias = "freight_rate")]
  pub cost_per_distance: f64,
  #[serde(alias = "time_rate")]
  pub cost_per_time: f64,
  pub fixed_cost: f64,
  pub maintenance_cost: f64,
  pub emission_rate: f64,
  /// Charged per client served
  pub loading_cost: f64,
  /// Hours spent loading per client served
  pub loading_time: f64,
}

impl Default for VehicleClass {
  fn default() -> Self {
    VehicleClass {
      metric: None,
      cost_per_distance: 1.0,
      cost_per_time: 0.0,
      fixed_cost: 0.0,
      maintenance_cost: 0.0,
      emission_rate: 0.0,
      loading_cost: 0.0,
      loading_time: 0.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogOptions {
  pub products: Vec<String>,
  /// Keyed by normalized vehicle type name.  When non-empty, every vehicle type needs an entry.
  pub vehicle_classes: Map<String, VehicleClass>,
  pub default_metric: Metric,
  /// Battery capacity per unit of range, used when the vehicle table has no battery column.
  pub battery_per_range: f64,
  pub recharge_defaults: RechargeSpec,
}

impl Default for CatalogOptions {
  fn default() -> Self {
    CatalogOptions {
      products: vec!["Product".to_string()],
      vehicle_classes: Map::default(),
      default_metric: Metric::Planar,
      battery_per_range: 0.1,
      recharge_defaults: RechargeSpec { rate: 5.0, tariff: 500.0 },
    }
  }
}

/// Uniform view of all entities of a scenario.
#[derive(Debug, Clone)]
pub struct Catalog {
  products: Vec<String>,
  nodes: Vec<Node>,
  vehicles: Vec<VehicleType>,
  depots: Range<NodeIdx>,
  clients: Range<NodeIdx>,
  recharge: Range<NodeIdx>,
  node_by_id: Map<String, NodeIdx>,
  vehicle_by_id: Map<String, VehicleIdx>,
}

fn check_non_negative(id: &str, attribute: &'static str, value: f64) -> Result<f64, InputError> {
  if value < 0.0 || !value.is_finite() {
    Err(InputError::NegativeAttribute { id: id.to_string(), attribute, value })
  } else {
    Ok(value)
  }
}

struct ProductIndex<'a>(&'a [String]);

impl ProductIndex<'_> {
  fn quantities(&self, owner: &str, entries: &[(String, f64)], attribute: &'static str) -> Result<Vec<f64>, ModelError> {
    let mut q = vec![0.0; self.0.len()];
    for (name, value) in entries {
      let p = self.0.iter().position(|p| p == name)
        .ok_or_else(|| ModelError::unknown(EntityKind::Product, name))?;
      q[p] += check_non_negative(owner, attribute, *value)?;
    }
    Ok(q)
  }
}

impl Catalog {
  #[tracing::instrument(level = "debug", skip_all)]
  pub fn build(raw: &RawData, options: &CatalogOptions) -> Result<Self, ModelError> {
    if options.products.is_empty() {
      return Err(ModelError::InvalidConfig("at least one product is required".into()));
    }
    for (i, p) in options.products.iter().enumerate() {
      if options.products[..i].contains(p) {
        return Err(ModelError::InvalidConfig(format!("product `{}` listed twice", p)));
      }
    }
    if raw.depots.is_empty() {
      return Err(InputError::EmptySet(EntityKind::Depot).into());
    }
    if raw.clients.is_empty() {
      return Err(InputError::EmptySet(EntityKind::Client).into());
    }
    if raw.vehicles.is_empty() {
      return Err(InputError::EmptySet(EntityKind::VehicleType).into());
    }

    let n_products = options.products.len();
    let products = ProductIndex(&options.products);
    let mut nodes = Vec::with_capacity(raw.depots.len() + raw.clients.len() + raw.recharge.len());
    let mut node_by_id = Map::default();

    let mut push_node = |node: Node, kind: EntityKind, nodes: &mut Vec<Node>| -> Result<(), ModelError> {
      if node_by_id.insert(node.id.clone(), nodes.len()).is_some() {
        return Err(InputError::DuplicateId { kind, id: node.id }.into());
      }
      nodes.push(node);
      Ok(())
    };

    for d in &raw.depots {
      let node = Node {
        id: NodeRole::Depot.node_id(&d.id),
        raw_id: d.id.trim().to_string(),
        role: NodeRole::Depot,
        coord: d.coord,
        demand: vec![0.0; n_products],
        capacity: vec![0.0; n_products],
        recharge: None,
      };
      push_node(node, EntityKind::Depot, &mut nodes)?;
    }
    let depots = 0..nodes.len();

    for c in &raw.clients {
      let id = NodeRole::Client.node_id(&c.id);
      let demand = products.quantities(&id, &c.demand, "demand")?;
      let node = Node {
        id,
        raw_id: c.id.trim().to_string(),
        role: NodeRole::Client,
        coord: c.coord,
        demand,
        capacity: vec![0.0; n_products],
        recharge: None,
      };
      push_node(node, EntityKind::Client, &mut nodes)?;
    }
    let clients = depots.end..nodes.len();

    for r in &raw.recharge {
      let id = NodeRole::Recharge.node_id(&r.id);
      let spec = RechargeSpec {
        rate: check_non_negative(&id, "recharge rate", r.rate.unwrap_or(options.recharge_defaults.rate))?,
        tariff: check_non_negative(&id, "recharge tariff", r.tariff.unwrap_or(options.recharge_defaults.tariff))?,
      };
      if spec.rate == 0.0 {
        return Err(ModelError::InvalidConfig(format!("recharge node `{}` has zero recharge rate", id)));
      }
      let node = Node {
        id,
        raw_id: r.id.trim().to_string(),
        role: NodeRole::Recharge,
        coord: r.coord,
        demand: vec![0.0; n_products],
        capacity: vec![0.0; n_products],
        recharge: Some(spec),
      };
      push_node(node, EntityKind::Node, &mut nodes)?;
    }
    let recharge = clients.end..nodes.len();

    let mut seen_capacity_rows = crate::Set::default();
    for row in &raw.depot_capacities {
      let id = NodeRole::Depot.node_id(&row.depot_id);
      let idx = match node_by_id.get(&id) {
        Some(&i) if nodes[i].is_depot() => i,
        _ => return Err(ModelError::unknown(EntityKind::Depot, id)),
      };
      if !seen_capacity_rows.insert(idx) {
        return Err(InputError::DuplicateId { kind: EntityKind::Depot, id }.into());
      }
      nodes[idx].capacity = products.quantities(&id, &row.capacity, "capacity")?;
    }

    let mut vehicles: Vec<VehicleType> = Vec::new();
    let mut vehicle_by_id = Map::default();
    let mut first_rows: Map<String, &VehicleRecord> = Map::default();
    for rec in &raw.vehicles {
      let id = normalize_vehicle_name(&rec.vehicle_type);
      if let Some(first) = first_rows.get(&id) {
        let same = first.capacity == rec.capacity
          && first.product_capacity == rec.product_capacity
          && first.range == rec.range
          && first.battery_capacity == rec.battery_capacity;
        if !same {
          return Err(InputError::DuplicateId { kind: EntityKind::VehicleType, id }.into());
        }
        debug!(vehicle=%id, "repeated vehicle row");
        continue;
      }
      first_rows.insert(id.clone(), rec);

      let class = if options.vehicle_classes.is_empty() {
        VehicleClass::default()
      } else {
        options.vehicle_classes.get(&id)
          .cloned()
          .ok_or_else(|| ModelError::unknown(EntityKind::VehicleClass, &id))?
      };

      let capacity = if rec.product_capacity.is_empty() {
        Capacity::Total(check_non_negative(&id, "capacity", rec.capacity)?)
      } else {
        Capacity::PerProduct(products.quantities(&id, &rec.product_capacity, "capacity")?)
      };
      let range = check_non_negative(&id, "range", rec.range)?;
      let battery_capacity = match rec.battery_capacity {
        Some(b) => check_non_negative(&id, "battery capacity", b)?,
        None => range * options.battery_per_range,
      };

      vehicle_by_id.insert(id.clone(), vehicles.len());
      vehicles.push(VehicleType {
        id: id.clone(),
        capacity,
        range,
        battery_capacity,
        cost_per_distance: class.cost_per_distance,
        cost_per_time: class.cost_per_time,
        fixed_cost: class.fixed_cost,
        maintenance_cost: class.maintenance_cost,
        emission_rate: class.emission_rate,
        loading_cost: check_non_negative(&id, "loading cost", class.loading_cost)?,
        loading_time: check_non_negative(&id, "loading time", class.loading_time)?,
        metric: class.metric.unwrap_or(options.default_metric),
      });
    }

    debug!(depots=depots.len(), clients=clients.len(), recharge=recharge.len(), vehicles=vehicles.len(), "catalog built");

    Ok(Catalog {
      products: options.products.clone(),
      nodes,
      vehicles,
      depots,
      clients,
      recharge,
      node_by_id,
      vehicle_by_id,
    })
  }

  #[inline(always)]
  pub fn depots(&self) -> Range<NodeIdx> {
    self.depots.clone()
  }

  #[inline(always)]
  pub fn clients(&self) -> Range<NodeIdx> {
    self.clients.clone()
  }

  #[inline(always)]
  pub fn recharge_nodes(&self) -> Range<NodeIdx> {
    self.recharge.clone()
  }

  #[inline(always)]
  pub fn vehicles(&self) -> Range<VehicleIdx> {
    0..self.vehicles.len()
  }

  #[inline(always)]
  pub fn products(&self) -> Range<ProductIdx> {
    0..self.products.len()
  }

  pub fn product_names(&self) -> &[String] {
    &self.products
  }

  pub fn node(&self, n: NodeIdx) -> &Node {
    &self.nodes[n]
  }

  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn vehicle(&self, v: VehicleIdx) -> &VehicleType {
    &self.vehicles[v]
  }

  pub fn node_idx(&self, id: &str) -> Result<NodeIdx, ModelError> {
    self.node_by_id.get(id).copied().ok_or_else(|| ModelError::unknown(EntityKind::Node, id))
  }

  pub fn vehicle_idx(&self, id: &str) -> Result<VehicleIdx, ModelError> {
    self.vehicle_by_id.get(id).copied().ok_or_else(|| ModelError::unknown(EntityKind::VehicleType, id))
  }

  pub fn product_idx(&self, name: &str) -> Result<ProductIdx, ModelError> {
    self.products.iter().position(|p| p == name).ok_or_else(|| ModelError::unknown(EntityKind::Product, name))
  }

  #[inline(always)]
  pub fn is_client(&self, n: NodeIdx) -> bool {
    self.clients.contains(&n)
  }

  #[inline(always)]
  pub fn is_depot(&self, n: NodeIdx) -> bool {
    self.depots.contains(&n)
  }

  #[inline(always)]
  pub fn is_recharge(&self, n: NodeIdx) -> bool {
    self.recharge.contains(&n)
  }

  pub fn coord(&self, n: NodeIdx) -> Coord {
    self.nodes[n].coord
  }

  /// Coordinates in catalog order.  Positional lookups into network matrices rely on this order.
  pub fn coords(&self) -> Vec<Coord> {
    self.nodes.iter().map(|n| n.coord).collect()
  }

  pub fn demand(&self, n: NodeIdx, p: ProductIdx) -> f64 {
    self.nodes[n].demand[p]
  }

  pub fn total_demand(&self, n: NodeIdx) -> f64 {
    self.nodes[n].total_demand()
  }

  /// Depot supply limit; zero when the depot had no capacity row.
  pub fn depot_capacity(&self, d: NodeIdx, p: ProductIdx) -> f64 {
    self.nodes[d].capacity[p]
  }

  pub fn demand_by_id(&self, id: &str, product: &str) -> Result<f64, ModelError> {
    let n = self.node_idx(id)?;
    let p = self.product_idx(product)?;
    Ok(self.demand(n, p))
  }

  pub fn depot_capacity_by_id(&self, id: &str, product: &str) -> Result<f64, ModelError> {
    let d = self.node_idx(id)?;
    if !self.is_depot(d) {
      return Err(ModelError::unknown(EntityKind::Depot, id));
    }
    let p = self.product_idx(product)?;
    Ok(self.depot_capacity(d, p))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test::*;

  #[test]
  fn client_and_depot_with_same_raw_id() -> anyhow::Result<()> {
    let mut raw = raw_data(&[(0., 0.)], &[(1., 0.)], 10.0);
    raw.clients[0].id = "3".into();
    raw.depots[0].id = "3".into();
    let catalog = Catalog::build(&raw, &CatalogOptions::default())?;
    let d = catalog.node(catalog.depots().start);
    let c = catalog.node(catalog.clients().start);
    assert_ne!(d.id, c.id);
    assert_eq!(catalog.node_idx("NBodega3")?, 0);
    assert_eq!(catalog.node_idx("NCliente3")?, 1);
    Ok(())
  }

  #[test]
  fn node_order() -> anyhow::Result<()> {
    let mut raw = raw_data(&[(0., 0.), (5., 5.)], &[(1., 0.), (2., 0.), (3., 0.)], 10.0);
    raw.recharge.push(RechargeRecord { id: "1".into(), coord: Coord::new(9., 9.), rate: None, tariff: Some(250.0) });
    let catalog = Catalog::build(&raw, &CatalogOptions::default())?;
    assert_eq!(catalog.depots(), 0..2);
    assert_eq!(catalog.clients(), 2..5);
    assert_eq!(catalog.recharge_nodes(), 5..6);
    let spec = catalog.node(5).recharge.unwrap();
    assert_eq!(spec.rate, 5.0);
    assert_eq!(spec.tariff, 250.0);
    assert_eq!(catalog.coords()[1], Coord::new(5., 5.));
    Ok(())
  }

  #[test]
  fn missing_demand_and_capacity_default_to_zero() -> anyhow::Result<()> {
    let mut raw = raw_data(&[(0., 0.), (1., 1.)], &[(1., 0.)], 10.0);
    raw.clients[0].demand = vec![("B".into(), 4.0)];
    raw.depot_capacities.push(DepotCapacityRecord { depot_id: "1".into(), capacity: vec![("A".into(), 7.0)] });
    let options = CatalogOptions { products: vec!["A".into(), "B".into()], ..CatalogOptions::default() };
    let catalog = Catalog::build(&raw, &options)?;
    assert_eq!(catalog.demand_by_id("NCliente1", "A")?, 0.0);
    assert_eq!(catalog.demand_by_id("NCliente1", "B")?, 4.0);
    assert_eq!(catalog.depot_capacity_by_id("NBodega1", "A")?, 7.0);
    assert_eq!(catalog.depot_capacity_by_id("NBodega2", "A")?, 0.0);
    Ok(())
  }

  #[test]
  fn unknown_keys_are_rejected() {
    let mut raw = raw_data(&[(0., 0.)], &[(1., 0.)], 10.0);
    raw.depot_capacities.push(DepotCapacityRecord { depot_id: "99".into(), capacity: vec![] });
    let err = Catalog::build(&raw, &CatalogOptions::default()).unwrap_err();
    assert_eq!(err, ModelError::unknown(EntityKind::Depot, "NBodega99"));

    let mut raw = raw_data(&[(0., 0.)], &[(1., 0.)], 10.0);
    raw.clients[0].demand.push(("Widgets".into(), 1.0));
    let err = Catalog::build(&raw, &CatalogOptions::default()).unwrap_err();
    assert_eq!(err, ModelError::unknown(EntityKind::Product, "Widgets"));

    let raw = raw_data(&[(0., 0.)], &[(1., 0.)], 10.0);
    let mut options = CatalogOptions::default();
    options.vehicle_classes.insert("Drone".into(), VehicleClass::default());
    let err = Catalog::build(&raw, &options).unwrap_err();
    assert_eq!(err, ModelError::unknown(EntityKind::VehicleClass, "Truck"));
  }

  #[test]
  fn lookups_of_unknown_ids_fail() -> anyhow::Result<()> {
    let catalog = Catalog::build(&raw_data(&[(0., 0.)], &[(1., 0.)], 10.0), &CatalogOptions::default())?;
    assert!(catalog.node_idx("NCliente7").is_err());
    assert!(catalog.vehicle_idx("Bicycle").is_err());
    assert!(catalog.depot_capacity_by_id("NCliente1", "Product").is_err());
    Ok(())
  }

  #[test]
  fn vehicle_classes_and_repeated_rows() -> anyhow::Result<()> {
    let mut raw = raw_data(&[(0., 0.)], &[(1., 0.)], 10.0);
    raw.vehicles = vec![
      VehicleRecord { vehicle_type: "gas car".into(), capacity: 50.0, product_capacity: vec![], range: 100.0, battery_capacity: None },
      VehicleRecord { vehicle_type: "Gas Car ".into(), capacity: 50.0, product_capacity: vec![], range: 100.0, battery_capacity: None },
      VehicleRecord { vehicle_type: "drone".into(), capacity: 5.0, product_capacity: vec![], range: 20.0, battery_capacity: Some(3.0) },
    ];
    let mut options = CatalogOptions::default();
    options.vehicle_classes.insert("Gas Car".into(), VehicleClass { metric: Some(Metric::Network), cost_per_distance: 5000.0, ..VehicleClass::default() });
    options.vehicle_classes.insert("Drone".into(), VehicleClass { metric: Some(Metric::Haversine), cost_per_distance: 500.0, ..VehicleClass::default() });
    let catalog = Catalog::build(&raw, &options)?;
    assert_eq!(catalog.vehicles().len(), 2);
    let car = catalog.vehicle(catalog.vehicle_idx("Gas Car")?);
    assert_eq!(car.metric, Metric::Network);
    assert_eq!(car.battery_capacity, 10.0);
    let drone = catalog.vehicle(catalog.vehicle_idx("Drone")?);
    assert_eq!(drone.battery_capacity, 3.0);
    assert_eq!(drone.cost_per_distance, 500.0);

    raw.vehicles[1].battery_capacity = Some(12.0);
    assert_eq!(
      Catalog::build(&raw, &options).unwrap_err(),
      ModelError::InvalidInput(InputError::DuplicateId { kind: EntityKind::VehicleType, id: "Gas Car".into() })
    );
    raw.vehicles[1].battery_capacity = None;
    raw.vehicles[1].capacity = 60.0;
    assert!(Catalog::build(&raw, &options).is_err());
    Ok(())
  }

  #[test]
  fn invalid_records() {
    let mut raw = raw_data(&[(0., 0.)], &[(1., 0.), (2., 0.)], 10.0);
    raw.clients[1].id = raw.clients[0].id.clone();
    assert!(matches!(
      Catalog::build(&raw, &CatalogOptions::default()),
      Err(ModelError::InvalidInput(InputError::DuplicateId { .. }))
    ));

    let mut raw = raw_data(&[(0., 0.)], &[(1., 0.)], 10.0);
    raw.clients[0].demand[0].1 = -1.0;
    assert!(matches!(
      Catalog::build(&raw, &CatalogOptions::default()),
      Err(ModelError::InvalidInput(InputError::NegativeAttribute { .. }))
    ));

    let raw = raw_data(&[(0., 0.)], &[], 10.0);
    assert_eq!(
      Catalog::build(&raw, &CatalogOptions::default()).unwrap_err(),
      ModelError::InvalidInput(InputError::EmptySet(EntityKind::Client))
    );
  }
}

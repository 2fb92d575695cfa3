use super::{ArcCosts, ModelOptions};
use crate::catalog::Catalog;
use crate::entities::{Capacity, NodeIdx, ProductIdx, VehicleIdx};
use crate::milp::{Constr, Instance, LinExpr, Var};
use crate::{map_with_capacity, Map};
use itertools::iproduct;

pub struct AssignmentVars {
  /// `x[c,d,v]`: client `c` is served from depot `d` by vehicle type `v`
  pub x: Map<(NodeIdx, NodeIdx, VehicleIdx), Var>,
}

impl AssignmentVars {
  pub fn build(catalog: &Catalog, instance: &mut Instance) -> Self {
    let n = catalog.clients().len() * catalog.depots().len() * catalog.vehicles().len();
    let mut x = map_with_capacity(n);
    for (c, d, v) in iproduct!(catalog.clients(), catalog.depots(), catalog.vehicles()) {
      let name = format!("x[{},{},{}]", catalog.node(c).id, catalog.node(d).id, catalog.vehicle(v).id);
      x.insert((c, d, v), instance.add_binvar(name));
    }
    AssignmentVars { x }
  }

  pub fn objective(&self, catalog: &Catalog, costs: &ArcCosts) -> LinExpr {
    self.x.iter()
      .map(|(&(c, d, v), &x)| {
        let vehicle = catalog.vehicle(v);
        (costs.travel_cost(v, d, c) + vehicle.fixed_cost + vehicle.loading_cost, x)
      })
      .sum()
  }
}

pub struct AssignmentConstraints {
  pub assign: Map<NodeIdx, Constr>,
  pub capacity: Map<(NodeIdx, VehicleIdx, Option<ProductIdx>), Constr>,
  pub depot_capacity: Map<(NodeIdx, ProductIdx), Constr>,
  pub range: Map<(NodeIdx, NodeIdx, VehicleIdx), Constr>,
  /// Per vehicle type, over the one-way trips to its clients
  pub time_cap: Map<VehicleIdx, Constr>,
  pub loading_time: Map<VehicleIdx, Constr>,
  pub co2: Map<VehicleIdx, Constr>,
}

impl AssignmentConstraints {
  pub fn build(catalog: &Catalog, costs: &ArcCosts, options: &ModelOptions, vars: &AssignmentVars, instance: &mut Instance) -> Self {
    let mut assign = map_with_capacity(catalog.clients().len());
    for c in catalog.clients() {
      let lhs: LinExpr = iproduct!(catalog.depots(), catalog.vehicles()).map(|(d, v)| vars.x[&(c, d, v)]).sum();
      assign.insert(c, instance.add_constr(format!("assign[{}]", catalog.node(c).id), lhs.equals(1.0)));
    }

    let mut capacity = Map::default();
    for (d, v) in iproduct!(catalog.depots(), catalog.vehicles()) {
      let vehicle = catalog.vehicle(v);
      let (did, vid) = (&catalog.node(d).id, &vehicle.id);
      match &vehicle.capacity {
        Capacity::Total(cap) => {
          let lhs: LinExpr = catalog.clients().map(|c| (catalog.total_demand(c), vars.x[&(c, d, v)])).sum();
          capacity.insert((d, v, None), instance.add_constr(format!("cap[{},{}]", did, vid), lhs.leq(*cap)));
        }
        Capacity::PerProduct(caps) => {
          for p in catalog.products() {
            let lhs: LinExpr = catalog.clients().map(|c| (catalog.demand(c, p), vars.x[&(c, d, v)])).sum();
            let name = format!("cap[{},{},{}]", did, vid, catalog.product_names()[p]);
            capacity.insert((d, v, Some(p)), instance.add_constr(name, lhs.leq(caps[p])));
          }
        }
      }
    }

    let mut depot_capacity = Map::default();
    if options.depot_capacity {
      for (d, p) in iproduct!(catalog.depots(), catalog.products()) {
        let lhs: LinExpr = iproduct!(catalog.clients(), catalog.vehicles())
          .map(|(c, v)| (catalog.demand(c, p), vars.x[&(c, d, v)]))
          .sum();
        let name = format!("depot_cap[{},{}]", catalog.node(d).id, catalog.product_names()[p]);
        depot_capacity.insert((d, p), instance.add_constr(name, lhs.leq(catalog.depot_capacity(d, p))));
      }
    }

    let mut range = Map::default();
    if let Some(cap) = options.distance_cap {
      for (c, d, v) in iproduct!(catalog.clients(), catalog.depots(), catalog.vehicles()) {
        let bound = cap.bound(catalog.vehicle(v));
        let x = vars.x[&(c, d, v)];
        let name = format!("range[{},{},{}]", catalog.node(c).id, catalog.node(d).id, catalog.vehicle(v).id);
        range.insert((c, d, v), instance.add_constr(name, (x * costs.distance(v, d, c)).leq(bound)));
      }
    }

    let mut time_cap = Map::default();
    if let Some(cap) = options.time_cap_hours {
      for v in catalog.vehicles() {
        let lhs: LinExpr = iproduct!(catalog.clients(), catalog.depots())
          .map(|(c, d)| (costs.hours(v, d, c), vars.x[&(c, d, v)]))
          .sum();
        time_cap.insert(v, instance.add_constr(format!("time_cap[{}]", catalog.vehicle(v).id), lhs.leq(cap)));
      }
    }

    let mut loading_time = Map::default();
    if let Some(cap) = options.loading_time_cap_hours {
      for v in catalog.vehicles() {
        let hours = catalog.vehicle(v).loading_time;
        let lhs: LinExpr = iproduct!(catalog.clients(), catalog.depots())
          .map(|(c, d)| (hours, vars.x[&(c, d, v)]))
          .sum();
        loading_time.insert(v, instance.add_constr(format!("loading_time[{}]", catalog.vehicle(v).id), lhs.leq(cap)));
      }
    }

    let mut co2 = Map::default();
    if let Some(limit) = options.co2_limit {
      for v in catalog.vehicles() {
        let rate = catalog.vehicle(v).emission_rate;
        let lhs: LinExpr = iproduct!(catalog.clients(), catalog.depots())
          .map(|(c, d)| (costs.distance(v, d, c) * rate, vars.x[&(c, d, v)]))
          .sum();
        co2.insert(v, instance.add_constr(format!("co2[{}]", catalog.vehicle(v).id), lhs.leq(limit)));
      }
    }

    AssignmentConstraints { assign, capacity, depot_capacity, range, time_cap, loading_time, co2 }
  }
}

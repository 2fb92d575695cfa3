use super::horizon::HorizonVars;
use super::{ArcCosts, ModelOptions};
use crate::catalog::Catalog;
use crate::entities::{Capacity, Day, NodeIdx, ProductIdx, VehicleIdx};
use crate::milp::{Constr, Instance, LinExpr, Var};
use crate::{map_with_capacity, Map};
use itertools::{iproduct, Itertools};
use tracing::trace;

pub type ArcKey = (NodeIdx, NodeIdx, VehicleIdx, Day);

pub struct RoutingVars {
  /// Nodes of the routing graph, in catalog order
  pub nodes: Vec<NodeIdx>,
  pub days: Vec<Day>,
  pub y: Map<ArcKey, Var>,
  pub u: Map<(NodeIdx, VehicleIdx, Day), Var>,
  pub horizon: Option<HorizonVars>,
}

impl RoutingVars {
  pub fn build(catalog: &Catalog, options: &ModelOptions, days: &[Day], instance: &mut Instance) -> Self {
    let mut nodes: Vec<NodeIdx> = catalog.depots().chain(catalog.clients()).collect();
    if options.recharge {
      nodes.extend(catalog.recharge_nodes());
    }
    let n = nodes.len();

    let mut y = map_with_capacity(n * n * catalog.vehicles().len() * days.len());
    let mut u = map_with_capacity(catalog.clients().len() * catalog.vehicles().len() * days.len());
    for &t in days {
      for v in catalog.vehicles() {
        let vid = &catalog.vehicle(v).id;
        for (&o, &d) in nodes.iter().cartesian_product(&nodes) {
          if o == d || (catalog.is_depot(o) && catalog.is_depot(d)) {
            continue;
          }
          let name = format!("y[{},{},{},{}]", catalog.node(o).id, catalog.node(d).id, vid, t);
          y.insert((o, d, v, t), instance.add_binvar(name));
        }
        for c in catalog.clients() {
          let name = format!("u[{},{},{}]", catalog.node(c).id, vid, t);
          u.insert((c, v, t), instance.add_ctsvar(name, 0.0, (n - 1) as f64));
        }
      }
    }
    trace!(y = y.len(), u = u.len(), "routing variables");
    RoutingVars { nodes, days: days.to_vec(), y, u, horizon: None }
  }

  /// Arcs of vehicle `v` on day `t` leaving `o`.
  pub fn outgoing<'a>(&'a self, o: NodeIdx, v: VehicleIdx, t: Day) -> impl Iterator<Item=Var> + 'a {
    self.nodes.iter().filter_map(move |&d| self.y.get(&(o, d, v, t)).copied())
  }

  pub fn incoming<'a>(&'a self, d: NodeIdx, v: VehicleIdx, t: Day) -> impl Iterator<Item=Var> + 'a {
    self.nodes.iter().filter_map(move |&o| self.y.get(&(o, d, v, t)).copied())
  }

  /// `Σ dist_v[o,d]·y[o,d,v,t]`
  pub fn distance_travelled(&self, costs: &ArcCosts, v: VehicleIdx, t: Day) -> LinExpr {
    self.nodes.iter()
      .cartesian_product(&self.nodes)
      .filter_map(|(&o, &d)| self.y.get(&(o, d, v, t)).map(|&y| (costs.distance(v, o, d), y)))
      .sum()
  }

  /// `Σ hours_v[o,d]·y[o,d,v,t]`
  pub fn time_travelled(&self, costs: &ArcCosts, v: VehicleIdx, t: Day) -> LinExpr {
    self.nodes.iter()
      .cartesian_product(&self.nodes)
      .filter_map(|(&o, &d)| self.y.get(&(o, d, v, t)).map(|&y| (costs.hours(v, o, d), y)))
      .sum()
  }

  /// Travel, dispatch, loading and recharge cost of every arc.
  pub fn objective(&self, catalog: &Catalog, costs: &ArcCosts) -> LinExpr {
    let mut obj = LinExpr::new();
    for (&(o, d, v, _), &y) in &self.y {
      let vehicle = catalog.vehicle(v);
      let mut coeff = costs.travel_cost(v, o, d);
      if catalog.is_depot(o) {
        coeff += vehicle.fixed_cost;
      }
      if catalog.is_client(d) {
        coeff += vehicle.loading_cost;
      }
      if let Some(r) = catalog.node(o).recharge {
        coeff += r.tariff * vehicle.battery_capacity + vehicle.battery_capacity / r.rate;
      }
      obj += (coeff, y);
    }
    obj
  }
}

pub struct RoutingConstraints {
  pub flow: Map<(NodeIdx, VehicleIdx, Day), Constr>,
  pub single_visit: Map<(NodeIdx, Day), Constr>,
  pub mtz: Map<(NodeIdx, NodeIdx, VehicleIdx, Day), Constr>,
  /// Keyed by product for per-product capacities, `None` for a total capacity
  pub vehicle_capacity: Map<(VehicleIdx, Option<ProductIdx>, Day), Constr>,
  pub depot_capacity: Map<(NodeIdx, ProductIdx, Day), Constr>,
  pub distance_cap: Map<(VehicleIdx, Day), Constr>,
  pub route_limit: Map<(VehicleIdx, Day), Constr>,
  pub time_cap: Map<(VehicleIdx, Day), Constr>,
  pub loading_time: Map<(VehicleIdx, Day), Constr>,
  pub co2: Map<VehicleIdx, Constr>,
}

impl RoutingConstraints {
  pub fn build(catalog: &Catalog, costs: &ArcCosts, options: &ModelOptions, vars: &RoutingVars, instance: &mut Instance) -> Self {
    let n = vars.nodes.len() as f64;
    let vehicles = catalog.vehicles();

    let flow = {
      let mut cmap = map_with_capacity(catalog.clients().len() * vehicles.len() * vars.days.len());
      for (&t, v, c) in iproduct!(&vars.days, vehicles.clone(), catalog.clients()) {
        let inflow: LinExpr = vars.incoming(c, v, t).sum();
        let outflow: LinExpr = vars.outgoing(c, v, t).sum();
        let name = format!("flow[{},{},{}]", catalog.node(c).id, catalog.vehicle(v).id, t);
        cmap.insert((c, v, t), instance.add_constr(name, inflow.equals(outflow)));
      }
      cmap
    };

    let single_visit = {
      let mut cmap = map_with_capacity(catalog.clients().len() * vars.days.len());
      for (&t, c) in vars.days.iter().cartesian_product(catalog.clients()) {
        let visits: LinExpr = vehicles.clone().flat_map(|v| vars.incoming(c, v, t)).sum();
        let name = format!("visit[{},{}]", catalog.node(c).id, t);
        cmap.insert((c, t), instance.add_constr(name, visits.equals(1.0)));
      }
      cmap
    };

    let mtz = {
      let mut cmap = Map::default();
      for (&t, v, i) in iproduct!(&vars.days, vehicles.clone(), catalog.clients()) {
        for j in catalog.clients() {
          if i == j {
            continue;
          }
          let lhs = vars.u[&(i, v, t)] - vars.u[&(j, v, t)] + vars.y[&(i, j, v, t)] * n;
          let name = format!("mtz[{},{},{},{}]", catalog.node(i).id, catalog.node(j).id, catalog.vehicle(v).id, t);
          cmap.insert((i, j, v, t), instance.add_constr(name, lhs.leq(n - 1.0)));
        }
      }
      cmap
    };

    // demand served by v, counted on the arc leaving each client
    let served = |v: VehicleIdx, t: Day, q: &dyn Fn(NodeIdx) -> f64| -> LinExpr {
      catalog.clients()
        .flat_map(|c| vars.outgoing(c, v, t).map(move |y| (q(c), y)))
        .sum()
    };

    let vehicle_capacity = {
      let mut cmap = Map::default();
      for (&t, v) in vars.days.iter().cartesian_product(vehicles.clone()) {
        let vehicle = catalog.vehicle(v);
        match &vehicle.capacity {
          Capacity::Total(cap) => {
            let lhs = served(v, t, &|c| catalog.total_demand(c));
            let name = format!("veh_cap[{},{}]", vehicle.id, t);
            cmap.insert((v, None, t), instance.add_constr(name, lhs.leq(*cap)));
          }
          Capacity::PerProduct(caps) => {
            for p in catalog.products() {
              let lhs = served(v, t, &|c| catalog.demand(c, p));
              let name = format!("veh_cap[{},{},{}]", vehicle.id, catalog.product_names()[p], t);
              cmap.insert((v, Some(p), t), instance.add_constr(name, lhs.leq(caps[p])));
            }
          }
        }
      }
      cmap
    };

    let mut depot_capacity = Map::default();
    if options.depot_capacity {
      for (&t, d, p) in iproduct!(&vars.days, catalog.depots(), catalog.products()) {
        let lhs: LinExpr = iproduct!(catalog.clients(), vehicles.clone())
          .filter_map(|(c, v)| vars.y.get(&(c, d, v, t)).map(|&y| (catalog.demand(c, p), y)))
          .sum();
        let name = format!("depot_cap[{},{},{}]", catalog.node(d).id, catalog.product_names()[p], t);
        depot_capacity.insert((d, p, t), instance.add_constr(name, lhs.leq(catalog.depot_capacity(d, p))));
      }
    }

    let mut distance_cap = Map::default();
    if let Some(cap) = options.distance_cap {
      for (&t, v) in vars.days.iter().cartesian_product(vehicles.clone()) {
        let bound = cap.bound(catalog.vehicle(v));
        let name = format!("dist_cap[{},{}]", catalog.vehicle(v).id, t);
        distance_cap.insert((v, t), instance.add_constr(name, vars.distance_travelled(costs, v, t).leq(bound)));
      }
    }

    let mut route_limit = Map::default();
    if let Some(k) = options.max_routes_per_vehicle {
      for (&t, v) in vars.days.iter().cartesian_product(vehicles.clone()) {
        let departures: LinExpr = catalog.depots().flat_map(|d| vars.outgoing(d, v, t)).sum();
        let name = format!("routes[{},{}]", catalog.vehicle(v).id, t);
        route_limit.insert((v, t), instance.add_constr(name, departures.leq(k as f64)));
      }
    }

    let mut time_cap = Map::default();
    if let Some(cap) = options.time_cap_hours {
      for (&t, v) in vars.days.iter().cartesian_product(vehicles.clone()) {
        let name = format!("time_cap[{},{}]", catalog.vehicle(v).id, t);
        time_cap.insert((v, t), instance.add_constr(name, vars.time_travelled(costs, v, t).leq(cap)));
      }
    }

    let mut loading_time = Map::default();
    if let Some(cap) = options.loading_time_cap_hours {
      for (&t, v) in vars.days.iter().cartesian_product(vehicles.clone()) {
        let hours = catalog.vehicle(v).loading_time;
        let lhs: LinExpr = catalog.clients().flat_map(|c| vars.incoming(c, v, t)).map(|y| (hours, y)).sum();
        let name = format!("loading_time[{},{}]", catalog.vehicle(v).id, t);
        loading_time.insert((v, t), instance.add_constr(name, lhs.leq(cap)));
      }
    }

    let mut co2 = Map::default();
    if let Some(limit) = options.co2_limit {
      for v in vehicles.clone() {
        let rate = catalog.vehicle(v).emission_rate;
        let mut emitted = LinExpr::new();
        for &t in &vars.days {
          for &(var, d) in vars.distance_travelled(costs, v, t).terms() {
            emitted += (d * rate, var);
          }
        }
        let name = format!("co2[{}]", catalog.vehicle(v).id);
        co2.insert(v, instance.add_constr(name, emitted.leq(limit)));
      }
    }

    RoutingConstraints {
      flow,
      single_visit,
      mtz,
      vehicle_capacity,
      depot_capacity,
      distance_cap,
      route_limit,
      time_cap,
      loading_time,
      co2,
    }
  }
}

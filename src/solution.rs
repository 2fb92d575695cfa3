use crate::catalog::Catalog;
use crate::distance::TravelMatrices;
use crate::entities::{Day, NodeIdx, VehicleIdx};
use crate::graph::{DecomposableDigraph, Walk, WalkKind};
use crate::milp::Assignment;
use crate::model::{BuiltModel, ModelVars};
use crate::utils::IoContext;
use crate::{Map, Result};
use itertools::Itertools;
use serde::Serialize;
use smallvec::SmallVec;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// Binary variables above this value are taken as 1.
pub const ACTIVE_THRESHOLD: f64 = 0.5;

#[inline(always)]
pub fn is_active(value: f64) -> bool {
  value > ACTIVE_THRESHOLD
}

/// The arcs each vehicle type uses on each day.
#[derive(Debug, Clone, Default)]
pub struct ArcSelection {
  arcs: Map<(VehicleIdx, Day), Vec<(NodeIdx, NodeIdx)>>,
  days: Vec<Day>,
  direct: bool,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct VisitCount {
  pub inbound: usize,
  pub outbound: usize,
}

impl ArcSelection {
  #[tracing::instrument(level = "debug", skip_all)]
  pub fn from_assignment(model: &BuiltModel, values: &Assignment) -> Self {
    let mut arcs: Map<_, Vec<_>> = Map::default();
    let direct = match &model.vars {
      ModelVars::Routing(vars) => {
        for (&(o, d, v, t), &y) in &vars.y {
          if is_active(values.value(y)) {
            arcs.entry((v, t)).or_default().push((o, d));
          }
        }
        false
      }
      ModelVars::Assignment(vars) => {
        for (&(c, d, v), &x) in &vars.x {
          if is_active(values.value(x)) {
            arcs.entry((v, 1)).or_default().push((d, c));
          }
        }
        true
      }
    };
    for list in arcs.values_mut() {
      list.sort_unstable();
    }
    trace!(?arcs);
    ArcSelection { arcs, days: model.days.clone(), direct }
  }

  pub fn arcs(&self, v: VehicleIdx, t: Day) -> &[(NodeIdx, NodeIdx)] {
    self.arcs.get(&(v, t)).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Groups in `(vehicle type, day)` order.
  pub fn iter(&self) -> impl Iterator<Item=((VehicleIdx, Day), &[(NodeIdx, NodeIdx)])> + '_ {
    self.arcs.keys().copied().sorted().map(move |k| (k, self.arcs[&k].as_slice()))
  }

  pub fn len(&self) -> usize {
    self.arcs.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_multi_day(&self) -> bool {
    self.days.len() > 1
  }

  /// Arcs entering and leaving every client on every day, summed over vehicle types.
  pub fn visit_counts(&self, catalog: &Catalog) -> Map<(NodeIdx, Day), VisitCount> {
    let mut counts: Map<_, VisitCount> = catalog.clients()
      .cartesian_product(self.days.iter().copied())
      .map(|k| (k, VisitCount::default()))
      .collect();
    for (&(_, t), arcs) in &self.arcs {
      for &(o, d) in arcs {
        if let Some(c) = counts.get_mut(&(o, t)) {
          c.outbound += 1;
        }
        if let Some(c) = counts.get_mut(&(d, t)) {
          c.inbound += 1;
        }
      }
    }
    counts
  }

  #[tracing::instrument(level = "debug", skip_all)]
  pub fn routes(&self, catalog: &Catalog) -> RouteSet {
    let mut routes = Vec::new();
    for ((v, t), arcs) in self.iter() {
      if self.direct {
        routes.extend(arcs.iter().map(|&(d, c)| Route { vehicle: v, day: t, kind: RouteKind::Direct, nodes: vec![d, c] }));
        continue;
      }
      let graph = ArcGraph::new(catalog, arcs);
      let mut group: Vec<_> = graph.decompose().into_iter()
        .map(|walk| Route::from_walk(v, t, walk, catalog))
        .collect();
      splice_recharge_cycles(&mut group, catalog);
      for route in &group {
        debug!(vehicle=v, day=t, kind=?route.kind, nodes=?route.nodes);
      }
      routes.extend(group);
    }
    let set = RouteSet { routes, multi_day: self.is_multi_day() };
    let subtours = set.count(RouteKind::Subtour);
    if subtours > 0 {
      warn!(subtours, "solution contains closed cycles that visit no depot");
    }
    set
  }
}

/// Recharge nodes may be visited more than once, so a route can pass through one, leave on a detour and come back.
/// The decomposition sees the detour as a separate cycle; this puts it back into the route it belongs to.
fn splice_recharge_cycles(routes: &mut Vec<Route>, catalog: &Catalog) {
  loop {
    let splice = routes.iter().enumerate()
      .filter(|(_, r)| r.kind == RouteKind::Subtour)
      .find_map(|(ci, cycle)| {
        cycle.nodes.iter().enumerate()
          .filter(|&(_, &n)| catalog.is_recharge(n))
          .find_map(|(k, &n)| {
            let host = routes.iter().position(|r| r.kind != RouteKind::Subtour && r.nodes.contains(&n))?;
            Some((ci, host, k, n))
          })
      });
    let (ci, host, k, node) = match splice {
      Some(s) => s,
      None => break,
    };
    let cycle = routes.remove(ci);
    let host = &mut routes[if host > ci { host - 1 } else { host }];
    // cycle.nodes repeats its first node at the end
    let len = cycle.nodes.len() - 1;
    let detour: Vec<_> = (1..=len).map(|i| cycle.nodes[(k + i) % len]).collect();
    let at = host.nodes.iter().position(|&n| n == node).map_or(0, |i| i + 1);
    trace!(?detour, host=?host.nodes, "splicing recharge detour");
    host.nodes.splice(at..at, detour);
  }
}

struct ArcGraph<'a> {
  catalog: &'a Catalog,
  succ: Map<NodeIdx, SmallVec<[NodeIdx; 2]>>,
}

impl<'a> ArcGraph<'a> {
  fn new(catalog: &'a Catalog, arcs: &[(NodeIdx, NodeIdx)]) -> Self {
    let mut succ: Map<_, SmallVec<_>> = Map::default();
    for &(o, d) in arcs {
      succ.entry(o).or_default().push(d);
    }
    ArcGraph { catalog, succ }
  }
}

impl DecomposableDigraph<NodeIdx, (NodeIdx, NodeIdx), u8> for ArcGraph<'_> {
  fn is_sink(&self, node: &NodeIdx) -> bool {
    self.catalog.is_depot(*node)
  }

  fn next_start(&self) -> Option<NodeIdx> {
    let depot = self.succ.keys().copied().filter(|&n| self.catalog.is_depot(n)).min();
    depot.or_else(|| self.succ.keys().copied().min())
  }

  fn next_outgoing_arc(&self, node: &NodeIdx) -> Option<((NodeIdx, NodeIdx), NodeIdx, u8)> {
    let next = *self.succ.get(node)?.first()?;
    Some(((*node, next), next, 1))
  }

  fn subtract_arc(&mut self, &(o, d): &(NodeIdx, NodeIdx), _: u8) {
    if let Some(list) = self.succ.get_mut(&o) {
      if let Some(k) = list.iter().position(|&n| n == d) {
        list.remove(k);
      }
      if list.is_empty() {
        self.succ.remove(&o);
      }
    }
  }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
  /// Leaves a depot and returns to a depot
  Tour,
  /// Closed cycle through no depot
  Subtour,
  /// Does not start at a depot or stops before reaching one
  Open,
  /// Single depot-to-client assignment
  Direct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
  pub vehicle: VehicleIdx,
  pub day: Day,
  pub kind: RouteKind,
  /// Visited nodes in order.  For a subtour the first node is repeated at the end.
  pub nodes: Vec<NodeIdx>,
}

impl Route {
  fn from_walk(vehicle: VehicleIdx, day: Day, walk: Walk<(NodeIdx, NodeIdx), u8>, catalog: &Catalog) -> Self {
    let mut nodes = Vec::with_capacity(walk.arcs.len() + 1);
    nodes.push(walk.arcs[0].0);
    nodes.extend(walk.arcs.iter().map(|&(_, d)| d));
    let kind = match walk.kind {
      WalkKind::Path if catalog.is_depot(nodes[0]) => RouteKind::Tour,
      WalkKind::Cycle if !nodes.iter().any(|&n| catalog.is_depot(n)) => RouteKind::Subtour,
      WalkKind::Cycle => RouteKind::Open,
      WalkKind::Path | WalkKind::DeadEnd => RouteKind::Open,
    };
    Route { vehicle, day, kind, nodes }
  }

  pub fn arcs(&self) -> impl Iterator<Item=(NodeIdx, NodeIdx)> + '_ {
    self.nodes.iter().copied().tuple_windows()
  }

  pub fn clients<'a>(&'a self, catalog: &'a Catalog) -> impl Iterator<Item=NodeIdx> + 'a {
    self.nodes.iter().copied().filter(move |&n| catalog.is_client(n))
  }

  /// Quantity of each product on board along each arc: the demand of every client still to be visited.
  pub fn arc_loads(&self, catalog: &Catalog) -> Vec<Vec<f64>> {
    let n_products = catalog.product_names().len();
    let mut load = vec![0.0; n_products];
    let mut loads = Vec::with_capacity(self.nodes.len().saturating_sub(1));
    for &n in self.nodes[1..].iter().rev() {
      if catalog.is_client(n) {
        for p in catalog.products() {
          load[p] += catalog.demand(n, p);
        }
      }
      loads.push(load.clone());
    }
    loads.reverse();
    loads
  }

  pub fn distance(&self, catalog: &Catalog, travel: &TravelMatrices) -> Result<f64> {
    let metric = catalog.vehicle(self.vehicle).metric;
    let mut total = 0.0;
    for (o, d) in self.arcs() {
      total += travel.distance(metric, o, d)?;
    }
    Ok(total)
  }
}

/// One line of the routes table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRow {
  pub vehicle_type: String,
  pub origin: String,
  pub destination: String,
  pub day: Option<Day>,
  pub load: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
  pub vehicle_type: String,
  pub day: Day,
  pub kind: RouteKind,
  pub nodes: Vec<String>,
  pub distance: f64,
  /// Per product, on leaving the first node
  pub load: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionSummary {
  pub objective: Option<f64>,
  pub products: Vec<String>,
  pub total_distance: f64,
  pub tours: usize,
  pub subtours: usize,
  pub open: usize,
  pub routes: Vec<RouteSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteSet {
  pub routes: Vec<Route>,
  pub multi_day: bool,
}

impl RouteSet {
  pub fn count(&self, kind: RouteKind) -> usize {
    self.routes.iter().filter(|r| r.kind == kind).count()
  }

  pub fn subtours(&self) -> impl Iterator<Item=&Route> {
    self.routes.iter().filter(|r| r.kind == RouteKind::Subtour)
  }

  pub fn rows(&self, catalog: &Catalog) -> Vec<RouteRow> {
    let mut rows = Vec::new();
    for route in &self.routes {
      let vehicle_type = &catalog.vehicle(route.vehicle).id;
      for ((o, d), load) in route.arcs().zip(route.arc_loads(catalog)) {
        rows.push(RouteRow {
          vehicle_type: vehicle_type.clone(),
          origin: catalog.node(o).id.clone(),
          destination: catalog.node(d).id.clone(),
          day: if self.multi_day { Some(route.day) } else { None },
          load,
        });
      }
    }
    rows
  }

  fn header(&self, catalog: &Catalog) -> Vec<String> {
    let mut header = vec!["vehicle_type".to_string(), "origin".to_string(), "destination".to_string()];
    if self.multi_day {
      header.push("day".to_string());
    }
    header.extend(catalog.product_names().iter().cloned());
    header
  }

  pub fn write_csv_to<W: std::io::Write>(&self, catalog: &Catalog, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(self.header(catalog))?;
    for row in self.rows(catalog) {
      let mut record = vec![row.vehicle_type, row.origin, row.destination];
      if let Some(t) = row.day {
        record.push(t.to_string());
      }
      record.extend(row.load.iter().map(|q| crate::utils::fmt_num(*q).to_string()));
      writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
  }

  pub fn write_csv(&self, catalog: &Catalog, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).write_context(path)?;
    self.write_csv_to(catalog, std::io::BufWriter::new(file))?;
    info!(path=%path.display(), "routes written");
    Ok(())
  }

  pub fn summary(&self, catalog: &Catalog, travel: &TravelMatrices, objective: Option<f64>) -> Result<SolutionSummary> {
    let mut routes = Vec::with_capacity(self.routes.len());
    for route in &self.routes {
      routes.push(RouteSummary {
        vehicle_type: catalog.vehicle(route.vehicle).id.clone(),
        day: route.day,
        kind: route.kind,
        nodes: route.nodes.iter().map(|&n| catalog.node(n).id.clone()).collect(),
        distance: route.distance(catalog, travel)?,
        load: route.arc_loads(catalog).into_iter().next().unwrap_or_default(),
      });
    }
    Ok(SolutionSummary {
      objective,
      products: catalog.product_names().to_vec(),
      total_distance: routes.iter().map(|r| r.distance).sum(),
      tours: self.count(RouteKind::Tour) + self.count(RouteKind::Direct),
      subtours: self.count(RouteKind::Subtour),
      open: self.count(RouteKind::Open),
      routes,
    })
  }

  pub fn pretty_print(&self, catalog: &Catalog) {
    use prettytable::*;

    for ((v, t), routes) in &self.routes.iter().group_by(|r| (r.vehicle, r.day)) {
      let mut table = Table::new();
      table.set_titles(row!["Kind", "Route", "Load"]);
      for route in routes {
        let path = route.nodes.iter().map(|&n| catalog.node(n).id.as_str()).join(" -> ");
        let load = route.arc_loads(catalog).into_iter().next().unwrap_or_default();
        let load = load.iter().map(|q| crate::utils::fmt_num(*q).to_string()).join("/");
        table.add_row(row![format!("{:?}", route.kind), path, load]);
      }
      if self.multi_day {
        println!("Vehicle type {} (day {})", catalog.vehicle(v).id, t);
      } else {
        println!("Vehicle type {}", catalog.vehicle(v).id);
      }
      table.printstd();
    }
  }
}

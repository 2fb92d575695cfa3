use super::routing::RoutingVars;
use super::{ArcCosts, HorizonOptions, ModelOptions};
use crate::catalog::Catalog;
use crate::entities::{Day, VehicleIdx};
use crate::milp::{Constr, Instance, LinExpr, Var};
use crate::Map;
use itertools::Itertools;
use tracing::debug;

pub struct HorizonVars {
  /// Accumulated distance at the end of the day
  pub km: Map<(VehicleIdx, Day), Var>,
  /// Maintenance flag
  pub w: Map<(VehicleIdx, Day), Var>,
}

impl HorizonVars {
  pub fn build(catalog: &Catalog, days: &[Day], instance: &mut Instance) -> Self {
    let mut km = Map::default();
    let mut w = Map::default();
    for (v, &t) in catalog.vehicles().cartesian_product(days) {
      let vid = &catalog.vehicle(v).id;
      km.insert((v, t), instance.add_ctsvar(format!("km[{},{}]", vid, t), 0.0, f64::INFINITY));
      w.insert((v, t), instance.add_binvar(format!("w[{},{}]", vid, t)));
    }
    HorizonVars { km, w }
  }

  pub fn objective(&self, catalog: &Catalog) -> LinExpr {
    self.w.iter()
      .map(|(&(v, _), &w)| (catalog.vehicle(v).maintenance_cost, w))
      .sum()
  }
}

pub struct HorizonConstraints {
  pub km_recurrence: Map<(VehicleIdx, Day), Constr>,
  pub maintenance: Map<(VehicleIdx, Day), Constr>,
  /// Big-M coefficient of the maintenance trigger, per vehicle type
  pub big_m: Map<VehicleIdx, f64>,
}

/// Upper bound on the accumulated distance of `v` over the whole horizon.  A single day can never use an arc
/// twice, so the sum of every arc length bounds the daily increment, as does the distance cap when one is set.
fn big_m(v: VehicleIdx, costs: &ArcCosts, options: &ModelOptions, vars: &RoutingVars, catalog: &Catalog) -> f64 {
  let first_day = vars.days[0];
  let all_arcs: f64 = vars.distance_travelled(costs, v, first_day).terms().iter().map(|(_, d)| d).sum();
  let per_day = match options.distance_cap {
    Some(cap) => all_arcs.min(cap.bound(catalog.vehicle(v))),
    None => all_arcs,
  };
  per_day * vars.days.len() as f64
}

impl HorizonConstraints {
  pub fn build(
    catalog: &Catalog,
    costs: &ArcCosts,
    options: &ModelOptions,
    horizon: &HorizonOptions,
    vars: &RoutingVars,
    hv: &HorizonVars,
    instance: &mut Instance,
  ) -> Self {
    let mut km_recurrence = Map::default();
    let mut maintenance = Map::default();
    let mut big_ms = Map::default();

    for v in catalog.vehicles() {
      let vid = &catalog.vehicle(v).id;
      let m = big_m(v, costs, options, vars, catalog);
      debug!(vehicle=%vid, big_m=m, "maintenance trigger");
      big_ms.insert(v, m);

      for (k, &t) in vars.days.iter().enumerate() {
        let mut rhs = vars.distance_travelled(costs, v, t);
        if k > 0 {
          rhs += hv.km[&(v, vars.days[k - 1])];
        }
        let km = hv.km[&(v, t)];
        let c = instance.add_constr(format!("km_acc[{},{}]", vid, t), LinExpr::from(km).equals(rhs));
        km_recurrence.insert((v, t), c);

        let lhs = km - hv.w[&(v, t)] * m;
        let c = instance.add_constr(format!("maint[{},{}]", vid, t), lhs.leq(horizon.maintenance_threshold));
        maintenance.insert((v, t), c);
      }
    }

    HorizonConstraints { km_recurrence, maintenance, big_m: big_ms }
  }
}

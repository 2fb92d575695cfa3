pub mod assignment;
pub mod horizon;
pub mod mtz;
pub mod routing;

use crate::catalog::Catalog;
use crate::distance::TravelMatrices;
use crate::entities::{Day, Metric, NodeIdx, VehicleIdx, VehicleType};
use crate::error::ModelError;
use crate::milp::Instance;
use assignment::{AssignmentConstraints, AssignmentVars};
use horizon::{HorizonConstraints, HorizonVars};
use routing::{RoutingConstraints, RoutingVars};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formulation {
  /// Arc-flow routing with MTZ subtour elimination
  Routing,
  /// Direct client-to-(depot, vehicle) assignment, no sequencing
  Assignment,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceCap {
  VehicleRange,
  Fixed(f64),
}

impl DistanceCap {
  pub fn bound(&self, vehicle: &VehicleType) -> f64 {
    match self {
      DistanceCap::VehicleRange => vehicle.range,
      DistanceCap::Fixed(x) => *x,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonOptions {
  pub days: Day,
  /// Accumulated distance above which a maintenance must be scheduled
  pub maintenance_threshold: f64,
}

impl Default for HorizonOptions {
  fn default() -> Self {
    HorizonOptions { days: 3, maintenance_threshold: 10_000.0 }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelOptions {
  pub formulation: Formulation,
  pub depot_capacity: bool,
  pub distance_cap: Option<DistanceCap>,
  pub recharge: bool,
  pub horizon: Option<HorizonOptions>,
  /// Total CO2 allowed per vehicle type over all days
  pub co2_limit: Option<f64>,
  /// Bounds the depot departures of each vehicle type per day
  pub max_routes_per_vehicle: Option<usize>,
  /// Travel hours allowed per vehicle type and day
  pub time_cap_hours: Option<f64>,
  /// Loading hours allowed per vehicle type and day
  pub loading_time_cap_hours: Option<f64>,
}

impl Default for ModelOptions {
  fn default() -> Self {
    ModelOptions {
      formulation: Formulation::Routing,
      depot_capacity: false,
      distance_cap: None,
      recharge: false,
      horizon: None,
      co2_limit: None,
      max_routes_per_vehicle: None,
      time_cap_hours: None,
      loading_time_cap_hours: None,
    }
  }
}

impl ModelOptions {
  pub fn days(&self) -> Vec<Day> {
    match &self.horizon {
      Some(h) => (1..=h.days).collect(),
      None => vec![1],
    }
  }

  fn check(&self, catalog: &Catalog) -> Result<(), ModelError> {
    if self.recharge && catalog.recharge_nodes().is_empty() {
      return Err(ModelError::InvalidConfig("recharge is enabled but the scenario has no recharge nodes".into()));
    }
    if let Some(h) = &self.horizon {
      if h.days == 0 {
        return Err(ModelError::InvalidConfig("horizon must have at least one day".into()));
      }
      if !(h.maintenance_threshold >= 0.0) {
        return Err(ModelError::InvalidConfig("maintenance threshold must be non-negative".into()));
      }
    }
    if let Some(DistanceCap::Fixed(x)) = self.distance_cap {
      if !(x >= 0.0) {
        return Err(ModelError::InvalidConfig(format!("distance cap {} is negative", x)));
      }
    }
    let limits = [
      (self.co2_limit, "CO2 limit"),
      (self.time_cap_hours, "time cap"),
      (self.loading_time_cap_hours, "loading time cap"),
    ];
    for (limit, what) in limits.iter() {
      if let Some(x) = limit {
        if !(*x >= 0.0) {
          return Err(ModelError::InvalidConfig(format!("{} {} is negative", what, x)));
        }
      }
    }
    if self.formulation == Formulation::Assignment {
      let unsupported = [
        (self.horizon.is_some(), "horizon"),
        (self.recharge, "recharge"),
        (self.max_routes_per_vehicle.is_some(), "max_routes_per_vehicle"),
      ];
      if let Some((_, name)) = unsupported.iter().find(|(on, _)| *on) {
        return Err(ModelError::InvalidConfig(format!("`{}` needs the routing formulation", name)));
      }
    }
    Ok(())
  }
}

/// Per-vehicle cost and distance lookups shared by both formulations.
pub(crate) struct ArcCosts<'a> {
  travel: &'a TravelMatrices,
  catalog: &'a Catalog,
}

impl<'a> ArcCosts<'a> {
  pub(crate) fn new(catalog: &'a Catalog, travel: &'a TravelMatrices) -> Result<Self, ModelError> {
    for v in catalog.vehicles() {
      travel.matrix(catalog.vehicle(v).metric)?;
    }
    Ok(ArcCosts { travel, catalog })
  }

  fn metric(&self, v: VehicleIdx) -> Metric {
    self.catalog.vehicle(v).metric
  }

  pub(crate) fn distance(&self, v: VehicleIdx, o: NodeIdx, d: NodeIdx) -> f64 {
    self.travel.matrix(self.metric(v)).map(|m| m.get(o, d)).unwrap_or(f64::NAN)
  }

  pub(crate) fn hours(&self, v: VehicleIdx, o: NodeIdx, d: NodeIdx) -> f64 {
    self.travel.travel_time(self.metric(v), o, d).unwrap_or(f64::NAN) / 60.0
  }

  /// Distance and time cost of travelling `o -> d` with `v`.
  pub(crate) fn travel_cost(&self, v: VehicleIdx, o: NodeIdx, d: NodeIdx) -> f64 {
    let vehicle = self.catalog.vehicle(v);
    vehicle.cost_per_distance * self.distance(v, o, d) + vehicle.cost_per_time * self.hours(v, o, d)
  }
}

pub enum ModelVars {
  Routing(RoutingVars),
  Assignment(AssignmentVars),
}

pub enum ModelConstraints {
  Routing(RoutingConstraints, Option<HorizonConstraints>),
  Assignment(AssignmentConstraints),
}

pub struct BuiltModel {
  pub instance: Instance,
  pub vars: ModelVars,
  pub cons: ModelConstraints,
  pub days: Vec<Day>,
}

pub struct ModelBuilder<'a> {
  catalog: &'a Catalog,
  travel: &'a TravelMatrices,
  options: &'a ModelOptions,
}

impl<'a> ModelBuilder<'a> {
  pub fn new(catalog: &'a Catalog, travel: &'a TravelMatrices, options: &'a ModelOptions) -> Self {
    ModelBuilder { catalog, travel, options }
  }

  #[tracing::instrument(level = "info", skip(self))]
  pub fn build(&self, name: &str) -> Result<BuiltModel, ModelError> {
    self.options.check(self.catalog)?;
    let costs = ArcCosts::new(self.catalog, self.travel)?;
    let days = self.options.days();
    let mut instance = Instance::new(name);

    let (vars, cons, objective) = match self.options.formulation {
      Formulation::Routing => {
        let mut vars = RoutingVars::build(self.catalog, self.options, &days, &mut instance);
        if let Some(h) = &self.options.horizon {
          vars.horizon = Some(HorizonVars::build(self.catalog, &days, &mut instance));
          info!(days = h.days, "horizon variables added");
        }
        let cons = RoutingConstraints::build(self.catalog, &costs, self.options, &vars, &mut instance);
        let horizon_cons = match (&self.options.horizon, &vars.horizon) {
          (Some(h), Some(hv)) => Some(HorizonConstraints::build(self.catalog, &costs, self.options, h, &vars, hv, &mut instance)),
          _ => None,
        };
        let mut objective = vars.objective(self.catalog, &costs);
        if let Some(hv) = &vars.horizon {
          objective += hv.objective(self.catalog);
        }
        (ModelVars::Routing(vars), ModelConstraints::Routing(cons, horizon_cons), objective)
      }
      Formulation::Assignment => {
        let vars = AssignmentVars::build(self.catalog, &mut instance);
        let cons = AssignmentConstraints::build(self.catalog, &costs, self.options, &vars, &mut instance);
        let objective = vars.objective(self.catalog, &costs);
        (ModelVars::Assignment(vars), ModelConstraints::Assignment(cons), objective)
      }
    };

    instance.set_objective(objective);
    instance.validate()?;
    info!(
      vars = instance.num_vars(),
      binaries = instance.num_binvars(),
      constraints = instance.num_constrs(),
      "model built"
    );
    Ok(BuiltModel { instance, vars, cons, days })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::distance::{DistanceConfig, TravelMatrices};
  use crate::test::*;

  #[test]
  fn invalid_configurations() {
    let catalog = catalog(&[(0., 0.)], &[(1., 0.)], 10.0);
    let travel = TravelMatrices::build(&catalog, &DistanceConfig::default(), None).unwrap();

    let options = ModelOptions { recharge: true, ..ModelOptions::default() };
    assert!(matches!(ModelBuilder::new(&catalog, &travel, &options).build("t"), Err(ModelError::InvalidConfig(_))));

    let options = ModelOptions {
      formulation: Formulation::Assignment,
      horizon: Some(HorizonOptions::default()),
      ..ModelOptions::default()
    };
    assert!(matches!(ModelBuilder::new(&catalog, &travel, &options).build("t"), Err(ModelError::InvalidConfig(_))));

    let options = ModelOptions { horizon: Some(HorizonOptions { days: 0, ..HorizonOptions::default() }), ..ModelOptions::default() };
    assert!(matches!(ModelBuilder::new(&catalog, &travel, &options).build("t"), Err(ModelError::InvalidConfig(_))));

    let options = ModelOptions { time_cap_hours: Some(-48.0), ..ModelOptions::default() };
    assert!(matches!(ModelBuilder::new(&catalog, &travel, &options).build("t"), Err(ModelError::InvalidConfig(_))));
  }

  #[test]
  fn missing_metric_is_unknown_entity() {
    let catalog = catalog(&[(0., 0.)], &[(1., 0.)], 10.0);
    let travel = TravelMatrices::new(60.0);
    let options = ModelOptions::default();
    assert!(matches!(
      ModelBuilder::new(&catalog, &travel, &options).build("t"),
      Err(ModelError::UnknownEntity { .. })
    ));
  }

  #[test]
  fn options_from_json() {
    let options: ModelOptions = serde_json::from_str(
      r#"{"formulation": "routing", "distance_cap": {"fixed": 150}, "horizon": {"days": 2}}"#
    ).unwrap();
    assert_eq!(options.distance_cap, Some(DistanceCap::Fixed(150.0)));
    assert_eq!(options.days(), vec![1, 2]);
    assert_eq!(options.horizon.unwrap().maintenance_threshold, 10_000.0);

    let options: ModelOptions = serde_json::from_str(r#"{"distance_cap": "vehicle_range"}"#).unwrap();
    assert_eq!(options.distance_cap, Some(DistanceCap::VehicleRange));
  }
}

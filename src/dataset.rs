//! Reading scenario tables from CSV files.
use crate::catalog::*;
use crate::entities::Coord;
use crate::error::{InputError, ModelError};
use crate::utils::IoContext;
use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

struct Table {
  file: String,
  headers: Vec<String>,
  reader: csv::Reader<Box<dyn Read>>,
}

impl Table {
  fn new(file: &str, input: Box<dyn Read>) -> Result<Self> {
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .flexible(true)
      .from_reader(input);
    let headers = reader.headers()
      .with_context(|| format!("{}: unable to read header row", file))?
      .iter()
      .map(str::to_string)
      .collect();
    Ok(Table { file: file.to_string(), headers, reader })
  }

  fn column(&self, name: &str) -> Option<usize> {
    self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
  }

  fn required(&self, name: &str) -> std::result::Result<usize, ModelError> {
    self.column(name).ok_or_else(|| InputError::MissingColumn { file: self.file.clone(), column: name.to_string() }.into())
  }

  /// Product columns present in this table, with their positions.
  fn product_columns(&self, products: &[String]) -> Vec<(String, usize)> {
    products.iter()
      .filter_map(|p| self.column(p).map(|i| (p.clone(), i)))
      .collect()
  }

  fn rows(&mut self) -> Result<Vec<Row>> {
    let Table { file, headers, reader } = self;
    let file: &str = file;
    let headers: &[String] = headers;
    let mut rows = Vec::new();
    for record in reader.records() {
      let record = record.with_context(|| format!("{}: malformed row", file))?;
      let line = record.position().map(|p| p.line()).unwrap_or(0);
      rows.push(Row { file, headers, line, record });
    }
    Ok(rows)
  }
}

struct Row<'a> {
  file: &'a str,
  headers: &'a [String],
  line: u64,
  record: csv::StringRecord,
}

impl Row<'_> {
  fn str(&self, col: usize) -> &str {
    self.record.get(col).unwrap_or("")
  }

  fn bad_value(&self, col: usize) -> ModelError {
    InputError::BadValue {
      file: self.file.to_string(),
      line: self.line,
      column: self.headers[col].clone(),
      value: self.str(col).to_string(),
    }.into()
  }

  fn f64(&self, col: usize) -> std::result::Result<f64, ModelError> {
    self.opt_f64(col)?.ok_or_else(|| self.bad_value(col))
  }

  /// Empty cells read as `None`
  fn opt_f64(&self, col: usize) -> std::result::Result<Option<f64>, ModelError> {
    let s = self.str(col);
    if s.is_empty() {
      return Ok(None);
    }
    match s.parse::<f64>() {
      Ok(x) if x.is_finite() => Ok(Some(x)),
      _ => Err(self.bad_value(col)),
    }
  }

  fn quantities(&self, columns: &[(String, usize)]) -> std::result::Result<Vec<(String, f64)>, ModelError> {
    columns.iter()
      .map(|(p, i)| Ok((p.clone(), self.opt_f64(*i)?.unwrap_or(0.0))))
      .collect()
  }

  fn coord(&self, lon: usize, lat: usize) -> std::result::Result<Coord, ModelError> {
    Ok(Coord::new(self.f64(lon)?, self.f64(lat)?))
  }
}

pub fn read_clients(file: &str, input: Box<dyn Read>, products: &[String]) -> Result<Vec<ClientRecord>> {
  let mut table = Table::new(file, input)?;
  let id = table.required("ClientID")?;
  let lon = table.required("Longitude")?;
  let lat = table.required("Latitude")?;
  let product_cols = table.product_columns(products);

  let mut clients = Vec::new();
  for row in table.rows()? {
    clients.push(ClientRecord {
      id: row.str(id).to_string(),
      coord: row.coord(lon, lat)?,
      demand: row.quantities(&product_cols)?,
    });
  }
  Ok(clients)
}

pub fn read_depots(file: &str, input: Box<dyn Read>) -> Result<Vec<DepotRecord>> {
  let mut table = Table::new(file, input)?;
  let id = table.required("DepotID")?;
  let lon = table.required("Longitude")?;
  let lat = table.required("Latitude")?;
  let mut depots = Vec::new();
  for row in table.rows()? {
    depots.push(DepotRecord { id: row.str(id).to_string(), coord: row.coord(lon, lat)? });
  }
  Ok(depots)
}

pub fn read_vehicles(file: &str, input: Box<dyn Read>, products: &[String]) -> Result<Vec<VehicleRecord>> {
  let mut table = Table::new(file, input)?;
  let ty = table.required("VehicleType")?;
  let product_cols = table.product_columns(products);
  let capacity = if product_cols.is_empty() { Some(table.required("Capacity")?) } else { table.column("Capacity") };
  let range = table.required("Range")?;
  let battery = table.column("BatteryCapacity");

  let mut vehicles = Vec::new();
  for row in table.rows()? {
    vehicles.push(VehicleRecord {
      vehicle_type: row.str(ty).to_string(),
      capacity: match capacity {
        Some(c) => row.opt_f64(c)?.unwrap_or(0.0),
        None => 0.0,
      },
      product_capacity: row.quantities(&product_cols)?,
      range: row.f64(range)?,
      battery_capacity: match battery {
        Some(b) => row.opt_f64(b)?,
        None => None,
      },
    });
  }
  Ok(vehicles)
}

pub fn read_recharge_nodes(file: &str, input: Box<dyn Read>) -> Result<Vec<RechargeRecord>> {
  let mut table = Table::new(file, input)?;
  let id = table.required("RechargeNodeID")?;
  let lon = table.required("Longitude")?;
  let lat = table.required("Latitude")?;
  let rate = table.column("RechargeRate");
  let tariff = table.column("RechargeCost");

  let mut nodes = Vec::new();
  for row in table.rows()? {
    let opt = |col: Option<usize>| col.map(|c| row.opt_f64(c)).transpose().map(Option::flatten);
    nodes.push(RechargeRecord {
      id: row.str(id).to_string(),
      coord: row.coord(lon, lat)?,
      rate: opt(rate)?,
      tariff: opt(tariff)?,
    });
  }
  Ok(nodes)
}

pub fn read_depot_capacities(file: &str, input: Box<dyn Read>, products: &[String]) -> Result<Vec<DepotCapacityRecord>> {
  let mut table = Table::new(file, input)?;
  let id = table.required("DepotID")?;
  let product_cols = table.product_columns(products);
  let mut rows = Vec::new();
  for row in table.rows()? {
    rows.push(DepotCapacityRecord { depot_id: row.str(id).to_string(), capacity: row.quantities(&product_cols)? });
  }
  Ok(rows)
}

fn normalize_file_name(name: &str) -> String {
  name.chars()
    .filter(|c| *c != '_' && *c != '-')
    .flat_map(char::to_lowercase)
    .collect()
}

/// Finds `name` in `dir`, ignoring case, underscores and dashes (`Clients.csv`, `depot_capacities.csv`, ...).
fn find_table(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
  let wanted = normalize_file_name(name);
  for entry in std::fs::read_dir(dir).read_context(dir)? {
    let path = entry?.path();
    let matches = path.file_name()
      .and_then(|f| f.to_str())
      .map(|f| normalize_file_name(f) == wanted)
      .unwrap_or(false);
    if matches {
      return Ok(Some(path));
    }
  }
  Ok(None)
}

fn open(path: &Path) -> Result<(String, Box<dyn Read>)> {
  let file = std::fs::File::open(path).read_context(path)?;
  Ok((path.display().to_string(), Box::new(std::io::BufReader::new(file))))
}

/// Loads all tables of a scenario directory.  Recharge nodes and depot capacities are optional.
#[tracing::instrument(level = "info", skip(products))]
pub fn load_dir(dir: &Path, products: &[String]) -> Result<RawData> {
  let required = |name: &str| -> Result<(String, Box<dyn Read>)> {
    let path = find_table(dir, name)?
      .ok_or_else(|| anyhow::anyhow!("{} not found in {}", name, dir.display()))?;
    open(&path)
  };

  let (f, r) = required("clients.csv")?;
  let clients = read_clients(&f, r, products)?;
  let (f, r) = required("depots.csv")?;
  let depots = read_depots(&f, r)?;
  let (f, r) = required("vehicles.csv")?;
  let vehicles = read_vehicles(&f, r, products)?;

  let recharge = match find_table(dir, "rechargenodes.csv")? {
    Some(p) => {
      let (f, r) = open(&p)?;
      read_recharge_nodes(&f, r)?
    }
    None => Vec::new(),
  };

  let depot_capacities = match find_table(dir, "depotcapacities.csv")? {
    Some(p) => {
      let (f, r) = open(&p)?;
      read_depot_capacities(&f, r, products)?
    }
    None => {
      debug!("no depot capacity table");
      Vec::new()
    }
  };

  info!(clients=clients.len(), depots=depots.len(), vehicles=vehicles.len(), recharge=recharge.len(), "loaded tables");
  Ok(RawData { clients, depots, vehicles, recharge, depot_capacities })
}

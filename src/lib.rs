pub use anyhow::Result;
pub use fnv::FnvHashMap as Map;
pub use fnv::FnvHashSet as Set;

pub mod catalog;
pub mod dataset;
pub mod distance;
pub mod entities;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod logging;
pub mod milp;
pub mod model;
pub mod scenario;
pub mod solution;
pub mod solver;
pub mod utils;

#[cfg(test)]
pub(crate) mod test;

pub const COMMIT_HASH: &str = env!("COMMIT_HASH");

#[inline]
pub fn map_with_capacity<K, V>(capacity: usize) -> Map<K, V> {
  Map::with_capacity_and_hasher(capacity, Default::default())
}

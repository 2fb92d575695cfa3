//! Feasibility of MTZ ordering potentials for a fixed set of arcs.
use crate::entities::NodeIdx;
use crate::Map;

/// Given the active arcs of one vehicle type on one day, decides whether potentials `u` exist with
/// `0 <= u <= n - 1` and `u[i] - u[j] + n·y[i,j] <= n - 1` for every ordered pair of distinct clients.
///
/// The constraints are difference constraints, so this is a single-source shortest path problem
/// solved with Bellman-Ford.  Returns `None` if there is a negative cycle, which happens exactly
/// when the arcs contain a cycle through clients only.
pub fn feasible_potentials(clients: &[NodeIdx], arcs: &[(NodeIdx, NodeIdx)], n: usize) -> Option<Map<NodeIdx, f64>> {
  let n = n as f64;
  let index: Map<NodeIdx, usize> = clients.iter().enumerate().map(|(k, &c)| (c, k)).collect();
  let source = clients.len();
  let active: crate::Set<(usize, usize)> = arcs.iter()
    .filter_map(|(i, j)| Some((*index.get(i)?, *index.get(j)?)))
    .collect();

  // u[a] - u[b] <= w becomes the edge b -> a with weight w
  let mut edges = Vec::with_capacity(clients.len() * clients.len() + 2 * clients.len());
  for a in 0..clients.len() {
    for b in 0..clients.len() {
      if a != b {
        let w = if active.contains(&(a, b)) { -1.0 } else { n - 1.0 };
        edges.push((b, a, w));
      }
    }
    edges.push((a, source, 0.0));
    edges.push((source, a, n - 1.0));
  }

  let mut dist = vec![f64::INFINITY; clients.len() + 1];
  dist[source] = 0.0;
  for _ in 0..clients.len() {
    let mut changed = false;
    for &(from, to, w) in &edges {
      if dist[from] + w < dist[to] {
        dist[to] = dist[from] + w;
        changed = true;
      }
    }
    if !changed {
      break;
    }
  }
  if edges.iter().any(|&(from, to, w)| dist[from] + w < dist[to]) {
    return None;
  }

  Some(clients.iter().enumerate().map(|(k, &c)| (c, dist[k] - dist[source])).collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::milp::{Assignment, Violation};
  use crate::model::ModelOptions;
  use crate::test::*;

  fn check(u: &Map<NodeIdx, f64>, arcs: &[(NodeIdx, NodeIdx)], n: f64) {
    for (&i, &ui) in u {
      assert!(ui >= 0.0 && ui <= n - 1.0);
      for (&j, &uj) in u {
        if i != j {
          let y = if arcs.contains(&(i, j)) { 1.0 } else { 0.0 };
          assert!(ui - uj + n * y <= n - 1.0 + 1e-9);
        }
      }
    }
  }

  #[test]
  fn two_disjoint_two_cycles() {
    let clients = [1, 2, 3, 4];
    let arcs = [(1, 2), (2, 1), (3, 4), (4, 3)];
    assert!(feasible_potentials(&clients, &arcs, 5).is_none());
  }

  #[test]
  fn single_tour() {
    let clients = [1, 2, 3, 4];
    // depot arcs are not client pairs and are ignored
    let arcs = [(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)];
    let u = feasible_potentials(&clients, &arcs, 5).unwrap();
    check(&u, &arcs, 5.0);
    assert!(u[&1] < u[&2] && u[&2] < u[&3] && u[&3] < u[&4]);
  }

  #[test]
  fn chain_too_long_for_n() {
    // four clients in sequence need potentials spanning 3, which n = 3 does not allow
    let clients = [1, 2, 3, 4];
    let arcs = [(1, 2), (2, 3), (3, 4)];
    assert!(feasible_potentials(&clients, &arcs, 3).is_none());
  }

  #[test]
  fn potentials_satisfy_the_model() {
    let catalog = catalog(&[(0., 0.)], &[(1., 0.), (2., 0.), (3., 0.), (4., 0.)], 10.0);
    let model = build_model(&catalog, &ModelOptions::default());
    let vars = routing_vars(&model);
    let mut a = Assignment::zeros(model.instance.num_vars());
    let path = [0, 2, 1, 4, 3, 0];
    set_path(&mut a, vars, &path, 1);

    let arcs: Vec<_> = path.windows(2).map(|w| (w[0], w[1])).collect();
    let clients: Vec<_> = catalog.clients().collect();
    let u = feasible_potentials(&clients, &arcs, vars.nodes.len()).unwrap();
    for (c, x) in u {
      a.set(vars.u[&(c, 0, 1)], x);
    }
    assert!(model.instance.violations(&a, 1e-6).is_empty());
  }

  #[test]
  fn model_rows_reject_a_client_two_cycle() {
    let catalog = catalog(&[(0., 0.)], &[(1., 0.), (2., 0.), (3., 0.), (4., 0.)], 10.0);
    let model = build_model(&catalog, &ModelOptions::default());
    let vars = routing_vars(&model);
    let mut a = Assignment::zeros(model.instance.num_vars());
    set_path(&mut a, vars, &[0, 3, 4, 0], 1);
    set_path(&mut a, vars, &[1, 2, 1], 1);
    a.set(vars.u[&(4, 0, 1)], 1.0);

    let arcs = [(0, 3), (3, 4), (4, 0), (1, 2), (2, 1)];
    let clients: Vec<_> = catalog.clients().collect();
    assert!(feasible_potentials(&clients, &arcs, vars.nodes.len()).is_none());

    let n = vars.nodes.len();
    for (u1, u2) in (0..n).flat_map(|i| (0..n).map(move |j| (i as f64 * 0.5, j as f64 * 0.5))) {
      a.set(vars.u[&(1, 0, 1)], u1);
      a.set(vars.u[&(2, 0, 1)], u2);
      let violated: Vec<_> = model.instance.violations(&a, 1e-6).into_iter()
        .filter(|v| matches!(v, Violation::Constr { .. }))
        .map(|v| v.name().to_string())
        .collect();
      assert!(!violated.is_empty(), "u = ({}, {})", u1, u2);
      assert!(violated.iter().all(|name| name.starts_with("mtz[NCliente1,NCliente2") || name.starts_with("mtz[NCliente2,NCliente1")), "{:?}", violated);
    }
  }
}

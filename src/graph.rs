use crate::Map;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Sub;
use tracing::{debug, error_span, trace, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum WalkKind {
  /// Ends at a sink
  Path,
  /// Returns to one of its own nodes
  Cycle,
  /// Stops at a node with no outgoing arc
  DeadEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Walk<A, W> {
  pub kind: WalkKind,
  pub arcs: Vec<A>,
  pub weight: W,
}

#[inline]
fn min_weight<W: Copy + PartialOrd>(weights: &[W]) -> W {
  let mut min = weights[0];
  for &w in &weights[1..] {
    if w < min {
      min = w;
    }
  }
  min
}

pub trait DecomposableDigraph<N, A, W>: Sized
where
  N: Clone + Hash + Eq + Debug,
  A: Clone,
  W: Sub + Copy + PartialOrd,
{
  fn is_sink(&self, node: &N) -> bool;

  /// A node with at least one outgoing arc, or `None` once every arc has been consumed.
  fn next_start(&self) -> Option<N>;

  fn next_outgoing_arc(&self, node: &N) -> Option<(A, N, W)>;

  fn subtract_arc(&mut self, arc: &A, weight: W);

  /// Splits the graph into walks.  Reaching a sink always ends a path, even when the sink is the start node.
  fn decompose(mut self) -> Vec<Walk<A, W>> {
    let _span = error_span!("decompose").entered();

    let mut walks = Vec::new();
    let mut visited_nodes = Map::default();
    let mut node_order: Vec<N> = Vec::new();
    let mut arcs = Vec::with_capacity(8);
    let mut weights = Vec::with_capacity(8);

    'start: while let Some(first_node) = self.next_start() {
      visited_nodes.clear();
      node_order.clear();
      arcs.clear();
      weights.clear();
      trace!(?first_node);
      visited_nodes.insert(first_node.clone(), 0usize);
      node_order.push(first_node);

      loop {
        let current_node = &node_order[node_order.len() - 1];
        let (arc, next_node, weight) = match self.next_outgoing_arc(current_node) {
          Some(step) => step,
          None if arcs.is_empty() => {
            warn!(node=?current_node, "start node has no outgoing arc");
            break 'start;
          }
          None => {
            debug!(?node_order, "dead end");
            let walk = arcs.split_off(0);
            let weight = min_weight(&weights);
            for a in &walk {
              self.subtract_arc(a, weight);
            }
            walks.push(Walk { kind: WalkKind::DeadEnd, arcs: walk, weight });
            break;
          }
        };
        trace!(node=?next_node);
        arcs.push(arc);
        weights.push(weight);

        if self.is_sink(&next_node) {
          debug!(?node_order, "path found");
          let path = arcs.split_off(0);
          let weight = min_weight(&weights);
          for a in &path {
            self.subtract_arc(a, weight);
          }
          walks.push(Walk { kind: WalkKind::Path, arcs: path, weight });
          break;
        } else if let Some(&cyc_idx) = visited_nodes.get(&next_node) {
          debug!(?cyc_idx, ?node_order, "cycle found");
          let cycle = arcs.split_off(cyc_idx);
          let weight = min_weight(&weights[cyc_idx..]);
          weights.truncate(cyc_idx);
          for a in &cycle {
            self.subtract_arc(a, weight);
          }
          walks.push(Walk { kind: WalkKind::Cycle, arcs: cycle, weight });

          if cyc_idx > 0 {
            // backtrack to just before the start of the cycle
            for n in node_order.drain((cyc_idx + 1)..) {
              visited_nodes.remove(&n);
            }
            continue;
          } else {
            break;
          }
        }

        visited_nodes.insert(next_node.clone(), node_order.len());
        node_order.push(next_node);
      }
    }

    walks
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Graph {
    sinks: Vec<usize>,
    arcs: Map<(usize, usize), f64>,
  }

  impl Graph {
    fn new(sinks: &[usize], arcs: &[(usize, usize)]) -> Self {
      Graph { sinks: sinks.to_vec(), arcs: arcs.iter().map(|&a| (a, 1.0)).collect() }
    }
  }

  impl DecomposableDigraph<usize, (usize, usize), f64> for Graph {
    fn is_sink(&self, node: &usize) -> bool {
      self.sinks.contains(node)
    }

    fn next_start(&self) -> Option<usize> {
      let from_sink = self.arcs.keys().filter(|(i, _)| self.sinks.contains(i)).map(|&(i, _)| i).min();
      from_sink.or_else(|| self.arcs.keys().map(|&(i, _)| i).min())
    }

    fn next_outgoing_arc(&self, node: &usize) -> Option<((usize, usize), usize, f64)> {
      self.arcs.iter()
        .filter(|((i, _), _)| i == node)
        .min_by_key(|((_, j), _)| *j)
        .map(|(&(i, j), &w)| ((i, j), j, w))
    }

    fn subtract_arc(&mut self, arc: &(usize, usize), weight: f64) {
      let val = self.arcs.get_mut(arc).unwrap();
      *val -= weight;
      assert!(*val >= 0.0);
      if val.abs() < 1e-12 {
        self.arcs.remove(arc);
      }
    }
  }

  fn kinds(walks: &[Walk<(usize, usize), f64>]) -> Vec<WalkKind> {
    walks.iter().map(|w| w.kind).collect()
  }

  #[test]
  fn empty_graph() {
    assert!(Graph::new(&[0], &[]).decompose().is_empty());
  }

  #[test]
  fn closed_tour_is_a_path() {
    let walks = Graph::new(&[0], &[(0, 1), (1, 2), (2, 0)]).decompose();
    assert_eq!(walks, vec![Walk { kind: WalkKind::Path, arcs: vec![(0, 1), (1, 2), (2, 0)], weight: 1.0 }]);
  }

  #[test]
  fn tours_and_subtours() {
    let walks = Graph::new(&[0], &[(0, 1), (1, 0), (0, 2), (2, 0), (3, 4), (4, 3)]).decompose();
    assert_eq!(kinds(&walks), vec![WalkKind::Path, WalkKind::Path, WalkKind::Cycle]);
    assert_eq!(walks[2].arcs, vec![(3, 4), (4, 3)]);
  }

  #[test]
  fn cycle_inside_a_path() {
    let walks = Graph::new(&[0], &[(0, 1), (1, 2), (2, 1), (1, 3), (3, 0)]).decompose();
    assert_eq!(kinds(&walks), vec![WalkKind::Cycle, WalkKind::Path]);
    assert_eq!(walks[0].arcs, vec![(1, 2), (2, 1)]);
    assert_eq!(walks[1].arcs, vec![(0, 1), (1, 3), (3, 0)]);
  }

  #[test]
  fn dead_end() {
    let walks = Graph::new(&[0], &[(0, 1), (1, 5)]).decompose();
    assert_eq!(walks, vec![Walk { kind: WalkKind::DeadEnd, arcs: vec![(0, 1), (1, 5)], weight: 1.0 }]);
  }
}

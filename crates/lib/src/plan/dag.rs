//! Target dependency graph.
//!
//! Nodes are declaration indices into the registry. Edges run from a
//! dependency to its dependent, so a topological order lists dependencies
//! first. Ordering-only edges (`after`) take part in cycle detection and
//! linearization but never pull targets into a plan.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use super::types::PlanError;
use crate::target::TargetRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
  Dependency,
  Ordering,
}

/// The whole declared target graph.
pub struct TargetDag {
  graph: DiGraph<usize, EdgeKind>,
  nodes: Vec<NodeIndex>,
  names: Vec<String>,
}

impl TargetDag {
  /// Build the graph for every declared target.
  ///
  /// # Errors
  ///
  /// Returns `UnknownDependency` for references to undeclared targets and
  /// `Cycle` if the declared edges are not acyclic.
  pub fn from_registry<R>(registry: &TargetRegistry<R>) -> Result<Self, PlanError> {
    registry.validate()?;

    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..registry.len()).map(|i| graph.add_node(i)).collect();

    for (idx, target) in registry.targets().iter().enumerate() {
      for dep in target.dependencies() {
        let Some(dep_idx) = registry.index_of(dep) else {
          continue;
        };
        graph.update_edge(nodes[dep_idx], nodes[idx], EdgeKind::Dependency);
      }
    }

    // Ordering edges never downgrade an existing dependency edge.
    for (idx, target) in registry.targets().iter().enumerate() {
      for before in target.ordering() {
        let Some(before_idx) = registry.index_of(before) else {
          continue;
        };
        if graph.find_edge(nodes[before_idx], nodes[idx]).is_none() {
          graph.add_edge(nodes[before_idx], nodes[idx], EdgeKind::Ordering);
        }
      }
    }

    let names = registry.targets().iter().map(|t| t.name().to_string()).collect();
    let dag = Self { graph, nodes, names };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  /// Reject the first cycle found, naming its members in declaration order.
  fn verify_acyclic(&self) -> Result<(), PlanError> {
    let mut cycles: Vec<Vec<usize>> = tarjan_scc(&self.graph)
      .into_iter()
      .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
      .map(|scc| {
        let mut members: Vec<usize> = scc.iter().map(|n| self.graph[*n]).collect();
        members.sort_unstable();
        members
      })
      .collect();
    cycles.sort();

    match cycles.into_iter().next() {
      Some(cycle) => Err(self.cycle_error(cycle)),
      None => Ok(()),
    }
  }

  fn cycle_error(&self, members: Vec<usize>) -> PlanError {
    PlanError::Cycle(members.into_iter().map(|i| self.names[i].clone()).collect())
  }

  /// Direct dependencies of a target, in declaration order.
  pub fn dependencies(&self, idx: usize) -> Vec<usize> {
    let mut deps: Vec<usize> = self
      .graph
      .edges_directed(self.nodes[idx], Direction::Incoming)
      .filter(|e| *e.weight() == EdgeKind::Dependency)
      .map(|e| self.graph[e.source()])
      .collect();
    deps.sort_unstable();
    deps
  }

  /// Transitive closure of `roots` along dependency edges.
  pub fn closure(&self, roots: &[usize]) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();

    while let Some(idx) = stack.pop() {
      if !seen.insert(idx) {
        continue;
      }
      stack.extend(self.dependencies(idx).into_iter().rev());
    }

    seen
  }

  /// Topologically order `members`, breaking ties by declaration order.
  ///
  /// Every edge between two members constrains the order, including
  /// ordering-only edges.
  pub fn linearize(&self, members: &BTreeSet<usize>) -> Result<Vec<usize>, PlanError> {
    let mut in_degree: HashMap<usize, usize> = members.iter().map(|&m| (m, 0)).collect();
    for &member in members {
      for edge in self.graph.edges_directed(self.nodes[member], Direction::Outgoing) {
        if let Some(deg) = in_degree.get_mut(&self.graph[edge.target()]) {
          *deg += 1;
        }
      }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .filter(|&(_, &deg)| deg == 0)
      .map(|(&m, _)| Reverse(m))
      .collect();
    let mut order = Vec::with_capacity(members.len());

    while let Some(Reverse(idx)) = ready.pop() {
      order.push(idx);
      for edge in self.graph.edges_directed(self.nodes[idx], Direction::Outgoing) {
        let next = self.graph[edge.target()];
        if let Some(deg) = in_degree.get_mut(&next) {
          *deg -= 1;
          if *deg == 0 {
            ready.push(Reverse(next));
          }
        }
      }
    }

    if order.len() != members.len() {
      let stuck: Vec<usize> = members.iter().copied().filter(|m| !order.contains(m)).collect();
      return Err(self.cycle_error(stuck));
    }

    Ok(order)
  }
}

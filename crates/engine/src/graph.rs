// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency graph over atomic ports.
//!
//! The executor schedules level by level: level 0 is every port with no
//! dependencies, level N+1 everything whose dependencies all sit in levels
//! <= N. Ties within a level break on the atomic port's `order`, then id,
//! so scheduling is deterministic.

use std::collections::{HashMap, HashSet};

use pal_core::{AtomicPort, PortId};

/// In-memory mirror of an orchestration's edges.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<PortId>,
    /// node -> its dependencies
    edges: HashMap<PortId, Vec<PortId>>,
    order: HashMap<PortId, u32>,
}

impl DependencyGraph {
    pub fn from_atomic_ports(ports: &[AtomicPort]) -> Self {
        let mut graph = Self::default();
        for port in ports {
            graph.nodes.push(port.port_id.clone());
            graph.order.insert(port.port_id.clone(), port.order);
            graph
                .edges
                .insert(port.port_id.clone(), port.depends_on.clone());
        }
        graph
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth of each node; `None` when the graph has a cycle.
    pub fn levels(&self) -> Option<HashMap<PortId, u32>> {
        let mut level: HashMap<PortId, u32> = HashMap::new();
        let mut remaining: Vec<&PortId> = self.nodes.iter().collect();

        while !remaining.is_empty() {
            let mut progressed = false;
            remaining.retain(|node| {
                let deps = self.edges.get(*node).map(Vec::as_slice).unwrap_or(&[]);
                // Dependencies outside the graph count as level-less roots.
                let max_dep = deps
                    .iter()
                    .filter(|d| self.order.contains_key(*d))
                    .map(|d| level.get(d).copied())
                    .collect::<Option<Vec<u32>>>();
                match max_dep {
                    Some(resolved) => {
                        let depth = resolved.iter().max().map(|m| m + 1).unwrap_or(0);
                        level.insert((*node).clone(), depth);
                        progressed = true;
                        false
                    }
                    None => true,
                }
            });
            if !progressed {
                return None;
            }
        }
        Some(level)
    }

    /// Nodes sorted by (level, order, id); `None` on a cycle.
    pub fn scheduling_order(&self) -> Option<Vec<PortId>> {
        let levels = self.levels()?;
        let mut nodes = self.nodes.clone();
        nodes.sort_by_key(|n| {
            (
                levels.get(n).copied().unwrap_or(0),
                self.order.get(n).copied().unwrap_or(0),
                n.as_str().to_string(),
            )
        });
        Some(nodes)
    }

    /// Size of the largest level; the effective maximum parallelism.
    pub fn max_parallelism(&self) -> usize {
        let Some(levels) = self.levels() else {
            return 0;
        };
        let mut sizes: HashMap<u32, usize> = HashMap::new();
        for depth in levels.values() {
            *sizes.entry(*depth).or_insert(0) += 1;
        }
        sizes.values().copied().max().unwrap_or(0)
    }
}

/// Whether adding `port -> depends_on` to the existing edge set would
/// create a cycle, i.e. `port` is already reachable from `depends_on`.
pub fn would_cycle(edges: &[(PortId, PortId)], port: &PortId, depends_on: &PortId) -> bool {
    if port == depends_on {
        return true;
    }
    let mut adjacency: HashMap<&PortId, Vec<&PortId>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(from).or_default().push(to);
    }

    // DFS from depends_on along existing dependency edges.
    let mut stack = vec![depends_on];
    let mut seen: HashSet<&PortId> = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == port {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;

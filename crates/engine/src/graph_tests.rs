// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pal_core::PortStatus;

fn atomic(id: &str, order: u32, deps: &[&str]) -> AtomicPort {
    AtomicPort {
        port_id: PortId::new(id),
        order,
        depends_on: deps.iter().map(|d| PortId::new(*d)).collect(),
        status: PortStatus::Pending,
        retry_count: 0,
        test_retry_count: 0,
    }
}

#[test]
fn levels_of_a_diamond() {
    let graph = DependencyGraph::from_atomic_ports(&[
        atomic("a", 1, &[]),
        atomic("b", 2, &["a"]),
        atomic("c", 3, &["a"]),
        atomic("d", 4, &["b", "c"]),
    ]);
    let levels = graph.levels().unwrap();
    assert_eq!(levels[&PortId::new("a")], 0);
    assert_eq!(levels[&PortId::new("b")], 1);
    assert_eq!(levels[&PortId::new("c")], 1);
    assert_eq!(levels[&PortId::new("d")], 2);
    assert_eq!(graph.max_parallelism(), 2);
}

#[test]
fn scheduling_order_breaks_ties_on_order_field() {
    let graph = DependencyGraph::from_atomic_ports(&[
        atomic("zeta", 1, &[]),
        atomic("alpha", 2, &[]),
        atomic("late", 3, &["zeta"]),
    ]);
    let order = graph.scheduling_order().unwrap();
    assert_eq!(
        order,
        vec![PortId::new("zeta"), PortId::new("alpha"), PortId::new("late")]
    );
}

#[test]
fn cycle_makes_levels_none() {
    let graph = DependencyGraph::from_atomic_ports(&[
        atomic("a", 1, &["b"]),
        atomic("b", 2, &["a"]),
    ]);
    assert!(graph.levels().is_none());
    assert!(graph.scheduling_order().is_none());
    assert_eq!(graph.max_parallelism(), 0);
}

#[test]
fn external_dependencies_do_not_break_leveling() {
    // "b" depends on a port outside this orchestration; it still levels.
    let graph =
        DependencyGraph::from_atomic_ports(&[atomic("a", 1, &[]), atomic("b", 2, &["outside"])]);
    let levels = graph.levels().unwrap();
    assert_eq!(levels[&PortId::new("b")], 0);
}

#[test]
fn would_cycle_detects_transitive_cycles() {
    let edges = vec![
        (PortId::new("b"), PortId::new("a")),
        (PortId::new("c"), PortId::new("b")),
    ];
    // c depends on b depends on a; a -> c closes the loop.
    assert!(would_cycle(&edges, &PortId::new("a"), &PortId::new("c")));
    // but a fresh edge d -> a is fine.
    assert!(!would_cycle(&edges, &PortId::new("d"), &PortId::new("a")));
    // self-dependency is trivially a cycle.
    assert!(would_cycle(&edges, &PortId::new("x"), &PortId::new("x")));
}

#[test]
fn empty_graph() {
    let graph = DependencyGraph::from_atomic_ports(&[]);
    assert!(graph.is_empty());
    assert_eq!(graph.scheduling_order().unwrap().len(), 0);
}

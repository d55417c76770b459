// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Graphs that can be model checked
//!
//! Both the concrete [EventGraph] and the abstract
//! [PartitionGraph](crate::partition_graph::PartitionGraph) implement
//! [TransitionGraph]. Before checking, a graph is compiled for one
//! relation into a [CompiledGraph] where nodes are numbered 0 to N-1.
//!

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::events::{EventGraph, EventId, Relation};

///
/// Labeled graph with initial and terminal nodes per relation
///
pub trait TransitionGraph {
    /// Node identifier
    type Node: Copy + Eq + Hash + Ord + Debug;

    /// All nodes in increasing order
    fn nodes(&self) -> Vec<Self::Node>;

    /// Label of a node
    fn node_label(&self, node: Self::Node) -> &str;

    /// Initial nodes of a relation in increasing order
    fn initial_nodes(&self, relation: &Relation) -> Vec<Self::Node>;

    /// Successors of a node in a relation, in increasing order and without duplicates
    fn successors_in(&self, node: Self::Node, relation: &Relation) -> Vec<Self::Node>;

    /// Whether a path may end at this node
    fn is_terminal_in(&self, node: Self::Node, relation: &Relation) -> bool;
}

impl TransitionGraph for EventGraph {
    type Node = EventId;

    fn nodes(&self) -> Vec<EventId> {
        self.event_ids().collect()
    }

    fn node_label(&self, node: EventId) -> &str {
        self.label(node)
    }

    fn initial_nodes(&self, relation: &Relation) -> Vec<EventId> {
        self.initial_events(relation).to_vec()
    }

    fn successors_in(&self, node: EventId, relation: &Relation) -> Vec<EventId> {
        let mut result: Vec<EventId> = self.successors(node, relation).collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    fn is_terminal_in(&self, node: EventId, relation: &Relation) -> bool {
        self.is_terminal(node, relation)
    }
}

///
/// Dense view of a graph for a single relation
/// - node i of the compiled graph is nodes[i] in the original graph
///
#[derive(Debug)]
pub struct CompiledGraph<'a, N> {
    nodes: Vec<N>,
    labels: Vec<&'a str>,
    successors: Vec<Vec<usize>>,
    terminal: Vec<bool>,
    initial: Vec<usize>,
}

impl<'a, N: Copy + Eq + Hash + Ord + Debug> CompiledGraph<'a, N> {
    ///
    /// Compile graph g for relation r
    ///
    pub fn new<G>(g: &'a G, r: &Relation) -> Self
    where
        G: TransitionGraph<Node = N>,
    {
        let nodes = g.nodes();
        let index: HashMap<N, usize> = nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let labels = nodes.iter().map(|&n| g.node_label(n)).collect();
        let successors = nodes
            .iter()
            .map(|&n| {
                g.successors_in(n, r)
                    .into_iter()
                    .filter_map(|m| index.get(&m).copied())
                    .collect()
            })
            .collect();
        let terminal = nodes.iter().map(|&n| g.is_terminal_in(n, r)).collect();
        let initial = g
            .initial_nodes(r)
            .into_iter()
            .filter_map(|n| index.get(&n).copied())
            .collect();
        CompiledGraph {
            nodes,
            labels,
            successors,
            terminal,
            initial,
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Original node for index i
    pub fn node(&self, i: usize) -> N {
        self.nodes[i]
    }

    /// Label of node i
    pub fn label(&self, i: usize) -> &'a str {
        self.labels[i]
    }

    /// Successors of node i
    pub fn successors(&self, i: usize) -> &[usize] {
        &self.successors[i]
    }

    /// Whether node i is terminal
    pub fn is_terminal(&self, i: usize) -> bool {
        self.terminal[i]
    }

    /// Initial nodes
    pub fn initial(&self) -> &[usize] {
        &self.initial
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_compile() {
        let g = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "b"]]).unwrap();
        let c = CompiledGraph::new(&g, &Relation::time());
        println!("{c:?}");
        assert_eq!(c.len(), g.num_events());
        assert_eq!(c.initial(), &[0]);
        assert_eq!(c.successors(0), &[2, 4]);
        assert_eq!(c.label(2), "a");
        assert!(c.is_terminal(3));
        assert!(!c.is_terminal(2));

        // unknown relation: no initial nodes, no edges
        let c = CompiledGraph::new(&g, &Relation::new("other"));
        assert!(c.initial().is_empty());
        assert!(c.successors(0).is_empty());
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Partition graphs
//!
//! A partition graph is a quotient of an event graph: every node is a
//! partition, that is, a non-empty set of events with the same label.
//! Transitions between partitions are not stored. They are derived from
//! the transitions of the member events.
//!
//! The graph is modified by [GraphOp] operations (split, multi-split, merge).
//! Applying an operation returns the operation that undoes it, so the
//! refiner and the coarsener can try an operation, check invariants, and
//! rewind. Rewinding restores partition ids.
//!

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    events::{EventGraph, EventId, Relation},
    graphs::TransitionGraph,
    partitions::Partition,
    worklists::Worklist,
};

///
/// Index of a partition
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u32);

impl Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

///
/// How the initial partition graph is built
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partitioning {
    /// One partition per label
    #[default]
    ByLabel,
    /// One partition per event
    Separately,
}

///
/// Move a set of events out of a partition
/// - the events go to a new partition, or to the dead partition `into` if given
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Partition to split
    pub partition: PartitionId,
    /// Events to move out
    pub events: BTreeSet<EventId>,
    /// Id of the partition that receives the events
    pub into: Option<PartitionId>,
}

impl Split {
    /// Split of partition that moves events to a new partition
    pub fn new(partition: PartitionId, events: BTreeSet<EventId>) -> Self {
        Split {
            partition,
            events,
            into: None,
        }
    }

    ///
    /// Check that the split divides its partition in two non-empty parts
    ///
    pub fn validate(&self, graph: &PartitionGraph) -> Result<()> {
        let p = self.partition;
        let reason = if !graph.contains(p) {
            Some("no such partition")
        } else if self.events.is_empty() {
            Some("no events to split out")
        } else if self.events.iter().any(|&e| graph.parent(e) != Some(p)) {
            Some("events outside the partition")
        } else if self.events.len() == graph.size(p) {
            Some("all events would be split out")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::InvalidSplit {
                partition: p.0,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    ///
    /// Check whether the split is valid
    ///
    pub fn is_valid(&self, graph: &PartitionGraph) -> bool {
        self.validate(graph).is_ok()
    }
}

///
/// Divide a partition into several parts
/// - parts[0] stays in the partition, every other part becomes a new partition
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSplit {
    /// Partition to divide
    pub partition: PartitionId,
    /// Disjoint parts that cover the partition
    pub parts: Vec<BTreeSet<EventId>>,
}

impl MultiSplit {
    ///
    /// Multi-split equivalent to a split
    ///
    pub fn from_split(split: &Split, graph: &PartitionGraph) -> Self {
        let rest = graph
            .members(split.partition)
            .filter(|e| !split.events.contains(e))
            .collect();
        let mut result = MultiSplit {
            partition: split.partition,
            parts: vec![rest, split.events.clone()],
        };
        result.parts.retain(|p| !p.is_empty());
        result
    }

    ///
    /// Refine every part by the events of another split of the same partition
    ///
    pub fn incorporate(&mut self, split: &Split) {
        debug_assert_eq!(split.partition, self.partition);
        let mut parts = Vec::with_capacity(self.parts.len() * 2);
        for part in self.parts.drain(..) {
            let (inside, outside): (BTreeSet<EventId>, BTreeSet<EventId>) =
                part.into_iter().partition(|e| split.events.contains(e));
            parts.extend([outside, inside].into_iter().filter(|p| !p.is_empty()));
        }
        self.parts = parts;
    }

    ///
    /// A multi-split is valid if it has more than one part
    ///
    pub fn is_valid(&self) -> bool {
        self.parts.len() > 1
    }

    fn validate(&self, graph: &PartitionGraph) -> Result<()> {
        let p = self.partition;
        let fail = |reason: &str| {
            Err(Error::InvalidSplit {
                partition: p.0,
                reason: reason.to_string(),
            })
        };
        if !graph.contains(p) {
            return fail("no such partition");
        }
        if !self.is_valid() {
            return fail("fewer than two parts");
        }
        let mut seen = BTreeSet::new();
        for part in &self.parts {
            if part.is_empty() {
                return fail("empty part");
            }
            for &e in part {
                if graph.parent(e) != Some(p) || !seen.insert(e) {
                    return fail("parts are not a division of the partition");
                }
            }
        }
        if seen.len() != graph.size(p) {
            return fail("parts don't cover the partition");
        }
        Ok(())
    }
}

///
/// Merge partition source into partition target
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    /// Partition that receives the events
    pub target: PartitionId,
    /// Partition that disappears
    pub source: PartitionId,
}

///
/// Operations on a partition graph
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOp {
    /// Split a partition in two
    Split(Split),
    /// Divide a partition into several parts
    MultiSplit(MultiSplit),
    /// Merge two partitions
    Merge(Merge),
    /// Apply operations in order
    Batch(Vec<GraphOp>),
}

///
/// Graph of partitions over an event graph
///
#[derive(Debug, Clone)]
pub struct PartitionGraph {
    events: EventGraph,
    // element i of the partition is event i
    blocks: Partition,
}

impl PartitionGraph {
    ///
    /// Build the initial partition graph
    ///
    pub fn new(events: EventGraph, partitioning: Partitioning) -> Self {
        match partitioning {
            Partitioning::ByLabel => Self::partition_by_labels(events),
            Partitioning::Separately => Self::partition_separately(events),
        }
    }

    ///
    /// One partition per label
    ///
    pub fn partition_by_labels(events: EventGraph) -> Self {
        let n = events.num_events() as u32;
        let blocks = Partition::from_keys(n, |x| events.label(EventId(x)).to_string());
        PartitionGraph { events, blocks }
    }

    ///
    /// One partition per event
    ///
    pub fn partition_separately(events: EventGraph) -> Self {
        let n = events.num_events() as u32;
        let blocks = Partition::singletons(n);
        PartitionGraph { events, blocks }
    }

    /// The underlying event graph
    pub fn events(&self) -> &EventGraph {
        &self.events
    }

    /// Ids of all partitions in increasing order
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.blocks.live_blocks().map(PartitionId).collect()
    }

    /// Number of partitions
    pub fn num_partitions(&self) -> usize {
        self.blocks.index() as usize
    }

    /// Check whether p is a partition of this graph
    pub fn contains(&self, p: PartitionId) -> bool {
        self.blocks.is_live(p.0)
    }

    /// Member events of p in increasing order
    pub fn members(&self, p: PartitionId) -> impl Iterator<Item = EventId> + '_ {
        self.blocks.block_elements(p.0).iter().map(|&x| EventId(x))
    }

    /// Number of events in p
    pub fn size(&self, p: PartitionId) -> usize {
        self.blocks.block_size(p.0) as usize
    }

    /// Partition that contains an event
    pub fn parent(&self, e: EventId) -> Option<PartitionId> {
        (e.index() < self.events.num_events()).then(|| PartitionId(self.blocks.block_id(e.0)))
    }

    /// Label of p (empty for an unknown partition)
    pub fn label(&self, p: PartitionId) -> &str {
        self.blocks
            .block_elements(p.0)
            .first()
            .map_or("", |&x| self.events.label(EventId(x)))
    }

    /// Check whether p contains an initial event of relation r
    pub fn is_initial(&self, p: PartitionId, r: &Relation) -> bool {
        self.events
            .initial_events(r)
            .iter()
            .any(|&e| self.parent(e) == Some(p))
    }

    /// Check whether p contains a terminal event of relation r
    pub fn is_terminal(&self, p: PartitionId, r: &Relation) -> bool {
        self.members(p).any(|e| self.events.is_terminal(e, r))
    }

    /// Partitions that contain an initial event of relation r
    pub fn initial_partitions(&self, r: &Relation) -> Vec<PartitionId> {
        let set: BTreeSet<PartitionId> = self
            .events
            .initial_events(r)
            .iter()
            .filter_map(|&e| self.parent(e))
            .collect();
        set.into_iter().collect()
    }

    /// Successors of p in relation r
    pub fn successors(&self, p: PartitionId, r: &Relation) -> BTreeSet<PartitionId> {
        self.members(p)
            .flat_map(|e| self.events.successors(e, r))
            .filter_map(|e| self.parent(e))
            .collect()
    }

    /// Predecessors of p in relation r
    pub fn predecessors(&self, p: PartitionId, r: &Relation) -> BTreeSet<PartitionId> {
        self.members(p)
            .flat_map(|e| self.events.predecessors(e, r))
            .filter_map(|e| self.parent(e))
            .collect()
    }

    /// Check whether some event of p has a transition in r to some event of q
    pub fn has_transition(&self, p: PartitionId, q: PartitionId, r: &Relation) -> bool {
        self.members(p)
            .any(|e| self.events.successors(e, r).any(|f| self.parent(f) == Some(q)))
    }

    ///
    /// Apply an operation
    /// - return the operation that undoes it
    /// - on error, the graph is unchanged
    ///
    pub fn apply(&mut self, op: GraphOp) -> Result<GraphOp> {
        match op {
            GraphOp::Split(split) => {
                split.validate(self)?;
                let events = &split.events;
                let q = self.blocks.split_block(
                    split.partition.0,
                    |x| events.contains(&EventId(x)),
                    split.into.map(|p| p.0),
                );
                Ok(GraphOp::Merge(Merge {
                    target: split.partition,
                    source: PartitionId(q),
                }))
            }

            GraphOp::MultiSplit(multi) => {
                multi.validate(self)?;
                let p = multi.partition;
                let mut rewind = Vec::with_capacity(multi.parts.len() - 1);
                for part in &multi.parts[1..] {
                    let q = self
                        .blocks
                        .split_block(p.0, |x| part.contains(&EventId(x)), None);
                    rewind.push(GraphOp::Merge(Merge {
                        target: p,
                        source: PartitionId(q),
                    }));
                }
                rewind.reverse();
                Ok(GraphOp::Batch(rewind))
            }

            GraphOp::Merge(Merge { target, source }) => {
                if target == source || !self.contains(target) || !self.contains(source) {
                    return Err(Error::InvalidSplit {
                        partition: source.0,
                        reason: format!("cannot merge {source} into {target}"),
                    });
                }
                let events = self.members(source).collect();
                self.blocks.merge_blocks(target.0, source.0);
                Ok(GraphOp::Split(Split {
                    partition: target,
                    events,
                    into: Some(source),
                }))
            }

            GraphOp::Batch(ops) => {
                let mut rewind = Vec::with_capacity(ops.len());
                for op in ops {
                    match self.apply(op) {
                        Ok(r) => rewind.push(r),
                        Err(e) => {
                            // undo what was done so far
                            while let Some(r) = rewind.pop() {
                                self.apply(r)?;
                            }
                            return Err(e);
                        }
                    }
                }
                rewind.reverse();
                Ok(GraphOp::Batch(rewind))
            }
        }
    }

    ///
    /// Check the structural invariants
    /// - every event belongs to exactly one partition
    /// - all events of a partition have the same label
    /// - every partition is reachable from an initial partition
    /// - a partition that is reachable in a relation and not terminal in it
    ///   has a successor in that relation
    ///
    pub fn check_sanity(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Sanity(msg));

        let mut count = 0;
        for p in self.partition_ids() {
            let label = self.label(p);
            for e in self.members(p) {
                count += 1;
                if self.parent(e) != Some(p) {
                    return fail(format!("{e} is in {p} but its parent is not {p}"));
                }
                if self.events.label(e) != label {
                    return fail(format!("{p} mixes labels {label} and {}", self.events.label(e)));
                }
            }
        }
        if count != self.events.num_events() {
            return fail(format!(
                "partitions hold {count} events, the graph has {}",
                self.events.num_events()
            ));
        }

        let mut reached = BTreeSet::new();
        for r in self.events.relations() {
            let mut queue = Worklist::new();
            let mut seen = BTreeSet::new();
            for p in self.initial_partitions(r) {
                if seen.insert(p) {
                    queue.push(p);
                }
            }
            while let Some(p) = queue.pop() {
                let next = self.successors(p, r);
                if next.is_empty() && !self.is_terminal(p, r) {
                    return fail(format!("{p} is a dead end in relation {r}"));
                }
                for q in next {
                    if seen.insert(q) {
                        queue.push(q);
                    }
                }
            }
            reached.extend(seen);
        }
        if let Some(p) = self.partition_ids().into_iter().find(|p| !reached.contains(p)) {
            return fail(format!("{p} is not reachable from an initial partition"));
        }
        Ok(())
    }

    ///
    /// Read-only summary of the graph
    ///
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut partitions = Vec::new();
        let mut transitions = Vec::new();
        for p in self.partition_ids() {
            let size = self.size(p);
            partitions.push(PartitionSummary {
                id: p,
                label: self.label(p).to_string(),
                size,
                initial: self.events.relations().any(|r| self.is_initial(p, r)),
                terminal: self.events.relations().any(|r| self.is_terminal(p, r)),
            });

            // (target, relation) -> (weight, number of source events)
            let mut edges: BTreeMap<(PartitionId, &Relation), (u32, BTreeSet<EventId>)> =
                BTreeMap::new();
            for e in self.members(p) {
                for t in self.events.transitions(e) {
                    if let Some(q) = self.parent(t.target) {
                        let entry = edges.entry((q, &t.relation)).or_default();
                        entry.0 += t.weight;
                        entry.1.insert(e);
                    }
                }
            }
            for ((target, relation), (weight, sources)) in edges {
                transitions.push(TransitionSummary {
                    source: p,
                    target,
                    relation: relation.clone(),
                    weight,
                    frequency: sources.len() as f64 / size as f64,
                });
            }
        }
        GraphSnapshot {
            partitions,
            transitions,
        }
    }
}

impl TransitionGraph for PartitionGraph {
    type Node = PartitionId;

    fn nodes(&self) -> Vec<PartitionId> {
        self.partition_ids()
    }

    fn node_label(&self, node: PartitionId) -> &str {
        self.label(node)
    }

    fn initial_nodes(&self, relation: &Relation) -> Vec<PartitionId> {
        self.initial_partitions(relation)
    }

    fn successors_in(&self, node: PartitionId, relation: &Relation) -> Vec<PartitionId> {
        self.successors(node, relation).into_iter().collect()
    }

    fn is_terminal_in(&self, node: PartitionId, relation: &Relation) -> bool {
        self.is_terminal(node, relation)
    }
}

impl Display for PartitionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for p in self.partition_ids() {
            write!(f, "{p} {} ({} events):", self.label(p), self.size(p))?;
            for r in self.events.relations() {
                for q in self.successors(p, r) {
                    write!(f, " -{r}-> {q}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

///
/// Summary of a partition
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    /// Partition id
    pub id: PartitionId,
    /// Label of all member events
    pub label: String,
    /// Number of member events
    pub size: usize,
    /// Whether the partition contains an initial event
    pub initial: bool,
    /// Whether the partition contains a terminal event
    pub terminal: bool,
}

///
/// Summary of a partition-level transition
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSummary {
    /// Source partition
    pub source: PartitionId,
    /// Target partition
    pub target: PartitionId,
    /// Relation
    pub relation: Relation,
    /// Sum of the weights of the concrete transitions
    pub weight: u32,
    /// Fraction of the source events that take this transition
    pub frequency: f64,
}

///
/// Snapshot of a partition graph for exporters
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// All partitions
    pub partitions: Vec<PartitionSummary>,
    /// All transitions
    pub transitions: Vec<TransitionSummary>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_traces() -> PartitionGraph {
        let events = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "c"]]).unwrap();
        PartitionGraph::new(events, Partitioning::ByLabel)
    }

    fn find(g: &PartitionGraph, label: &str) -> PartitionId {
        g.partition_ids()
            .into_iter()
            .find(|&p| g.label(p) == label)
            .unwrap()
    }

    #[test]
    fn test_by_label() {
        let g = two_traces();
        println!("{g}");
        let t = Relation::time();
        // INITIAL, TERMINAL, a, b, c
        assert_eq!(g.num_partitions(), 5);
        g.check_sanity().unwrap();
        let a = find(&g, "a");
        assert_eq!(g.size(a), 2);
        let succ: Vec<&str> = g.successors(a, &t).iter().map(|&p| g.label(p)).collect();
        assert_eq!(succ, vec!["b", "c"]);
        assert_eq!(g.initial_partitions(&t), vec![find(&g, "INITIAL")]);
        assert!(g.is_terminal(find(&g, "c"), &t));
        assert!(!g.is_terminal(a, &t));
        assert!(g.has_transition(a, find(&g, "b"), &t));
        assert!(!g.has_transition(find(&g, "b"), a, &t));
    }

    #[test]
    fn test_split_rewind() {
        let mut g = two_traces();
        let a = find(&g, "a");
        let first: BTreeSet<EventId> = g.members(a).take(1).collect();
        let before = g.partition_ids();

        let split = Split::new(a, first.clone());
        assert!(split.is_valid(&g));
        let rewind = g.apply(GraphOp::Split(split)).unwrap();
        println!("After split:\n{g}");
        assert_eq!(g.num_partitions(), 6);
        g.check_sanity().unwrap();
        let m = match &rewind {
            GraphOp::Merge(m) => *m,
            _ => panic!("expected a merge"),
        };
        assert_eq!(m.target, a);
        assert_eq!(g.members(m.source).collect::<BTreeSet<_>>(), first);

        let redo = g.apply(rewind).unwrap();
        assert_eq!(g.partition_ids(), before);
        assert_eq!(g.size(a), 2);

        // splitting again restores the same partition id
        g.apply(redo).unwrap();
        assert_eq!(g.num_partitions(), 6);
        assert_eq!(g.members(m.source).collect::<BTreeSet<_>>(), first);
    }

    #[test]
    fn test_invalid_splits() {
        let mut g = two_traces();
        let a = find(&g, "a");
        let b = find(&g, "b");
        let all: BTreeSet<EventId> = g.members(a).collect();
        let other: BTreeSet<EventId> = g.members(b).collect();
        assert!(!Split::new(a, all.clone()).is_valid(&g));
        assert!(!Split::new(a, BTreeSet::new()).is_valid(&g));
        assert!(!Split::new(a, other).is_valid(&g));
        let e = g.apply(GraphOp::Split(Split::new(a, all))).unwrap_err();
        assert!(matches!(e, Error::InvalidSplit { .. }));
        assert_eq!(g.num_partitions(), 5);
    }

    #[test]
    fn test_multi_split() {
        let events = EventGraph::from_traces(&[
            vec!["x", "a", "b"],
            vec!["y", "a", "c"],
            vec!["z", "a", "d"],
        ])
        .unwrap();
        let mut g = PartitionGraph::new(events, Partitioning::ByLabel);
        let a = find(&g, "a");
        let members: Vec<EventId> = g.members(a).collect();
        assert_eq!(members.len(), 3);

        let s1 = Split::new(a, [members[0]].into());
        let s2 = Split::new(a, [members[1]].into());
        let mut multi = MultiSplit::from_split(&s1, &g);
        assert_eq!(multi.parts.len(), 2);
        multi.incorporate(&s2);
        assert_eq!(multi.parts.len(), 3);
        assert!(multi.is_valid());
        // incorporating the same split again changes nothing
        multi.incorporate(&s2);
        assert_eq!(multi.parts.len(), 3);

        let before = g.partition_ids();
        let rewind = g.apply(GraphOp::MultiSplit(multi)).unwrap();
        println!("After multi-split:\n{g}");
        assert_eq!(g.num_partitions(), before.len() + 2);
        g.check_sanity().unwrap();
        assert!(g.partition_ids().iter().all(|&p| g.label(p) != "a" || g.size(p) == 1));
        g.apply(rewind).unwrap();
        assert_eq!(g.partition_ids(), before);
    }

    #[test]
    fn test_merge() {
        let events = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "b"]]).unwrap();
        let mut g = PartitionGraph::new(events, Partitioning::Separately);
        assert_eq!(g.num_partitions(), 6);
        g.check_sanity().unwrap();
        let a: Vec<PartitionId> = g
            .partition_ids()
            .into_iter()
            .filter(|&p| g.label(p) == "a")
            .collect();
        let before = g.partition_ids();
        let rewind = g
            .apply(GraphOp::Merge(Merge {
                target: a[0],
                source: a[1],
            }))
            .unwrap();
        assert_eq!(g.num_partitions(), 5);
        assert_eq!(g.size(a[0]), 2);
        g.check_sanity().unwrap();
        g.apply(rewind).unwrap();
        assert_eq!(g.partition_ids(), before);

        assert!(g
            .apply(GraphOp::Merge(Merge {
                target: a[0],
                source: a[0],
            }))
            .is_err());
    }

    #[test]
    fn test_snapshot() {
        let events = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "c"], vec!["a", "b"]])
            .unwrap();
        let g = PartitionGraph::new(events, Partitioning::ByLabel);
        let snap = g.snapshot();
        let a = find(&g, "a");
        let b = find(&g, "b");
        let ab = snap
            .transitions
            .iter()
            .find(|t| t.source == a && t.target == b)
            .unwrap();
        assert_eq!(ab.weight, 2);
        assert!((ab.frequency - 2.0 / 3.0).abs() < 1e-9);
        let sa = snap.partitions.iter().find(|p| p.id == a).unwrap();
        assert_eq!(sa.size, 3);
        assert!(!sa.initial && !sa.terminal);
        let json = serde_json::to_string(&snap).unwrap();
        let back: GraphSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}

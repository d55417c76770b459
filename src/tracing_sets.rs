// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Tracing configurations: automaton states with path histories
//!
//! A tracing configuration tracks one invariant. Each inhabited state
//! carries the shortest known path that reaches it. Paths are immutable
//! linked lists that share their common prefixes.
//!

use std::{fmt::Display, rc::Rc};

use crate::{
    automata::{Symbol, MAX_STATES},
    invariants::{BinaryInvariant, InvariantKind},
    state_sets::StateSet,
};

#[derive(Debug)]
struct HistoryNode<N> {
    node: N,
    previous: Option<Rc<HistoryNode<N>>>,
}

///
/// A path in a graph, stored as a reference-counted linked list from
/// its last node back to its first node
///
#[derive(Debug)]
pub struct History<N> {
    last: Option<Rc<HistoryNode<N>>>,
    len: usize,
}

// derive(Clone) would require N: Clone
impl<N> Clone for History<N> {
    fn clone(&self) -> Self {
        History {
            last: self.last.clone(),
            len: self.len,
        }
    }
}

impl<N: Copy> History<N> {
    ///
    /// The empty path
    ///
    pub fn empty() -> Self {
        History { last: None, len: 0 }
    }

    ///
    /// Path length (number of nodes)
    ///
    pub fn len(&self) -> usize {
        self.len
    }

    ///
    /// Check whether the path is empty
    ///
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    ///
    /// New path obtained by appending node to self
    ///
    pub fn extend(&self, node: N) -> Self {
        History {
            last: Some(Rc::new(HistoryNode {
                node,
                previous: self.last.clone(),
            })),
            len: self.len + 1,
        }
    }

    ///
    /// Nodes of the path in order
    ///
    pub fn to_path(&self) -> Vec<N> {
        let mut result = Vec::with_capacity(self.len);
        let mut cur = self.last.as_deref();
        while let Some(h) = cur {
            result.push(h.node);
            cur = h.previous.as_deref();
        }
        result.reverse();
        result
    }
}

///
/// Shorter of two optional histories. On a tie, keep the first one.
///
fn prefer_shorter<N>(a: Option<History<N>>, b: Option<History<N>>) -> Option<History<N>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.len < a.len { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

#[derive(Debug)]
struct Tracked {
    kind: InvariantKind,
    first: String,
    second: String,
}

///
/// Configuration for one invariant, with a shortest history per state
///
#[derive(Debug)]
pub struct TracingStateSet<N> {
    invariant: Rc<Tracked>,
    states: [Option<History<N>>; MAX_STATES],
}

impl<N> Clone for TracingStateSet<N> {
    fn clone(&self) -> Self {
        TracingStateSet {
            invariant: self.invariant.clone(),
            states: self.states.clone(),
        }
    }
}

impl<N: Copy> TracingStateSet<N> {
    ///
    /// Initial configuration for an invariant: the initial state with an empty path
    ///
    pub fn initial(invariant: &BinaryInvariant) -> Self {
        let kind = invariant.kind();
        let mut states: [Option<History<N>>; MAX_STATES] = Default::default();
        states[kind.initial_state()] = Some(History::empty());
        TracingStateSet {
            invariant: Rc::new(Tracked {
                kind,
                first: invariant.first().to_string(),
                second: invariant.second().to_string(),
            }),
            states,
        }
    }

    ///
    /// Shortest history among inhabited states that satisfy pred
    ///
    fn shortest(&self, pred: impl Fn(usize) -> bool) -> Option<&History<N>> {
        let mut best: Option<&History<N>> = None;
        for (s, h) in self.states.iter().enumerate() {
            if let Some(h) = h {
                if pred(s) && best.map_or(true, |b| h.len < b.len) {
                    best = Some(h);
                }
            }
        }
        best
    }

    ///
    /// Shortest path to a failing state
    /// - if terminal is true, any failing state counts
    /// - otherwise, only permanently failing states count
    ///
    pub fn failure(&self, terminal: bool) -> Option<&History<N>> {
        let kind = self.invariant.kind;
        if terminal {
            self.shortest(|s| kind.is_failing(s))
        } else {
            self.shortest(|s| kind.is_permanent_failure(s))
        }
    }

    ///
    /// States inhabited
    ///
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter_map(|(s, h)| h.as_ref().map(|_| s))
    }
}

impl<N: Copy> StateSet<N> for TracingStateSet<N> {
    const JOIN_AT_NODES: bool = false;

    fn transition(&mut self, node: N, label: &str) {
        let inv = &self.invariant;
        let x = Symbol::of_label(label, &inv.first, &inv.second);
        let mut next: [Option<History<N>>; MAX_STATES] = Default::default();
        for s in 0..inv.kind.num_states() {
            if let Some(h) = self.states[s].take() {
                let t = inv.kind.step(s, x);
                next[t] = prefer_shorter(next[t].take(), Some(h));
            }
        }
        for h in next.iter_mut().flatten() {
            *h = h.extend(node);
        }
        self.states = next;
    }

    fn is_subset(&self, other: &Self) -> bool {
        self.states
            .iter()
            .zip(other.states.iter())
            .all(|(x, y)| x.is_none() || y.is_some())
    }

    fn merge_with(&mut self, other: &Self) {
        for (x, y) in self.states.iter_mut().zip(other.states.iter()) {
            *x = prefer_shorter(x.take(), y.clone());
        }
    }

    fn is_fail(&self) -> bool {
        self.failure(true).is_some()
    }

    fn is_permanent_fail(&self) -> bool {
        self.failure(false).is_some()
    }

    fn is_settled(&self) -> bool {
        let kind = self.invariant.kind;
        self.occupied().all(|s| kind.is_absorbing(s))
    }
}

impl<N: Copy + Display> Display for TracingStateSet<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = self.invariant.kind;
        for (s, h) in self.states.iter().enumerate() {
            if let Some(h) = h {
                write!(f, "{}:", kind.state_name(s))?;
                for n in h.to_path() {
                    write!(f, " {n}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_history() {
        let h0: History<u32> = History::empty();
        let h1 = h0.extend(1);
        let h2 = h1.extend(2);
        let h3 = h1.extend(3);
        assert_eq!(h2.to_path(), vec![1, 2]);
        assert_eq!(h3.to_path(), vec![1, 3]);
        assert_eq!(h3.len(), 2);
        assert!(h0.is_empty());
        let kept = prefer_shorter(Some(h2.clone()), Some(h3)).unwrap();
        assert_eq!(kept.to_path(), vec![1, 2]);
        let kept = prefer_shorter(Some(h2), Some(h1)).unwrap();
        assert_eq!(kept.to_path(), vec![1]);
    }

    #[test]
    fn test_tracing() {
        let inv = BinaryInvariant::afby("a", "b");
        let mut x: TracingStateSet<u32> = TracingStateSet::initial(&inv);
        x.transition(0, "INITIAL");
        x.transition(1, "a");
        print!("{x}");
        assert!(x.is_fail());
        assert!(!x.is_permanent_fail());
        assert_eq!(x.failure(true).map(|h| h.to_path()), Some(vec![0, 1]));

        let mut y = x.clone();
        y.transition(2, "b");
        assert!(!y.is_fail());
        assert!(!x.is_subset(&y));
        assert!(!y.is_subset(&x));

        // merge keeps the shorter history per state
        let mut z: TracingStateSet<u32> = TracingStateSet::initial(&inv);
        z.transition(5, "INITIAL");
        z.transition(6, "c");
        z.transition(7, "a");
        z.merge_with(&x);
        assert_eq!(z.failure(true).map(|h| h.to_path()), Some(vec![0, 1]));
        assert!(x.is_subset(&z));
    }

    #[test]
    fn test_permanent() {
        let inv = BinaryInvariant::ap("a", "b");
        let mut x: TracingStateSet<u32> = TracingStateSet::initial(&inv);
        x.transition(0, "b");
        assert!(x.is_permanent_fail());
        assert!(x.is_settled());
        assert_eq!(x.failure(false).map(|h| h.to_path()), Some(vec![0]));

        let mut y: TracingStateSet<u32> = TracingStateSet::initial(&inv);
        y.transition(0, "x");
        assert!(!y.is_settled());
        y.transition(1, "a");
        assert!(y.is_settled());
        assert!(!y.is_fail());
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! k-tails equivalence of partitions
//!
//! Two partitions are k-equal if they have the same label and, for k > 0,
//! their successors can be matched one-to-one in every relation so that
//! matched successors are (k-1)-equal. The matching must be consistent: a
//! partition reached from p is always matched with the same partition
//! reached from q. This makes the check terminate on cycles.
//!

use std::collections::HashMap;

use crate::partition_graph::{PartitionGraph, PartitionId};

// Partial bijection between the partitions explored from p and from q
#[derive(Debug, Clone, Default)]
struct Correspondence {
    forward: HashMap<PartitionId, PartitionId>,
    backward: HashMap<PartitionId, PartitionId>,
}

impl Correspondence {
    fn get(&self, p: PartitionId) -> Option<PartitionId> {
        self.forward.get(&p).copied()
    }

    fn conflicts(&self, p: PartitionId, q: PartitionId) -> bool {
        self.forward.get(&p).is_some_and(|&x| x != q) || self.backward.get(&q).is_some_and(|&x| x != p)
    }

    fn insert(&mut self, p: PartitionId, q: PartitionId) {
        self.forward.insert(p, q);
        self.backward.insert(q, p);
    }
}

///
/// Check whether p and q are k-equal in graph
///
pub fn k_equals(graph: &PartitionGraph, p: PartitionId, q: PartitionId, k: usize) -> bool {
    let mut map = Correspondence::default();
    equals(graph, p, q, k, &mut map)
}

fn equals(
    graph: &PartitionGraph,
    p: PartitionId,
    q: PartitionId,
    k: usize,
    map: &mut Correspondence,
) -> bool {
    if graph.label(p) != graph.label(q) {
        return false;
    }
    if map.get(p) == Some(q) {
        return true;
    }
    if map.conflicts(p, q) {
        return false;
    }
    if k == 0 {
        return true;
    }
    map.insert(p, q);

    let relations: Vec<_> = graph.events().relations().collect();
    for r in relations {
        let left: Vec<PartitionId> = graph.successors(p, r).into_iter().collect();
        let right: Vec<PartitionId> = graph.successors(q, r).into_iter().collect();
        if left.len() != right.len() {
            return false;
        }
        if graph.is_terminal(p, r) != graph.is_terminal(q, r) {
            return false;
        }
        let mut used = vec![false; right.len()];
        if !match_all(graph, &left, &right, &mut used, k - 1, map) {
            return false;
        }
    }
    true
}

// Match left[0] with an unused element of right, then recurse on the rest.
// map is updated only if the whole match succeeds.
fn match_all(
    graph: &PartitionGraph,
    left: &[PartitionId],
    right: &[PartitionId],
    used: &mut [bool],
    k: usize,
    map: &mut Correspondence,
) -> bool {
    let Some((&x, rest)) = left.split_first() else {
        return true;
    };
    for j in 0..right.len() {
        if used[j] {
            continue;
        }
        let mut attempt = map.clone();
        if equals(graph, x, right[j], k, &mut attempt) {
            used[j] = true;
            if match_all(graph, rest, right, used, k, &mut attempt) {
                *map = attempt;
                return true;
            }
            used[j] = false;
        }
    }
    false
}

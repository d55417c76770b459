// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Fixpoint model checker for binary invariants
//!
//! The checker propagates automaton configurations along the edges of a
//! graph until nothing changes. Each node keeps the configurations that
//! reached it, pruned to the runs that are not dominated by another run
//! (a run is dominated if its inhabited states are a subset of another run's
//! states). The configuration space is finite so the propagation terminates,
//! including on graphs with cycles.
//!
//! Checking is done in two phases:
//! 1. a batch pass, one per (kind, relation) group, finds which invariants fail
//! 2. a tracing pass, one per failing invariant, extracts a shortest counterexample
//!

use std::{
    collections::{HashMap, HashSet},
    fmt::{Debug, Display},
    hash::Hash,
    rc::Rc,
};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    bitsets::Bits,
    events::Relation,
    graphs::{CompiledGraph, TransitionGraph},
    invariants::{BinaryInvariant, InvariantKind},
    state_sets::{BatchStateSet, InputMasks, StateSet},
    tracing_sets::{History, TracingStateSet},
    worklists::Worklist,
};

///
/// A path that violates an invariant
/// - path: nodes from an initial node to the node where the violation is exposed
/// - labels: the labels of the nodes along the path
/// - fresh: set by [ModelChecker] if this violation was not reported before
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterexample<N> {
    /// Violated invariant
    pub invariant: BinaryInvariant,
    /// Nodes of the path
    pub path: Vec<N>,
    /// Labels along the path
    pub labels: Vec<String>,
    /// Whether this violation is new
    #[serde(default)]
    pub fresh: bool,
}

impl<N> Counterexample<N> {
    /// Length of the path
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// Check whether the path is empty
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

impl<N> Display for Counterexample<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.labels.join(" -> "))
    }
}

//
// Add a run to the runs recorded at a node
// - return the slot where it's stored if it must be propagated
// - return None if it's dominated by a recorded run
//
// Empty slots are runs that have been removed because a later run dominates them.
//
fn record<N, S: StateSet<N>>(runs: &mut Vec<Option<S>>, run: S) -> Option<usize> {
    if S::JOIN_AT_NODES {
        if let Some(Some(current)) = runs.first_mut() {
            let covered = run.is_subset(current);
            current.merge_with(&run);
            return if covered { None } else { Some(0) };
        }
        runs.clear();
        runs.push(Some(run));
        return Some(0);
    }

    for current in runs.iter_mut().flatten() {
        if run.is_subset(current) {
            if current.is_subset(&run) {
                // same states: keep the shorter histories but don't propagate
                current.merge_with(&run);
            }
            return None;
        }
    }
    for slot in runs.iter_mut() {
        if slot.as_ref().is_some_and(|c| c.is_subset(&run)) {
            *slot = None;
        }
    }
    runs.push(Some(run));
    Some(runs.len() - 1)
}

///
/// Propagate configurations from the initial nodes until fixpoint
/// - initial: the configuration before the initial node is visited
/// - return the runs recorded at every node
///
pub fn run_fixpoint<N, S>(graph: &CompiledGraph<'_, N>, initial: &S) -> Vec<Vec<Option<S>>>
where
    N: Copy + Eq + Hash + Ord + Debug,
    S: StateSet<N>,
{
    let mut frontier: Vec<Vec<Option<S>>> = (0..graph.len()).map(|_| Vec::new()).collect();
    let mut worklist: Worklist<(usize, usize)> = Worklist::new();

    for &i in graph.initial() {
        let mut run = initial.clone();
        run.transition(graph.node(i), graph.label(i));
        if let Some(slot) = record::<N, S>(&mut frontier[i], run) {
            worklist.push((i, slot));
        }
    }

    let mut steps = 0usize;
    while let Some((i, slot)) = worklist.pop() {
        let run = match frontier[i].get(slot) {
            Some(Some(run)) => run.clone(),
            // removed since it was queued
            _ => continue,
        };
        if run.is_settled() {
            continue;
        }
        steps += 1;
        for &j in graph.successors(i) {
            let mut next = run.clone();
            next.transition(graph.node(j), graph.label(j));
            if let Some(slot) = record::<N, S>(&mut frontier[j], next) {
                worklist.push((j, slot));
            }
        }
    }
    trace!(nodes = graph.len(), steps, "fixpoint reached");
    frontier
}

///
/// Batch check: return the invariants that fail on graph, in input order
///
pub fn which_fail<G: TransitionGraph>(
    graph: &G,
    invariants: &[BinaryInvariant],
) -> Vec<BinaryInvariant> {
    let mut groups: IndexMap<(InvariantKind, &Relation), Vec<&BinaryInvariant>> = IndexMap::new();
    for inv in invariants {
        groups
            .entry((inv.kind(), inv.relation()))
            .or_default()
            .push(inv);
    }

    let mut compiled: HashMap<&Relation, CompiledGraph<'_, G::Node>> = HashMap::new();
    let mut failing: HashSet<&BinaryInvariant> = HashSet::new();
    for ((kind, relation), group) in groups {
        let cg = compiled
            .entry(relation)
            .or_insert_with(|| CompiledGraph::new(graph, relation));
        let masks = Rc::new(InputMasks::new(kind, group.iter().copied()));
        let frontier = run_fixpoint::<G::Node, _>(cg, &BatchStateSet::initial(masks));

        let mut failed = Bits::zeros(group.len());
        for (i, runs) in frontier.iter().enumerate() {
            for run in runs.iter().flatten() {
                if cg.is_terminal(i) {
                    failed.or_with(&run.which_fail());
                } else {
                    failed.or_with(&run.which_permanent_fail());
                }
            }
        }
        failing.extend(failed.ones_iter().map(|k| group[k]));
    }

    invariants
        .iter()
        .filter(|inv| failing.contains(inv))
        .cloned()
        .collect()
}

///
/// Tracing check of a single invariant
/// - return a shortest counterexample if the invariant fails
///
pub fn find_counterexample<G: TransitionGraph>(
    graph: &G,
    invariant: &BinaryInvariant,
) -> Option<Counterexample<G::Node>> {
    let cg = CompiledGraph::new(graph, invariant.relation());
    let frontier = run_fixpoint::<G::Node, _>(&cg, &TracingStateSet::initial(invariant));

    let mut best: Option<&History<G::Node>> = None;
    for (i, runs) in frontier.iter().enumerate() {
        for run in runs.iter().flatten() {
            if let Some(h) = run.failure(cg.is_terminal(i)) {
                if best.map_or(true, |b| h.len() < b.len()) {
                    best = Some(h);
                }
            }
        }
    }

    let path = best?.to_path();
    let labels = path
        .iter()
        .map(|&n| graph.node_label(n).to_string())
        .collect();
    Some(Counterexample {
        invariant: invariant.clone(),
        path,
        labels,
        fresh: false,
    })
}

///
/// Counterexamples for all failing invariants, in input order
/// - if parallel is true, the tracing passes run on the rayon thread pool
///
pub fn counterexamples<G>(
    graph: &G,
    invariants: &[BinaryInvariant],
    parallel: bool,
) -> Vec<Counterexample<G::Node>>
where
    G: TransitionGraph + Sync,
    G::Node: Send,
{
    let failing = which_fail(graph, invariants);
    let trace_one = |inv: &BinaryInvariant| {
        let result = find_counterexample(graph, inv);
        if result.is_none() {
            warn!(invariant = %inv, "batch and tracing checks disagree");
        }
        result
    };
    if parallel {
        failing.par_iter().filter_map(trace_one).collect()
    } else {
        failing.iter().filter_map(trace_one).collect()
    }
}

///
/// Counterexample for the first failing invariant, if any
///
pub fn first_counterexample<G: TransitionGraph>(
    graph: &G,
    invariants: &[BinaryInvariant],
) -> Option<Counterexample<G::Node>> {
    which_fail(graph, invariants)
        .first()
        .and_then(|inv| find_counterexample(graph, inv))
}

///
/// Model checker with a memory of the violations already reported
///
/// Violations are identified by their invariant and path. A violation
/// that was reported by an earlier call is returned with `fresh == false`.
/// The refiner counts fresh violations; a violation that comes back with
/// the same path after a split means that split did not remove it.
///
#[derive(Debug)]
pub struct ModelChecker<N> {
    known: HashMap<BinaryInvariant, HashSet<Vec<N>>>,
    num_checks: usize,
}

impl<N: Copy + Eq + Hash + Ord + Debug> Default for ModelChecker<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Copy + Eq + Hash + Ord + Debug> ModelChecker<N> {
    /// Checker with an empty memory
    pub fn new() -> Self {
        ModelChecker {
            known: HashMap::new(),
            num_checks: 0,
        }
    }

    ///
    /// Check invariants on graph and return one counterexample per failing invariant
    ///
    pub fn check<G>(
        &mut self,
        graph: &G,
        invariants: &[BinaryInvariant],
        parallel: bool,
    ) -> Vec<Counterexample<N>>
    where
        G: TransitionGraph<Node = N> + Sync,
        N: Send,
    {
        self.num_checks += 1;
        let mut result = counterexamples(graph, invariants, parallel);
        for c in &mut result {
            c.fresh = self
                .known
                .entry(c.invariant.clone())
                .or_default()
                .insert(c.path.clone());
            if c.fresh {
                debug!(counterexample = %c, "new violation");
            }
        }
        result
    }

    /// Number of calls to check
    pub fn num_checks(&self) -> usize {
        self.num_checks
    }

    /// Number of distinct violations reported so far
    pub fn num_known(&self) -> usize {
        self.known.values().map(|s| s.len()).sum()
    }

    /// Forget the violations of an invariant
    pub fn forget(&mut self, invariant: &BinaryInvariant) {
        self.known.remove(invariant);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        automata::Symbol,
        events::{Event, EventGraph, EventGraphBuilder, EventId},
    };
    use proptest::prelude::*;

    fn all_invariants(labels: &[&str]) -> Vec<BinaryInvariant> {
        let mut result = Vec::new();
        for kind in InvariantKind::ALL {
            for a in labels {
                for b in labels {
                    result.push(BinaryInvariant::new(kind, *a, *b));
                }
            }
        }
        result
    }

    #[test]
    fn test_scenarios() {
        // a,b three times: a AFby b holds
        let g = EventGraph::from_traces(&vec![vec!["a", "b"]; 3]).unwrap();
        let inv = BinaryInvariant::afby("a", "b");
        assert!(which_fail(&g, &[inv.clone()]).is_empty());
        assert!(find_counterexample(&g, &inv).is_none());

        // a,b and a,c: a AFby b fails
        let g = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "c"]]).unwrap();
        assert_eq!(which_fail(&g, &[inv.clone()]), vec![inv.clone()]);
        let c = find_counterexample(&g, &inv).unwrap();
        println!("{c}");
        assert_eq!(c.labels, vec!["INITIAL", "a", "c"]);
        assert_eq!(c.path, vec![EventId(0), EventId(4), EventId(5)]);

        // a,b,c: a AP c holds
        let g = EventGraph::from_traces(&[vec!["a", "b", "c"]]).unwrap();
        assert!(first_counterexample(&g, &[BinaryInvariant::ap("a", "c")]).is_none());
    }

    #[test]
    fn test_permanent_failure() {
        let g = EventGraph::from_traces(&[vec!["x", "a", "y", "z"], vec!["b", "a"]]).unwrap();
        let nfby = BinaryInvariant::nfby("x", "y");
        let c = find_counterexample(&g, &nfby).unwrap();
        println!("{c}");
        assert_eq!(c.labels, vec!["INITIAL", "x", "a", "y"]);

        let ap = BinaryInvariant::ap("b", "a");
        let c = find_counterexample(&g, &ap).unwrap();
        assert_eq!(c.labels, vec!["INITIAL", "x", "a"]);

        let invs = all_invariants(&["x", "a", "y"]);
        let failing = which_fail(&g, &invs);
        let traced = counterexamples(&g, &invs, false);
        assert_eq!(traced.len(), failing.len());
        let parallel = counterexamples(&g, &invs, true);
        assert_eq!(traced, parallel);
    }

    #[test]
    fn test_cycle() {
        // INITIAL -> a -> b -> a ...; b -> TERMINAL; b is terminal
        let t = Relation::time();
        let mut builder = EventGraphBuilder::new();
        let i = builder.add_event(Event::new("INITIAL"));
        let a = builder.add_event(Event::new("a"));
        let b = builder.add_event(Event::new("b"));
        let c = builder.add_event(Event::new("c"));
        builder
            .add_transition(i, a, &t)
            .add_transition(a, b, &t)
            .add_transition(b, a, &t)
            .add_transition(b, c, &t)
            .mark_initial(i, &t)
            .mark_terminal(c, &t);
        let g = builder.build().unwrap();

        assert!(find_counterexample(&g, &BinaryInvariant::afby("a", "b")).is_none());
        let c = find_counterexample(&g, &BinaryInvariant::nfby("b", "a")).unwrap();
        assert_eq!(c.labels, vec!["INITIAL", "a", "b", "a"]);
        let c = find_counterexample(&g, &BinaryInvariant::afby("b", "a")).unwrap();
        assert_eq!(c.labels, vec!["INITIAL", "a", "b", "c"]);
    }

    #[test]
    fn test_memory() {
        let g = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "c"]]).unwrap();
        let invs = vec![BinaryInvariant::afby("a", "b"), BinaryInvariant::afby("a", "c")];
        let mut checker = ModelChecker::new();
        let first = checker.check(&g, &invs, false);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|c| c.fresh));
        let second = checker.check(&g, &invs, false);
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|c| !c.fresh));
        assert_eq!(checker.num_known(), 2);
        checker.forget(&invs[0]);
        let third = checker.check(&g, &invs, false);
        assert!(third[0].fresh && !third[1].fresh);
        assert_eq!(checker.num_checks(), 3);
    }

    #[test]
    fn test_json_handoff() {
        let g = EventGraph::from_traces(&[vec!["a", "c"]]).unwrap();
        let c = find_counterexample(&g, &BinaryInvariant::afby("a", "b")).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        println!("{json}");
        let back: Counterexample<EventId> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    fn trace() -> impl Strategy<Value = Vec<&'static str>> {
        prop::collection::vec(prop_oneof![Just("a"), Just("b"), Just("c")], 0..6)
    }

    proptest! {
        #[test]
        fn checker_is_sound(traces in prop::collection::vec(trace(), 1..4)) {
            let g = EventGraph::from_traces(&traces).unwrap();
            let invs = all_invariants(&["a", "b", "c"]);
            let failing = which_fail(&g, &invs);
            for inv in &invs {
                let kind = inv.kind();
                let expected = traces.iter().any(|t| {
                    let s = kind.run(t.iter().map(|l| Symbol::of_label(l, inv.first(), inv.second())));
                    kind.is_failing(s)
                });
                prop_assert_eq!(failing.contains(inv), expected, "{}", inv);

                let c = find_counterexample(&g, inv);
                prop_assert_eq!(c.is_some(), expected);
                if let Some(c) = c {
                    // replaying the path ends in a failing state
                    let s = kind.run(c.labels.iter().map(|l| Symbol::of_label(l, inv.first(), inv.second())));
                    prop_assert!(kind.is_failing(s), "{}", c);
                    prop_assert_eq!(c.path[0], g.initial_events(inv.relation())[0]);
                }
            }
        }
    }
}

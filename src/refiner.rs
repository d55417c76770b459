// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Counterexample-guided refinement
//!
//! The refiner splits partitions until every invariant holds on the partition
//! graph. Each round:
//! 1. check the invariants that were violated in the previous round
//! 2. for each counterexample, derive candidate splits and try each of them
//!    in isolation (apply, check that invariant, rewind)
//! 3. apply the candidates that eliminate their invariant's violations, all
//!    candidates for the same partition being combined in a multi-split
//! 4. if no candidate works, apply one arbitrary candidate to make progress
//!
//! Splits never make a satisfied invariant fail, so invariants satisfied in one
//! round are not checked again. Every round adds at least one partition so
//! the loop terminates. A counterexample that follows concrete events all the
//! way is a real violation: its candidates can't remove it, and refinement
//! fails once none of them is a valid split.
//!

use std::collections::{BTreeSet, HashSet};

use indexmap::{map::Entry, IndexMap};
use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info};

use crate::{
    automata::Symbol,
    checker::{find_counterexample, Counterexample},
    context::RefinementContext,
    errors::{Error, Result},
    event_sets::EventSet,
    events::EventId,
    invariants::{BinaryInvariant, InvariantSet},
    partition_graph::{GraphOp, MultiSplit, PartitionGraph, PartitionId, Split},
};

///
/// Split partitions until all invariants are satisfied
/// - fails with [Error::RefinementStall] if a counterexample can't be eliminated
/// - fails with [Error::Cancelled] if the context's token is cancelled
///
pub fn split_until_all_invs_satisfied(
    graph: &mut PartitionGraph,
    invariants: &InvariantSet,
    ctx: &mut RefinementContext,
) -> Result<()> {
    let mut unsatisfied: Vec<BinaryInvariant> = invariants.iter().cloned().collect();
    loop {
        ctx.check_cancelled()?;
        let counterexamples = ctx.check(graph, &unsatisfied);
        if counterexamples.is_empty() {
            info!(
                partitions = graph.num_partitions(),
                rounds = ctx.stats.rounds,
                "all invariants satisfied"
            );
            return Ok(());
        }

        ctx.stats.rounds += 1;
        for c in &counterexamples {
            if c.fresh {
                ctx.stats.new_violations += 1;
            } else {
                debug!(counterexample = %c, "violation survived the previous round");
            }
        }
        info!(
            round = ctx.stats.rounds,
            violated = counterexamples.len(),
            partitions = graph.num_partitions(),
            "refinement round"
        );
        unsatisfied = counterexamples
            .iter()
            .map(|c| c.invariant.clone())
            .collect();

        if !perform_splits(graph, counterexamples.clone(), ctx)? {
            let c = &counterexamples[0];
            return Err(Error::RefinementStall {
                invariant: c.invariant.to_string(),
                path: c.labels.clone(),
            });
        }
    }
}

///
/// Try to eliminate a batch of counterexamples
/// - return false if no candidate split exists for any of them
///
pub fn perform_splits(
    graph: &mut PartitionGraph,
    mut counterexamples: Vec<Counterexample<PartitionId>>,
    ctx: &mut RefinementContext,
) -> Result<bool> {
    counterexamples.shuffle(ctx.rng());

    let mut splits: IndexMap<PartitionId, MultiSplit> = IndexMap::new();
    let mut newly_satisfied: HashSet<&BinaryInvariant> = HashSet::new();
    let mut arbitrary: Option<Split> = None;

    for c in &counterexamples {
        if newly_satisfied.contains(&c.invariant) {
            continue;
        }
        let mut candidates = get_splits(c, graph, ctx)?;
        candidates.shuffle(ctx.rng());
        for split in candidates {
            if arbitrary.is_none() {
                arbitrary = Some(split.clone());
            }
            ctx.stats.candidates += 1;
            if split_satisfies(graph, &split, &c.invariant)? {
                debug!(
                    partition = %split.partition,
                    events = split.events.len(),
                    invariant = %c.invariant,
                    "validated split"
                );
                match splits.entry(split.partition) {
                    Entry::Occupied(mut e) => e.get_mut().incorporate(&split),
                    Entry::Vacant(e) => {
                        e.insert(MultiSplit::from_split(&split, graph));
                    }
                }
                newly_satisfied.insert(&c.invariant);
                break;
            }
        }
    }

    if splits.is_empty() {
        let Some(split) = arbitrary else {
            return Ok(false);
        };
        debug!(partition = %split.partition, "no split satisfies an invariant, splitting arbitrarily");
        graph.apply(GraphOp::Split(split))?;
        ctx.stats.splits += 1;
        ctx.stats.arbitrary_splits += 1;
    } else {
        for (_, multi) in splits {
            if multi.is_valid() {
                graph.apply(GraphOp::MultiSplit(multi))?;
                ctx.stats.splits += 1;
            }
        }
    }

    if ctx.options().extra_checks {
        graph.check_sanity()?;
    }
    Ok(true)
}

// Apply split, check whether invariant holds, and rewind
fn split_satisfies(
    graph: &mut PartitionGraph,
    split: &Split,
    invariant: &BinaryInvariant,
) -> Result<bool> {
    let rewind = graph.apply(GraphOp::Split(split.clone()))?;
    let satisfied = find_counterexample(&*graph, invariant).is_none();
    graph.apply(rewind)?;
    Ok(satisfied)
}

///
/// Check that a counterexample is a path of the partition graph
/// - the path starts at an initial partition of the invariant's relation
/// - consecutive partitions are linked by a transition in that relation
/// - labels, if given, match the partitions
///
pub fn validate_counterexample(
    c: &Counterexample<PartitionId>,
    graph: &PartitionGraph,
) -> Result<()> {
    let fail = |reason: String| {
        Err(Error::MalformedCounterexample {
            invariant: c.invariant.to_string(),
            reason,
        })
    };
    let r = c.invariant.relation();
    let Some(&first) = c.path.first() else {
        return fail("empty path".to_string());
    };
    if let Some(p) = c.path.iter().find(|&&p| !graph.contains(p)) {
        return fail(format!("unknown partition {p}"));
    }
    if !graph.is_initial(first, r) {
        return fail(format!("{first} is not initial in relation {r}"));
    }
    for w in c.path.windows(2) {
        if !graph.has_transition(w[0], w[1], r) {
            return fail(format!("no transition {} -> {} in relation {r}", w[0], w[1]));
        }
    }
    if !c.labels.is_empty() {
        if c.labels.len() != c.path.len() {
            return fail("labels and path have different lengths".to_string());
        }
        for (&p, l) in c.path.iter().zip(&c.labels) {
            if graph.label(p) != l {
                return fail(format!("{p} is labeled {}, not {l}", graph.label(p)));
            }
        }
    }
    Ok(())
}

///
/// Candidate splits for a counterexample
///
/// The hot set starts with the initial events of the first partition
/// and follows the concrete transitions along the path. If it becomes
/// empty when entering partition `next`, the path stitches together
/// events of the previous partition `cur` that are not connected
/// concretely, and `cur` is split:
/// - outgoing candidate: events of `cur` with a successor in `next`
/// - incoming candidate: events of `cur` with a predecessor in the partition
///   before `cur` on the path (if there is one)
///
/// Events that have no successor (resp. predecessor) are assigned to either
/// side at random.
///
/// If the hot set never becomes empty, the path may still end in a terminal
/// partition that it reaches through events that are not terminal. For a
/// failure that is not permanent, the last partition is then split into its
/// terminal and non-terminal events. Otherwise the path is concrete and `cur`
/// and `next` are the last two partitions of the path.
///
/// Only valid splits are returned.
///
pub fn get_splits(
    c: &Counterexample<PartitionId>,
    graph: &PartitionGraph,
    ctx: &mut RefinementContext,
) -> Result<Vec<Split>> {
    validate_counterexample(c, graph)?;
    let events = graph.events();
    let r = c.invariant.relation();
    let path = &c.path;

    let mut hot = EventSet::new(events.num_events());
    for &e in events.initial_events(r) {
        if graph.parent(e) == Some(path[0]) {
            hot.insert(e);
        }
    }

    let mut stitch = None;
    for i in 1..path.len() {
        let mut next_hot = EventSet::new(events.num_events());
        for e in hot.iter() {
            for f in events.successors(e, r) {
                if graph.parent(f) == Some(path[i]) {
                    next_hot.insert(f);
                }
            }
        }
        if next_hot.is_empty() {
            stitch = Some(i);
            break;
        }
        hot = next_hot;
    }

    let (cur, next, prev) = match stitch {
        Some(i) => (path[i - 1], path[i], i.checked_sub(2).map(|j| path[j])),
        None if !is_concrete(c, graph, &hot) => {
            let last = path[path.len() - 1];
            let terminal: BTreeSet<EventId> = graph
                .members(last)
                .filter(|&e| events.is_terminal(e, r))
                .collect();
            debug!(partition = %last, "path ends at events that are not terminal");
            let split = Split::new(last, terminal);
            return Ok(if split.is_valid(graph) { vec![split] } else { Vec::new() });
        }
        None => {
            debug!(counterexample = %c, "counterexample is a concrete path");
            let n = path.len();
            if n < 2 {
                return Ok(Vec::new());
            }
            (path[n - 2], path[n - 1], n.checked_sub(3).map(|j| path[j]))
        }
    };

    let mut result = Vec::with_capacity(2);
    let outgoing = divide(graph, cur, ctx, |e| {
        let mut succ = events.successors(e, r).peekable();
        succ.peek()?;
        Some(succ.any(|f| graph.parent(f) == Some(next)))
    });
    result.push(outgoing);

    if let Some(prev) = prev {
        if ctx.options().incoming_splits {
            let incoming = divide(graph, cur, ctx, |e| {
                let mut pred = events.predecessors(e, r).peekable();
                pred.peek()?;
                Some(pred.any(|f| graph.parent(f) == Some(prev)))
            });
            result.push(incoming);
        }
    }

    result.retain(|s| s.is_valid(graph));
    result.dedup();
    Ok(result)
}

// hot is the set of events that realize the whole path. The violation is
// concrete if its failure is permanent or if some hot event is terminal.
fn is_concrete(c: &Counterexample<PartitionId>, graph: &PartitionGraph, hot: &EventSet) -> bool {
    let inv = &c.invariant;
    let kind = inv.kind();
    let state = kind.run(
        c.path
            .iter()
            .map(|&p| Symbol::of_label(graph.label(p), inv.first(), inv.second())),
    );
    kind.is_permanent_failure(state)
        || hot
            .iter()
            .any(|e| graph.events().is_terminal(e, inv.relation()))
}

// Split of partition p: events for which criterion returns Some(true) are split out,
// events for which it returns None are assigned at random.
fn divide<F>(
    graph: &PartitionGraph,
    p: PartitionId,
    ctx: &mut RefinementContext,
    criterion: F,
) -> Split
where
    F: Fn(EventId) -> Option<bool>,
{
    let mut events = BTreeSet::new();
    for e in graph.members(p) {
        let out = match criterion(e) {
            Some(x) => x,
            None => ctx.rng().gen_bool(0.5),
        };
        if out {
            events.insert(e);
        }
    }
    Split::new(p, events)
}

///
/// Parse a counterexample produced by an external checker
///
pub fn parse_counterexample(json: &str) -> Result<Counterexample<PartitionId>> {
    Ok(serde_json::from_str(json)?)
}

///
/// Eliminate a counterexample supplied by an external checker
/// - the counterexample must be a path of the graph
/// - return false if it has no candidate split
///
pub fn resolve_external(
    graph: &mut PartitionGraph,
    c: Counterexample<PartitionId>,
    ctx: &mut RefinementContext,
) -> Result<bool> {
    validate_counterexample(&c, graph)?;
    perform_splits(graph, vec![c], ctx)
}

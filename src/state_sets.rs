// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Automaton configurations propagated by the model checker
//!
//! A configuration is the set of automaton states inhabited at a graph node.
//! The checker works on any type that implements [StateSet]. There are two
//! implementations:
//! - [BatchStateSet] packs many invariants of the same kind into bit vectors,
//!   without path information.
//! - [TracingStateSet](crate::tracing_sets::TracingStateSet) tracks a single
//!   invariant and keeps the shortest path that reaches each state.
//!

use std::{collections::HashMap, fmt::Display, rc::Rc};

use crate::{
    automata::Symbol, bitsets::Bits, invariants::BinaryInvariant, invariants::InvariantKind,
};

///
/// Operations on automaton configurations
/// - N is the type of graph nodes
///
pub trait StateSet<N>: Clone {
    ///
    /// Whether all runs that reach a node are joined into a single configuration.
    /// If false, the checker keeps a frontier of incomparable runs at every node.
    ///
    const JOIN_AT_NODES: bool;

    ///
    /// Apply the transition for an event with the given label at node
    ///
    fn transition(&mut self, node: N, label: &str);

    ///
    /// Check whether every state inhabited in self is inhabited in other
    ///
    fn is_subset(&self, other: &Self) -> bool;

    ///
    /// Add the states of other to self
    ///
    fn merge_with(&mut self, other: &Self);

    ///
    /// Check whether a failing state is inhabited
    ///
    fn is_fail(&self) -> bool;

    ///
    /// Check whether a permanently failing state is inhabited
    ///
    fn is_permanent_fail(&self) -> bool;

    ///
    /// Check whether all inhabited states are absorbing
    ///
    /// Successors of such a configuration are equal to itself so it
    /// doesn't need to be propagated.
    ///
    fn is_settled(&self) -> bool;
}

///
/// Input masks for a batch of invariants of the same kind
/// - for a label l, is_a(l) has bit i set if invariant i has first label l
///   and is_b(l) has bit i set if invariant i has second label l.
///
#[derive(Debug)]
pub struct InputMasks {
    kind: InvariantKind,
    count: usize,
    masks: HashMap<String, [Bits; 4]>,
    // mask for labels that are not mentioned
    other: [Bits; 4],
}

// masks are indexed by symbol in the order of Symbol::ALL
fn symbol_index(x: Symbol) -> usize {
    match x {
        Symbol::A => 0,
        Symbol::B => 1,
        Symbol::Both => 2,
        Symbol::Other => 3,
    }
}

impl InputMasks {
    ///
    /// Build the masks for a list of invariants
    /// - all invariants must have the given kind
    ///
    pub fn new<'a>(
        kind: InvariantKind,
        invariants: impl IntoIterator<Item = &'a BinaryInvariant>,
    ) -> Self {
        let invariants: Vec<&BinaryInvariant> = invariants.into_iter().collect();
        debug_assert!(invariants.iter().all(|i| i.kind() == kind));
        let count = invariants.len();

        let mut raw: HashMap<&str, (Bits, Bits)> = HashMap::new();
        for (i, inv) in invariants.iter().enumerate() {
            raw.entry(inv.first())
                .or_insert_with(|| (Bits::zeros(count), Bits::zeros(count)))
                .0
                .set(i);
            raw.entry(inv.second())
                .or_insert_with(|| (Bits::zeros(count), Bits::zeros(count)))
                .1
                .set(i);
        }

        let split = |a: &Bits, b: &Bits| -> [Bits; 4] {
            [
                a.combine(b, |x, y| x & !y),
                a.combine(b, |x, y| !x & y),
                a.combine(b, |x, y| x & y),
                a.combine(b, |x, y| !(x | y)),
            ]
        };
        let zero = Bits::zeros(count);
        let other = split(&zero, &zero);
        let masks = raw
            .into_iter()
            .map(|(label, (a, b))| (label.to_string(), split(&a, &b)))
            .collect();

        InputMasks {
            kind,
            count,
            masks,
            other,
        }
    }

    /// Number of invariants
    pub fn count(&self) -> usize {
        self.count
    }

    /// Kind of all invariants
    pub fn kind(&self) -> InvariantKind {
        self.kind
    }

    fn masks_for(&self, label: &str) -> &[Bits; 4] {
        self.masks.get(label).unwrap_or(&self.other)
    }
}

///
/// Batch configuration: one bit vector per automaton state.
/// Bit i of the vector for state s is set if invariant i inhabits s.
///
#[derive(Debug, Clone)]
pub struct BatchStateSet {
    inputs: Rc<InputMasks>,
    states: Vec<Bits>,
}

impl BatchStateSet {
    ///
    /// Configuration where every invariant is in its initial state
    ///
    pub fn initial(inputs: Rc<InputMasks>) -> Self {
        let kind = inputs.kind;
        let count = inputs.count;
        let mut states: Vec<Bits> = (0..kind.num_states()).map(|_| Bits::zeros(count)).collect();
        states[kind.initial_state()] = Bits::ones(count);
        BatchStateSet { inputs, states }
    }

    fn collect(&self, pred: impl Fn(usize) -> bool) -> Bits {
        let mut result = Bits::zeros(self.inputs.count);
        for (s, bits) in self.states.iter().enumerate() {
            if pred(s) {
                result.or_with(bits);
            }
        }
        result
    }

    ///
    /// Invariants that inhabit a failing state
    ///
    pub fn which_fail(&self) -> Bits {
        let kind = self.inputs.kind;
        self.collect(|s| kind.is_failing(s))
    }

    ///
    /// Invariants that inhabit a permanently failing state
    ///
    pub fn which_permanent_fail(&self) -> Bits {
        let kind = self.inputs.kind;
        self.collect(|s| kind.is_permanent_failure(s))
    }
}

impl<N> StateSet<N> for BatchStateSet {
    const JOIN_AT_NODES: bool = true;

    fn transition(&mut self, _node: N, label: &str) {
        let kind = self.inputs.kind;
        let masks = self.inputs.masks_for(label);
        let mut next: Vec<Bits> = (0..self.states.len())
            .map(|_| Bits::zeros(self.inputs.count))
            .collect();
        for (s, bits) in self.states.iter().enumerate() {
            if bits.is_empty() {
                continue;
            }
            for x in Symbol::ALL {
                let t = kind.step(s, x);
                next[t].or_with(&bits.combine(&masks[symbol_index(x)], |u, v| u & v));
            }
        }
        self.states = next;
    }

    fn is_subset(&self, other: &Self) -> bool {
        self.states
            .iter()
            .zip(other.states.iter())
            .all(|(x, y)| x.is_subset(y))
    }

    fn merge_with(&mut self, other: &Self) {
        for (x, y) in self.states.iter_mut().zip(other.states.iter()) {
            x.or_with(y);
        }
    }

    fn is_fail(&self) -> bool {
        !self.which_fail().is_empty()
    }

    fn is_permanent_fail(&self) -> bool {
        !self.which_permanent_fail().is_empty()
    }

    fn is_settled(&self) -> bool {
        let kind = self.inputs.kind;
        self.states
            .iter()
            .enumerate()
            .all(|(s, bits)| kind.is_absorbing(s) || bits.is_empty())
    }
}

impl Display for BatchStateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = self.inputs.kind;
        for (s, bits) in self.states.iter().enumerate() {
            write!(f, "{}:{} ", kind.state_name(s), bits)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn run(set: &mut BatchStateSet, labels: &[&str]) {
        for (i, l) in labels.iter().enumerate() {
            StateSet::<usize>::transition(set, i, l);
        }
    }

    #[test]
    fn test_batch() {
        let invs = [
            BinaryInvariant::nfby("a", "b"),
            BinaryInvariant::nfby("b", "a"),
            BinaryInvariant::nfby("a", "c"),
            BinaryInvariant::nfby("a", "a"),
        ];
        let masks = Rc::new(InputMasks::new(InvariantKind::NeverFollowedBy, &invs));
        let mut set = BatchStateSet::initial(masks);
        run(&mut set, &["x", "a", "b"]);
        println!("{set}");
        assert_eq!(set.which_fail().ones_iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(set.which_permanent_fail(), set.which_fail());
        run(&mut set, &["a"]);
        println!("{set}");
        assert_eq!(set.which_fail().ones_iter().collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn test_merge_subset() {
        let invs = [
            BinaryInvariant::afby("a", "b"),
            BinaryInvariant::afby("c", "d"),
        ];
        let masks = Rc::new(InputMasks::new(InvariantKind::AlwaysFollowedBy, &invs));
        let mut x = BatchStateSet::initial(masks.clone());
        let mut y = BatchStateSet::initial(masks);
        run(&mut x, &["a"]);
        run(&mut y, &["c"]);
        assert!(!StateSet::<usize>::is_subset(&x, &y));
        let mut z = x.clone();
        StateSet::<usize>::merge_with(&mut z, &y);
        assert!(StateSet::<usize>::is_subset(&x, &z));
        assert!(StateSet::<usize>::is_subset(&y, &z));
        assert_eq!(z.which_fail().count_ones(), 2);
        assert!(!StateSet::<usize>::is_permanent_fail(&z));
    }

    fn label() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("a"), Just("b"), Just("c")]
    }

    proptest! {
        // each bit evolves exactly like a single automaton
        #[test]
        fn batch_matches_single(seq in prop::collection::vec(label(), 0..10)) {
            for kind in InvariantKind::ALL {
                let invs: Vec<BinaryInvariant> = [("a", "b"), ("b", "a"), ("a", "a"), ("c", "b")]
                    .iter()
                    .map(|(x, y)| BinaryInvariant::new(kind, *x, *y))
                    .collect();
                let masks = Rc::new(InputMasks::new(kind, &invs));
                let mut set = BatchStateSet::initial(masks);
                run(&mut set, &seq);
                let fail = set.which_fail();
                for (i, inv) in invs.iter().enumerate() {
                    let s = kind.run(seq.iter().map(|l| Symbol::of_label(l, inv.first(), inv.second())));
                    prop_assert_eq!(fail.get(i), kind.is_failing(s));
                }
            }
        }

        // if x ⊆ y then transition(x) ⊆ transition(y)
        #[test]
        fn dominance_is_preserved(
            p1 in prop::collection::vec(label(), 0..6),
            p2 in prop::collection::vec(label(), 0..6),
            next in label(),
        ) {
            for kind in InvariantKind::ALL {
                let invs = [BinaryInvariant::new(kind, "a", "b"), BinaryInvariant::new(kind, "c", "a")];
                let masks = Rc::new(InputMasks::new(kind, &invs));
                let mut x = BatchStateSet::initial(masks.clone());
                run(&mut x, &p1);
                let mut y = BatchStateSet::initial(masks);
                run(&mut y, &p2);
                StateSet::<usize>::merge_with(&mut y, &x);
                prop_assert!(StateSet::<usize>::is_subset(&x, &y));
                StateSet::<usize>::transition(&mut x, 0, next);
                StateSet::<usize>::transition(&mut y, 0, next);
                prop_assert!(StateSet::<usize>::is_subset(&x, &y));
            }
        }
    }
}

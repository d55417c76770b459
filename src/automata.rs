// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Invariant automata
//!
//! Each invariant kind is checked by a small automaton over a two-symbol
//! alphabet {A, B}. Any event that is neither A nor B leaves the
//! state unchanged. If A == B then an event can be both A and B.
//!
//! States are indexed by small integers starting at 0 (the initial state):
//!
//! | Kind | 0 | 1 | 2 |
//! |---|---|---|---|
//! | AlwaysFollowedBy | OK | PENDING | |
//! | AlwaysPrecedes | NEUTRAL | SAWA | SAWB_FAIL |
//! | NeverFollowedBy | NONE | SAWA | FAIL |
//!
//! An AlwaysFollowedBy automaton fails if it's in state PENDING at the end of a path.
//! The other two fail as soon as they reach their failing state, and they
//! can never leave it.
//!

use crate::invariants::InvariantKind;

/// Largest number of states of an invariant automaton
pub const MAX_STATES: usize = 3;

///
/// Input symbol of an invariant automaton
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Event labeled A (and not B)
    A,
    /// Event labeled B (and not A)
    B,
    /// Event labeled A and B (only possible if A == B)
    Both,
    /// Any other event
    Other,
}

impl Symbol {
    /// Symbol for an event given whether it's an A and whether it's a B
    pub fn classify(is_a: bool, is_b: bool) -> Symbol {
        match (is_a, is_b) {
            (true, true) => Symbol::Both,
            (true, false) => Symbol::A,
            (false, true) => Symbol::B,
            (false, false) => Symbol::Other,
        }
    }

    /// Symbol for an event label with respect to labels A and B
    pub fn of_label(label: &str, first: &str, second: &str) -> Symbol {
        Symbol::classify(label == first, label == second)
    }

    /// All symbols
    pub const ALL: [Symbol; 4] = [Symbol::A, Symbol::B, Symbol::Both, Symbol::Other];
}

// state names
const AFBY_OK: usize = 0;
const AFBY_PENDING: usize = 1;

const AP_NEUTRAL: usize = 0;
const AP_SAWA: usize = 1;
const AP_SAWB_FAIL: usize = 2;

const NFBY_NONE: usize = 0;
const NFBY_SAWA: usize = 1;
const NFBY_FAIL: usize = 2;

impl InvariantKind {
    ///
    /// Number of automaton states
    ///
    pub fn num_states(self) -> usize {
        match self {
            InvariantKind::AlwaysFollowedBy => 2,
            InvariantKind::AlwaysPrecedes | InvariantKind::NeverFollowedBy => 3,
        }
    }

    ///
    /// Initial state
    ///
    pub fn initial_state(self) -> usize {
        0
    }

    ///
    /// Name of state s
    ///
    pub fn state_name(self, s: usize) -> &'static str {
        match (self, s) {
            (InvariantKind::AlwaysFollowedBy, AFBY_OK) => "OK",
            (InvariantKind::AlwaysFollowedBy, AFBY_PENDING) => "PENDING",
            (InvariantKind::AlwaysPrecedes, AP_NEUTRAL) => "NEUTRAL",
            (InvariantKind::AlwaysPrecedes, AP_SAWA) => "SAWA",
            (InvariantKind::AlwaysPrecedes, AP_SAWB_FAIL) => "SAWB_FAIL",
            (InvariantKind::NeverFollowedBy, NFBY_NONE) => "NONE",
            (InvariantKind::NeverFollowedBy, NFBY_SAWA) => "SAWA",
            (InvariantKind::NeverFollowedBy, NFBY_FAIL) => "FAIL",
            _ => "?",
        }
    }

    ///
    /// Successor of state s on input symbol x
    ///
    /// When an event is both A and B:
    /// - AlwaysFollowedBy and AlwaysPrecedes treat it as an A
    /// - NeverFollowedBy treats it as a B then an A, so SAWA moves to FAIL
    ///   and NONE moves to SAWA
    ///
    pub fn step(self, s: usize, x: Symbol) -> usize {
        match self {
            InvariantKind::AlwaysFollowedBy => match x {
                Symbol::A | Symbol::Both => AFBY_PENDING,
                Symbol::B => AFBY_OK,
                Symbol::Other => s,
            },
            InvariantKind::AlwaysPrecedes => match (s, x) {
                (AP_NEUTRAL, Symbol::A | Symbol::Both) => AP_SAWA,
                (AP_NEUTRAL, Symbol::B) => AP_SAWB_FAIL,
                _ => s,
            },
            InvariantKind::NeverFollowedBy => match (s, x) {
                (NFBY_NONE, Symbol::A | Symbol::Both) => NFBY_SAWA,
                (NFBY_SAWA, Symbol::B | Symbol::Both) => NFBY_FAIL,
                _ => s,
            },
        }
    }

    ///
    /// Check whether s is a failing state
    ///
    /// For AlwaysFollowedBy, this means failure only if the path ends here.
    ///
    pub fn is_failing(self, s: usize) -> bool {
        match self {
            InvariantKind::AlwaysFollowedBy => s == AFBY_PENDING,
            InvariantKind::AlwaysPrecedes => s == AP_SAWB_FAIL,
            InvariantKind::NeverFollowedBy => s == NFBY_FAIL,
        }
    }

    ///
    /// Check whether s is a failing state that can't be left
    ///
    pub fn is_permanent_failure(self, s: usize) -> bool {
        match self {
            InvariantKind::AlwaysFollowedBy => false,
            InvariantKind::AlwaysPrecedes => s == AP_SAWB_FAIL,
            InvariantKind::NeverFollowedBy => s == NFBY_FAIL,
        }
    }

    ///
    /// Check whether state s can't be left on any input
    ///
    pub fn is_absorbing(self, s: usize) -> bool {
        Symbol::ALL.iter().all(|&x| self.step(s, x) == s)
    }

    ///
    /// Run the automaton from the initial state on a sequence of symbols
    ///
    pub fn run(self, input: impl IntoIterator<Item = Symbol>) -> usize {
        input
            .into_iter()
            .fold(self.initial_state(), |s, x| self.step(s, x))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    // Direct reading of the invariant semantics on a complete sequence
    // (A and B distinct)
    fn reference_fails(kind: InvariantKind, seq: &[Symbol]) -> bool {
        let a_at = |i: usize| seq[i] == Symbol::A;
        let b_at = |i: usize| seq[i] == Symbol::B;
        let n = seq.len();
        match kind {
            InvariantKind::AlwaysFollowedBy => {
                (0..n).any(|i| a_at(i) && !(i + 1..n).any(b_at))
            }
            InvariantKind::AlwaysPrecedes => (0..n).any(|j| b_at(j) && !(0..j).any(a_at)),
            InvariantKind::NeverFollowedBy => {
                (0..n).any(|i| a_at(i) && (i + 1..n).any(b_at))
            }
        }
    }

    fn symbol() -> impl Strategy<Value = Symbol> {
        prop_oneof![Just(Symbol::A), Just(Symbol::B), Just(Symbol::Other)]
    }

    proptest! {
        #[test]
        fn automata_match_reference(seq in prop::collection::vec(symbol(), 0..12)) {
            for kind in InvariantKind::ALL {
                let s = kind.run(seq.iter().copied());
                prop_assert_eq!(kind.is_failing(s), reference_fails(kind, &seq),
                    "{} on {:?} ends in {}", kind, seq, kind.state_name(s));
            }
        }

        #[test]
        fn permanent_failures_persist(seq in prop::collection::vec(symbol(), 0..12)) {
            for kind in InvariantKind::ALL {
                let mut s = kind.initial_state();
                let mut failed = false;
                for &x in &seq {
                    s = kind.step(s, x);
                    failed |= kind.is_permanent_failure(s);
                    prop_assert!(!failed || kind.is_permanent_failure(s));
                }
            }
        }
    }

    #[test]
    fn test_tables() {
        for kind in InvariantKind::ALL {
            for s in 0..kind.num_states() {
                for x in Symbol::ALL {
                    let t = kind.step(s, x);
                    println!(
                        "{}: {} --{:?}--> {}",
                        kind,
                        kind.state_name(s),
                        x,
                        kind.state_name(t)
                    );
                    assert!(t < kind.num_states());
                }
                if kind.is_permanent_failure(s) {
                    assert!(kind.is_failing(s));
                    assert!(kind.is_absorbing(s));
                }
            }
            assert!(kind.num_states() <= MAX_STATES);
            assert!(!kind.is_failing(kind.initial_state()));
        }
        assert!(InvariantKind::AlwaysPrecedes.is_absorbing(AP_SAWA));
        assert!(!InvariantKind::AlwaysFollowedBy.is_absorbing(AFBY_PENDING));
    }

    #[test]
    fn test_same_labels() {
        // a AFby a: a trailing a is pending
        let k = InvariantKind::AlwaysFollowedBy;
        assert!(k.is_failing(k.run([Symbol::Both])));
        assert!(k.is_failing(k.run([Symbol::Both, Symbol::Both])));

        // a AP a: an a counts as its own predecessor
        let k = InvariantKind::AlwaysPrecedes;
        assert!(!k.is_failing(k.run([Symbol::Both, Symbol::Other])));

        // a NFby a: fails on the second a
        let k = InvariantKind::NeverFollowedBy;
        assert!(!k.is_failing(k.run([Symbol::Both])));
        assert!(k.is_failing(k.run([Symbol::Both, Symbol::Other, Symbol::Both])));
    }
}

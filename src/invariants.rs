// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Binary temporal invariants
//!
//! A binary invariant relates two event labels A and B over a relation:
//! - `A AlwaysFollowedBy B`: every A is eventually followed by a B
//! - `A AlwaysPrecedes B`: every B is preceded by some A
//! - `A NeverFollowedBy B`: no A is ever followed by a B
//!
//! Invariants are supplied by a miner and are never created by the refinement engine.
//!

use std::{fmt::Display, str::FromStr};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    events::Relation,
};

///
/// The supported invariant kinds
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InvariantKind {
    /// Every A is eventually followed by a B
    AlwaysFollowedBy,
    /// Every B is preceded by an A
    AlwaysPrecedes,
    /// No A is ever followed by a B
    NeverFollowedBy,
}

impl InvariantKind {
    /// All kinds
    pub const ALL: [InvariantKind; 3] = [
        InvariantKind::AlwaysFollowedBy,
        InvariantKind::AlwaysPrecedes,
        InvariantKind::NeverFollowedBy,
    ];

    /// Short name
    pub fn short_name(self) -> &'static str {
        match self {
            InvariantKind::AlwaysFollowedBy => "AFby",
            InvariantKind::AlwaysPrecedes => "AP",
            InvariantKind::NeverFollowedBy => "NFby",
        }
    }

    /// Long name
    pub fn long_name(self) -> &'static str {
        match self {
            InvariantKind::AlwaysFollowedBy => "AlwaysFollowedBy",
            InvariantKind::AlwaysPrecedes => "AlwaysPrecedes",
            InvariantKind::NeverFollowedBy => "NeverFollowedBy",
        }
    }
}

impl Display for InvariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.long_name().fmt(f)
    }
}

impl FromStr for InvariantKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        InvariantKind::ALL
            .into_iter()
            .find(|k| k.short_name() == s || k.long_name() == s)
            .ok_or_else(|| Error::UnsupportedInvariant(s.to_string()))
    }
}

///
/// A binary invariant: kind, first label, second label, and relation
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BinaryInvariant {
    kind: InvariantKind,
    first: String,
    second: String,
    #[serde(default)]
    relation: Relation,
}

impl BinaryInvariant {
    /// Invariant over the default time relation
    pub fn new(kind: InvariantKind, first: impl Into<String>, second: impl Into<String>) -> Self {
        BinaryInvariant {
            kind,
            first: first.into(),
            second: second.into(),
            relation: Relation::time(),
        }
    }

    /// Same invariant over another relation
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    /// `first AlwaysFollowedBy second`
    pub fn afby(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::new(InvariantKind::AlwaysFollowedBy, first, second)
    }

    /// `first AlwaysPrecedes second`
    pub fn ap(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::new(InvariantKind::AlwaysPrecedes, first, second)
    }

    /// `first NeverFollowedBy second`
    pub fn nfby(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::new(InvariantKind::NeverFollowedBy, first, second)
    }

    /// Kind
    pub fn kind(&self) -> InvariantKind {
        self.kind
    }

    /// Label A
    pub fn first(&self) -> &str {
        &self.first
    }

    /// Label B
    pub fn second(&self) -> &str {
        &self.second
    }

    /// Relation
    pub fn relation(&self) -> &Relation {
        &self.relation
    }
}

impl Display for BinaryInvariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}({}) {}",
            self.first, self.kind, self.relation, self.second
        )
    }
}

///
/// Parse an invariant written as `A Kind B` or `A Kind(relation) B`
///
impl FromStr for BinaryInvariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let [first, kind, second] = words[..] else {
            return Err(Error::UnsupportedInvariant(s.to_string()));
        };
        let (kind, relation) = match kind.split_once('(') {
            Some((k, rest)) => match rest.strip_suffix(')') {
                Some(rel) if !rel.is_empty() => (k, Relation::new(rel)),
                _ => return Err(Error::UnsupportedInvariant(s.to_string())),
            },
            None => (kind, Relation::time()),
        };
        Ok(BinaryInvariant::new(kind.parse()?, first, second).with_relation(relation))
    }
}

///
/// Set of invariants
/// - iteration order is insertion order
/// - duplicates are ignored
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvariantSet {
    invariants: IndexSet<BinaryInvariant>,
}

impl InvariantSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an invariant. Return false if it was already present.
    pub fn add(&mut self, invariant: BinaryInvariant) -> bool {
        self.invariants.insert(invariant)
    }

    /// Remove an invariant. Return true if it was present.
    pub fn remove(&mut self, invariant: &BinaryInvariant) -> bool {
        self.invariants.shift_remove(invariant)
    }

    /// Membership test
    pub fn contains(&self, invariant: &BinaryInvariant) -> bool {
        self.invariants.contains(invariant)
    }

    /// Number of invariants
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Iterator in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &BinaryInvariant> {
        self.invariants.iter()
    }

    /// Parse one invariant per non-empty line. Lines starting with '#' are ignored.
    pub fn parse_lines(text: &str) -> Result<Self> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::parse::<BinaryInvariant>)
            .collect()
    }
}

impl FromIterator<BinaryInvariant> for InvariantSet {
    fn from_iter<T: IntoIterator<Item = BinaryInvariant>>(iter: T) -> Self {
        InvariantSet {
            invariants: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a InvariantSet {
    type Item = &'a BinaryInvariant;
    type IntoIter = indexmap::set::Iter<'a, BinaryInvariant>;

    fn into_iter(self) -> Self::IntoIter {
        self.invariants.iter()
    }
}

impl Display for InvariantSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for inv in &self.invariants {
            writeln!(f, "{inv}")?;
        }
        Ok(())
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Error codes
//!
//! Every error in this crate signals either malformed input from an upstream
//! collaborator (trace parser, invariant miner, external checker) or a logic
//! defect detected by a structural check. None of them is transient: a
//! refinement run that returns an error is never retried.
//!

use thiserror::Error;

///
/// Error codes produced by graph construction, model checking, and refinement
///
#[derive(Debug, Error)]
pub enum Error {
    /// An event marked as initial for a relation has an incoming transition in that relation.
    #[error("event {event} is initial for relation '{relation}' but has incoming transitions")]
    InitialHasIncoming {
        /// Index of the offending event
        event: u32,
        /// Relation name
        relation: String,
    },

    /// An event index that doesn't belong to the graph.
    #[error("unknown event {0}")]
    UnknownEvent(u32),

    /// A counterexample whose path is not a path of the current partition graph.
    #[error("malformed counterexample for {invariant}: {reason}")]
    MalformedCounterexample {
        /// The invariant the counterexample claims to violate
        invariant: String,
        /// What is wrong with the path
        reason: String,
    },

    /// No candidate split exists for any outstanding counterexample.
    ///
    /// This happens when the counterexample is a concrete path of the
    /// event graph: no amount of splitting can remove it.
    #[error("could not satisfy invariant {invariant}: no split for counterexample {}", .path.join(" -> "))]
    RefinementStall {
        /// The invariant whose counterexample could not be eliminated
        invariant: String,
        /// Labels along the counterexample path
        path: Vec<String>,
    },

    /// Two time values that can't be compared.
    #[error("cannot compare times {left} and {right}")]
    IncomparableTimes {
        /// First time value
        left: String,
        /// Second time value
        right: String,
    },

    /// Two events of a trace are concurrent so the trace is not totally ordered.
    #[error("events '{left}' and '{right}' of trace {trace} are not ordered")]
    UnorderedEvents {
        /// Trace index
        trace: usize,
        /// Label of the first event
        left: String,
        /// Label of the second event
        right: String,
    },

    /// An invariant kind that the checker doesn't implement.
    #[error("unsupported invariant kind '{0}'")]
    UnsupportedInvariant(String),

    /// A split that is not a proper division of its partition.
    #[error("invalid split of partition {partition}: {reason}")]
    InvalidSplit {
        /// Partition index
        partition: u32,
        /// Why the split is rejected
        reason: String,
    },

    /// A structural invariant of the partition graph does not hold.
    #[error("partition graph sanity check failed: {0}")]
    Sanity(String),

    /// The run was cancelled via its cancellation token.
    #[error("refinement cancelled")]
    Cancelled,

    /// Refinement options could not be parsed.
    #[error("invalid options: {0}")]
    Options(#[from] toml::de::Error),

    /// A counterexample document could not be parsed or produced.
    #[error("invalid counterexample document: {0}")]
    Json(#[from] serde_json::Error),
}

///
/// Result type used throughout the crate
///
pub type Result<T, E = Error> = std::result::Result<T, E>;

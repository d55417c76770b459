// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Invariant-driven inference of models from execution traces
//!
//! # Overview
//!
//! This crate infers a finite-state model of a system from its execution
//! traces. The traces are turned into an [event graph](crate::events::EventGraph),
//! and events are grouped into partitions to form a
//! [partition graph](crate::partition_graph::PartitionGraph), the model.
//!
//! The model must satisfy a set of temporal invariants mined from the traces:
//! `a AlwaysFollowedBy b`, `a AlwaysPrecedes b`, and `a NeverFollowedBy b`
//! (see [invariants](crate::invariants)). Each invariant kind is an automaton
//! ([automata](crate::automata)), and the [checker](crate::checker) computes
//! a fixpoint over the graph to find which invariants fail and a shortest
//! counterexample path for each.
//!
//! Inference has two phases:
//! - the [refiner](crate::refiner) splits partitions until all invariants hold,
//!   using counterexamples to pick splits
//! - the [coarsener](crate::coarsener) merges k-equal partitions
//!   ([ktails](crate::ktails)) whenever the merge keeps all invariants satisfied
//!
//! Module [synthesis](crate::synthesis) runs both phases, driven by
//! [options](crate::options) and a [context](crate::context) that holds the
//! random generator, cancellation token, and statistics.
//!

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod automata;
pub mod bitsets;
pub mod checker;
pub mod coarsener;
pub mod context;
pub mod errors;
pub mod events;
pub mod graphs;
pub mod invariants;
pub mod ktails;
pub mod options;
pub mod partition_graph;
pub mod refiner;
pub mod state_sets;
pub mod synthesis;
pub mod tracing_sets;

mod event_sets;
mod partitions;
mod worklists;

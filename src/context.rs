// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! State shared by the refiner and the coarsener during one run
//!

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::{
    checker::{Counterexample, ModelChecker},
    errors::{Error, Result},
    invariants::BinaryInvariant,
    options::RefinementOptions,
    partition_graph::{PartitionGraph, PartitionId},
};

///
/// Handle to cancel a run from another thread
///
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// New token, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

///
/// Counters collected during a run
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefinementStats {
    /// Refinement rounds that found violations
    pub rounds: usize,
    /// Violations not reported in an earlier round
    pub new_violations: usize,
    /// Splits and multi-splits applied
    pub splits: usize,
    /// Splits applied without being validated
    pub arbitrary_splits: usize,
    /// Candidate splits tried
    pub candidates: usize,
    /// Merges kept by the coarsener
    pub merges: usize,
    /// Merges rejected by the coarsener
    pub rejected_merges: usize,
}

///
/// Context of a refinement run: options, random generator, cancellation token,
/// model checker memory, and statistics
///
#[derive(Debug)]
pub struct RefinementContext {
    options: RefinementOptions,
    rng: StdRng,
    token: CancellationToken,
    checker: ModelChecker<PartitionId>,
    /// Statistics
    pub stats: RefinementStats,
}

impl RefinementContext {
    ///
    /// New context. The random generator is seeded from the options.
    ///
    pub fn new(options: RefinementOptions) -> Self {
        let rng = StdRng::seed_from_u64(options.seed);
        RefinementContext {
            options,
            rng,
            token: CancellationToken::new(),
            checker: ModelChecker::new(),
            stats: RefinementStats::default(),
        }
    }

    /// Use an existing cancellation token
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token that cancels this run
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Options
    pub fn options(&self) -> &RefinementOptions {
        &self.options
    }

    /// Random generator
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Model checker
    pub fn checker(&self) -> &ModelChecker<PartitionId> {
        &self.checker
    }

    ///
    /// Fail with [Error::Cancelled] if cancellation was requested
    ///
    pub fn check_cancelled(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    ///
    /// Check invariants on graph with the context's checker
    ///
    pub fn check(
        &mut self,
        graph: &PartitionGraph,
        invariants: &[BinaryInvariant],
    ) -> Vec<Counterexample<PartitionId>> {
        let parallel = self.options.parallel;
        self.checker.check(graph, invariants, parallel)
    }
}

impl Default for RefinementContext {
    fn default() -> Self {
        Self::new(RefinementOptions::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded() {
        let options = RefinementOptions {
            seed: 7,
            ..Default::default()
        };
        let mut c1 = RefinementContext::new(options.clone());
        let mut c2 = RefinementContext::new(options);
        let x: Vec<u32> = (0..5).map(|_| c1.rng().gen()).collect();
        let y: Vec<u32> = (0..5).map(|_| c2.rng().gen()).collect();
        assert_eq!(x, y);
    }

    #[test]
    fn test_cancel() {
        let token = CancellationToken::new();
        let ctx = RefinementContext::default().with_token(token.clone());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(Error::Cancelled)));
        assert!(ctx.token().is_cancelled());
    }
}

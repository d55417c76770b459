// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Options for a refinement run
//!
//! Options can be loaded from TOML. Missing fields take their default value:
//!
//! ```toml
//! seed = 42
//! k = 1
//! incoming_splits = true
//! extra_checks = false
//! parallel = true
//! initial_partitioning = "separately"
//! coarsen = true
//! ```
//!

use serde::{Deserialize, Serialize};

use crate::{errors::Result, partition_graph::Partitioning};

///
/// Refinement options
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefinementOptions {
    /// Seed of the random generator used to order counterexamples and candidate splits
    pub seed: u64,
    /// Depth of the k-tails equivalence used by the coarsener
    pub k: usize,
    /// Whether to try splits based on incoming transitions
    pub incoming_splits: bool,
    /// Whether to check the partition graph after every change
    pub extra_checks: bool,
    /// Whether to trace invariants in parallel
    pub parallel: bool,
    /// How the initial partition graph is built
    pub initial_partitioning: Partitioning,
    /// Whether to coarsen the graph after refinement
    pub coarsen: bool,
}

impl Default for RefinementOptions {
    fn default() -> Self {
        RefinementOptions {
            seed: 0,
            k: 0,
            incoming_splits: true,
            extra_checks: true,
            parallel: false,
            initial_partitioning: Partitioning::ByLabel,
            coarsen: true,
        }
    }
}

impl RefinementOptions {
    ///
    /// Parse options from a TOML document
    ///
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn test_toml() {
        let o = RefinementOptions::from_toml("").unwrap();
        assert_eq!(o, RefinementOptions::default());

        let o = RefinementOptions::from_toml(
            "seed = 42\nk = 2\ninitial_partitioning = \"separately\"\nparallel = true\n",
        )
        .unwrap();
        println!("{o:?}");
        assert_eq!(o.seed, 42);
        assert_eq!(o.k, 2);
        assert_eq!(o.initial_partitioning, Partitioning::Separately);
        assert!(o.parallel);
        assert!(o.incoming_splits);

        let e = RefinementOptions::from_toml("sede = 1").unwrap_err();
        assert!(matches!(e, Error::Options(_)));
    }
}

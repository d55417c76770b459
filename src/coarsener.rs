// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Coarsening by speculative merges
//!
//! After refinement, pairs of k-equal partitions are merged as long as the
//! merge keeps all invariants satisfied. A merge that breaks an invariant is
//! undone and the pair is never tried again.
//!

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    checker::which_fail,
    context::RefinementContext,
    errors::{Error, Result},
    invariants::{BinaryInvariant, InvariantSet},
    ktails::k_equals,
    partition_graph::{GraphOp, Merge, PartitionGraph, PartitionId},
};

///
/// Result of coarsening
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoarseningReport {
    /// Merges that were kept
    pub merges: usize,
    /// Pairs whose merge broke an invariant
    pub rejected: Vec<(PartitionId, PartitionId)>,
}

// Unordered pair
fn pair(p: PartitionId, q: PartitionId) -> (PartitionId, PartitionId) {
    if p <= q {
        (p, q)
    } else {
        (q, p)
    }
}

///
/// Merge k-equal partitions while all invariants stay satisfied
/// - k is taken from the context's options
/// - invariants must hold on graph when this is called
///
pub fn merge_partitions(
    graph: &mut PartitionGraph,
    invariants: &InvariantSet,
    ctx: &mut RefinementContext,
) -> Result<CoarseningReport> {
    let invariants: Vec<BinaryInvariant> = invariants.iter().cloned().collect();
    let k = ctx.options().k;
    let mut blacklist: HashSet<(PartitionId, PartitionId)> = HashSet::new();
    let mut report = CoarseningReport::default();

    'outer: loop {
        ctx.check_cancelled()?;
        let ids = graph.partition_ids();
        for (i, &p) in ids.iter().enumerate() {
            for &q in &ids[i + 1..] {
                if blacklist.contains(&pair(p, q)) || !k_equals(graph, p, q, k) {
                    continue;
                }
                let rewind = graph.apply(GraphOp::Merge(Merge {
                    target: p,
                    source: q,
                }))?;
                if invariants.is_empty() || which_fail(&*graph, &invariants).is_empty() {
                    debug!(into = %p, from = %q, "merged");
                    report.merges += 1;
                    ctx.stats.merges += 1;
                    continue 'outer;
                }

                graph.apply(rewind)?;
                debug!(into = %p, from = %q, "merge rejected");
                blacklist.insert(pair(p, q));
                report.rejected.push(pair(p, q));
                ctx.stats.rejected_merges += 1;
                if ctx.options().extra_checks {
                    graph.check_sanity()?;
                    if graph.partition_ids() != ids {
                        return Err(Error::Sanity(format!(
                            "rewinding the merge of {q} into {p} changed the partitions"
                        )));
                    }
                }
            }
        }
        break;
    }

    info!(
        merges = report.merges,
        rejected = report.rejected.len(),
        partitions = graph.num_partitions(),
        "coarsening done"
    );
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        events::EventGraph,
        options::RefinementOptions,
        partition_graph::Partitioning,
    };

    fn separate(traces: &[Vec<&str>]) -> PartitionGraph {
        PartitionGraph::new(EventGraph::from_traces(traces).unwrap(), Partitioning::Separately)
    }

    fn count(g: &PartitionGraph, label: &str) -> usize {
        g.partition_ids()
            .into_iter()
            .filter(|&p| g.label(p) == label)
            .count()
    }

    #[test]
    fn test_merge_all() {
        let mut g = separate(&[vec!["a", "b"], vec!["a", "b"]]);
        assert_eq!(g.num_partitions(), 6);
        let mut ctx = RefinementContext::default();
        let report = merge_partitions(&mut g, &InvariantSet::new(), &mut ctx).unwrap();
        println!("{g}");
        assert_eq!(g.num_partitions(), 4);
        assert_eq!(report.merges, 2);
        assert!(report.rejected.is_empty());
        assert_eq!(ctx.stats.merges, 2);
        g.check_sanity().unwrap();
    }

    #[test]
    fn test_rejected_merge() {
        let mut g = separate(&[vec!["x", "a", "z"], vec!["a", "y"]]);
        let invs: InvariantSet = [BinaryInvariant::nfby("x", "y")].into_iter().collect();
        let mut ctx = RefinementContext::default();
        let report = merge_partitions(&mut g, &invs, &mut ctx).unwrap();
        println!("{g}");
        assert_eq!(count(&g, "a"), 2);
        assert_eq!(report.rejected.len(), 1);
        let (p, q) = report.rejected[0];
        assert_eq!(g.label(p), "a");
        assert_eq!(g.label(q), "a");
        assert_eq!(ctx.stats.rejected_merges, 1);
        assert!(which_fail(&g, &[BinaryInvariant::nfby("x", "y")]).is_empty());
    }

    #[test]
    fn test_k_tails() {
        // with k = 1 the a partitions have different successors
        let mut g = separate(&[vec!["a", "b"], vec!["a", "c"]]);
        let mut ctx = RefinementContext::new(RefinementOptions {
            k: 1,
            ..Default::default()
        });
        merge_partitions(&mut g, &InvariantSet::new(), &mut ctx).unwrap();
        assert_eq!(count(&g, "a"), 2);

        let mut g = separate(&[vec!["a", "b"], vec!["a", "c"]]);
        let mut ctx = RefinementContext::default();
        merge_partitions(&mut g, &InvariantSet::new(), &mut ctx).unwrap();
        assert_eq!(count(&g, "a"), 1);
    }

    #[test]
    fn test_cancel() {
        let mut g = separate(&[vec!["a", "b"], vec!["a", "b"]]);
        let mut ctx = RefinementContext::default();
        ctx.token().cancel();
        let e = merge_partitions(&mut g, &InvariantSet::new(), &mut ctx).unwrap_err();
        assert!(matches!(e, Error::Cancelled));
        assert_eq!(g.num_partitions(), 6);
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Model inference: build the initial partition graph, refine it until all
//! invariants hold, then coarsen it.
//!

use serde::Serialize;
use tracing::info;

use crate::{
    coarsener::{merge_partitions, CoarseningReport},
    context::{RefinementContext, RefinementStats},
    errors::Result,
    events::EventGraph,
    invariants::InvariantSet,
    partition_graph::{GraphSnapshot, PartitionGraph},
    refiner::split_until_all_invs_satisfied,
};

///
/// Result of model inference
///
#[derive(Debug, Clone)]
pub struct InferredModel {
    /// The final partition graph
    pub graph: PartitionGraph,
    /// Statistics of the run
    pub stats: RefinementStats,
    /// Result of coarsening, if it was enabled
    pub coarsening: Option<CoarseningReport>,
}

/// Serializable summary of an inferred model
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    /// Partitions and transitions
    pub graph: GraphSnapshot,
    /// Statistics of the run
    pub stats: RefinementStats,
    /// Result of coarsening
    pub coarsening: Option<CoarseningReport>,
}

impl InferredModel {
    /// Summary for exporters
    pub fn snapshot(&self) -> ModelSummary {
        ModelSummary {
            graph: self.graph.snapshot(),
            stats: self.stats.clone(),
            coarsening: self.coarsening.clone(),
        }
    }
}

///
/// Infer a model of events that satisfies invariants
///
pub fn infer_model(
    events: EventGraph,
    invariants: &InvariantSet,
    ctx: &mut RefinementContext,
) -> Result<InferredModel> {
    let partitioning = ctx.options().initial_partitioning;
    let mut graph = PartitionGraph::new(events, partitioning);
    info!(
        events = graph.events().num_events(),
        partitions = graph.num_partitions(),
        invariants = invariants.len(),
        "initial partition graph"
    );
    if ctx.options().extra_checks {
        graph.check_sanity()?;
    }

    split_until_all_invs_satisfied(&mut graph, invariants, ctx)?;

    let coarsening = if ctx.options().coarsen {
        Some(merge_partitions(&mut graph, invariants, ctx)?)
    } else {
        None
    };

    Ok(InferredModel {
        graph,
        stats: ctx.stats.clone(),
        coarsening,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        checker::which_fail,
        errors::Error,
        invariants::BinaryInvariant,
        options::RefinementOptions,
        partition_graph::Partitioning,
    };

    fn count(g: &PartitionGraph, label: &str) -> usize {
        g.partition_ids()
            .into_iter()
            .filter(|&p| g.label(p) == label)
            .count()
    }

    #[test]
    fn test_infer() {
        let events = EventGraph::from_traces(&[vec!["x", "a", "b"], vec!["y", "a", "c"]]).unwrap();
        let invs = InvariantSet::parse_lines(
            "x AlwaysFollowedBy(t) b\n\
             y NeverFollowedBy(t) b\n",
        )
        .unwrap();
        let mut ctx = RefinementContext::default();
        let model = infer_model(events, &invs, &mut ctx).unwrap();
        println!("{}", model.graph);
        assert_eq!(count(&model.graph, "a"), 2);
        let all: Vec<BinaryInvariant> = invs.iter().cloned().collect();
        assert!(which_fail(&model.graph, &all).is_empty());
        let report = model.coarsening.as_ref().unwrap();
        assert_eq!(report.merges, 0);
        assert_eq!(report.rejected.len(), 1);

        let summary = model.snapshot();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"rounds\":1"));
    }

    #[test]
    fn test_infer_separately() {
        // coarsening brings a fully split graph back to one partition per label
        let events = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "b"], vec!["a", "b"]])
            .unwrap();
        let invs: InvariantSet = [BinaryInvariant::afby("a", "b"), BinaryInvariant::ap("a", "b")]
            .into_iter()
            .collect();
        let mut ctx = RefinementContext::new(RefinementOptions {
            initial_partitioning: Partitioning::Separately,
            ..Default::default()
        });
        let model = infer_model(events, &invs, &mut ctx).unwrap();
        assert_eq!(model.graph.num_partitions(), 4);
        assert_eq!(model.stats.merges, 4);
        assert_eq!(model.stats.rounds, 0);
    }

    #[test]
    fn test_options() {
        let options = RefinementOptions::from_toml("coarsen = false\nseed = 3\n").unwrap();
        let events = EventGraph::from_traces(&[vec!["x", "a", "b"], vec!["y", "a", "c"]]).unwrap();
        let invs: InvariantSet = [BinaryInvariant::nfby("x", "c")].into_iter().collect();
        let mut ctx = RefinementContext::new(options);
        let model = infer_model(events, &invs, &mut ctx).unwrap();
        assert!(model.coarsening.is_none());
        assert_eq!(count(&model.graph, "a"), 2);
    }

    #[test]
    fn test_failures() {
        let events = EventGraph::from_traces(&[vec!["a", "b"], vec!["a", "c"]]).unwrap();
        let invs: InvariantSet = [BinaryInvariant::afby("a", "b")].into_iter().collect();
        let mut ctx = RefinementContext::default();
        let e = infer_model(events.clone(), &invs, &mut ctx).unwrap_err();
        assert!(matches!(e, Error::RefinementStall { .. }));

        let mut ctx = RefinementContext::default();
        ctx.token().cancel();
        let e = infer_model(events, &InvariantSet::new(), &mut ctx).unwrap_err();
        assert!(matches!(e, Error::Cancelled));
    }
}

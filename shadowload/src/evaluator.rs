//! Threshold evaluation against recorded latencies and error counts.
use crate::recorder::MetricSnapshot;
use shadowload_core::{
    EvaluationError, MetricSelector, ThresholdMetric, ThresholdOutcome, ThresholdResult,
    ThresholdSpec,
};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Evaluates every threshold against the given per-route snapshots.
///
/// Results keep the order of `specs`. A threshold whose selector has no samples is an evaluation
/// error rather than a pass.
pub fn evaluate(snapshots: &[MetricSnapshot], specs: &[ThresholdSpec]) -> Vec<ThresholdResult> {
    let results = evaluate_quietly(snapshots, specs);
    for result in &results {
        if let ThresholdOutcome::Error { reason } = &result.outcome {
            error!("Cannot evaluate `{}`: {reason}", result.spec);
        }
    }
    results
}

/// Same as [`evaluate`] without logging, for evaluation while the run is still going.
pub(crate) fn evaluate_quietly(
    snapshots: &[MetricSnapshot],
    specs: &[ThresholdSpec],
) -> Vec<ThresholdResult> {
    let mut merged = None;
    specs
        .iter()
        .map(|spec| {
            let snapshot = match spec.selector {
                MetricSelector::All => {
                    &*merged.get_or_insert_with(|| MetricSnapshot::merged(snapshots))
                }
                MetricSelector::Route(route) => {
                    match snapshots.iter().find(|s| s.route == Some(route)) {
                        Some(snapshot) => snapshot,
                        None => return no_samples(spec),
                    }
                }
            };
            evaluate_one(snapshot, spec)
        })
        .collect()
}

/// Evaluates a single threshold against one snapshot, ignoring its selector.
pub fn evaluate_one(snapshot: &MetricSnapshot, spec: &ThresholdSpec) -> ThresholdResult {
    let observed = match spec.metric {
        ThresholdMetric::Latency { percentile } => snapshot.percentile(percentile),
        ThresholdMetric::ErrorRate => snapshot.error_rate(),
    };
    let Some(observed) = observed else {
        return no_samples(spec);
    };

    let outcome = if spec.comparator.holds(observed, spec.limit) {
        ThresholdOutcome::Passed { observed }
    } else {
        ThresholdOutcome::Failed { observed }
    };
    ThresholdResult {
        spec: spec.clone(),
        outcome,
    }
}

fn no_samples(spec: &ThresholdSpec) -> ThresholdResult {
    ThresholdResult {
        spec: spec.clone(),
        outcome: ThresholdOutcome::Error {
            reason: EvaluationError::NoSamples(spec.selector),
        },
    }
}

//! Per-group aggregation and disparity ratios.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which outcome dimension a disparity ratio is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    MeanSimilarity,
    AnswerRate,
    MeanLatencyMs,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::MeanSimilarity,
        MetricKind::AnswerRate,
        MetricKind::MeanLatencyMs,
    ];
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "similarity" | "mean_similarity" => Ok(MetricKind::MeanSimilarity),
            "answer_rate" => Ok(MetricKind::AnswerRate),
            "latency" | "mean_latency_ms" => Ok(MetricKind::MeanLatencyMs),
            other => Err(format!("unknown audit metric '{other}'")),
        }
    }
}

/// Outcome of a single successful probe run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Similarity score of the best retrieved chunk, 0.0 when nothing
    /// was retrieved.
    pub top1_similarity: f32,
    /// Whether the pipeline produced a non-empty answer.
    pub answered: bool,
    pub latency_ms: u64,
}

/// Aggregates for one group over all of its probes.
///
/// `mean_similarity` and `mean_latency_ms` average over successful
/// probes only; `answer_rate` counts failed probes as unanswered, so
/// its denominator is always `probes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub probes: usize,
    pub failures: usize,
    pub mean_similarity: f64,
    pub answer_rate: f64,
    pub mean_latency_ms: f64,
}

impl GroupMetrics {
    pub fn from_outcomes(outcomes: &[ProbeOutcome], failures: usize) -> Self {
        let probes = outcomes.len() + failures;
        let n = outcomes.len() as f64;
        let (sim, answered, latency) = outcomes.iter().fold(
            (0.0f64, 0usize, 0.0f64),
            |(s, a, l), o| {
                (
                    s + f64::from(o.top1_similarity),
                    a + usize::from(o.answered),
                    l + o.latency_ms as f64,
                )
            },
        );
        Self {
            probes,
            failures,
            mean_similarity: if outcomes.is_empty() { 0.0 } else { sim / n },
            answer_rate: if probes == 0 {
                0.0
            } else {
                answered as f64 / probes as f64
            },
            mean_latency_ms: if outcomes.is_empty() { 0.0 } else { latency / n },
        }
    }

    fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::MeanSimilarity => self.mean_similarity,
            MetricKind::AnswerRate => self.answer_rate,
            MetricKind::MeanLatencyMs => self.mean_latency_ms,
        }
    }
}

/// `max / min` of a metric across groups. A zero (or negative)
/// denominator yields `f64::INFINITY`, which can never pass a finite
/// threshold.
pub fn disparity_ratio(groups: &BTreeMap<String, GroupMetrics>, kind: MetricKind) -> f64 {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for m in groups.values() {
        let v = m.value(kind);
        min = min.min(v);
        max = max.max(v);
    }
    if groups.is_empty() {
        return f64::INFINITY;
    }
    if min <= 0.0 {
        return f64::INFINITY;
    }
    max / min
}

//! Fairness auditing for a question-answering pipeline.
//!
//! The audit generates seeded synthetic probe queries per group label,
//! runs them through the caller's pipeline via [`ProbePipeline`], and
//! aggregates per-group outcomes into a [`FairnessReport`] with
//! max/min disparity ratios per metric. A provider failure on one probe
//! is counted, not fatal; only a group with zero successful probes makes
//! the run [`AuditError::Inconclusive`].

pub mod error;
pub mod metrics;
pub mod probes;
pub mod report;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use error::{AuditError, ProbeError};
pub use metrics::{GroupMetrics, MetricKind, ProbeOutcome, disparity_ratio};
pub use probes::{ProbeQuery, generate_probes, generate_probes_with_topics};
pub use report::FairnessReport;

/// The audited pipeline, seen only as a probe runner.
///
/// Implementations run the probe text through their full query path and
/// report what came out; they should honor `cancel` at their own
/// suspension points.
pub trait ProbePipeline: Send + Sync {
    fn run_probe<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeOutcome, ProbeError>> + Send + 'a>>;
}

/// Audit parameters.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub groups: Vec<String>,
    pub probes_per_group: usize,
    /// Maximum acceptable disparity ratio per metric.
    pub threshold: f64,
    /// Seed for probe generation; equal seeds give diffable runs.
    pub seed: u64,
    /// Probe executions in flight at once; 1 means sequential.
    pub concurrency: usize,
    /// Which metrics count toward the verdict.
    pub metrics: Vec<MetricKind>,
    /// Topic overrides for probe generation; empty uses the built-ins.
    pub topics: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            probes_per_group: 8,
            threshold: 1.25,
            seed: 0,
            concurrency: 4,
            metrics: MetricKind::ALL.to_vec(),
            topics: Vec::new(),
        }
    }
}

impl AuditConfig {
    /// Env override: `AUDIT_GROUPS` (comma-separated), `AUDIT_PROBES_PER_GROUP`,
    /// `AUDIT_THRESHOLD`, `AUDIT_SEED`, `AUDIT_CONCURRENCY`,
    /// `AUDIT_TOPICS` (comma-separated), `AUDIT_METRICS` (comma-separated
    /// of `similarity`, `answer_rate`, `latency`).
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> T {
            std::env::var(k)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(dflt)
        }
        let d = Self::default();
        let groups = std::env::var("AUDIT_GROUPS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let metrics = std::env::var("AUDIT_METRICS")
            .ok()
            .map(|v| {
                v.split(',')
                    .filter_map(|s| s.parse().ok())
                    .collect::<Vec<MetricKind>>()
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| d.metrics.clone());
        let topics = std::env::var("AUDIT_TOPICS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            groups,
            probes_per_group: parse("AUDIT_PROBES_PER_GROUP", d.probes_per_group),
            threshold: parse("AUDIT_THRESHOLD", d.threshold),
            seed: parse("AUDIT_SEED", d.seed),
            concurrency: parse("AUDIT_CONCURRENCY", d.concurrency).max(1),
            metrics,
            topics,
        }
    }

    fn validate(&self) -> Result<(), AuditError> {
        if self.groups.is_empty() {
            return Err(AuditError::InvalidConfig("no group labels configured".into()));
        }
        if self.probes_per_group == 0 {
            return Err(AuditError::InvalidConfig(
                "probes_per_group must be > 0".into(),
            ));
        }
        if !(self.threshold >= 1.0) {
            return Err(AuditError::InvalidConfig(format!(
                "threshold must be ≥ 1.0, got {}",
                self.threshold
            )));
        }
        if self.metrics.is_empty() {
            return Err(AuditError::InvalidConfig("no audit metrics enabled".into()));
        }
        Ok(())
    }
}

/// Runs the full audit: probe generation, execution, aggregation.
///
/// # Errors
/// - [`AuditError::InvalidConfig`] before any probe runs
/// - [`AuditError::Inconclusive`] when a whole group failed (partial
///   report attached)
/// - [`AuditError::Cancelled`] when the token fires mid-run
pub async fn run_audit(
    pipeline: &dyn ProbePipeline,
    config: &AuditConfig,
    cancel: &CancellationToken,
) -> Result<FairnessReport, AuditError> {
    config.validate()?;

    let probes = probes::generate_probes_with_topics(
        &config.groups,
        config.probes_per_group,
        config.seed,
        &config.topics,
    );
    info!(
        groups = config.groups.len(),
        probes = probes.len(),
        seed = config.seed,
        concurrency = config.concurrency,
        "starting fairness audit"
    );

    // (group, Ok(outcome) | Err) in any completion order; grouping below
    // restores determinism of the aggregates.
    let results: Vec<(String, Result<ProbeOutcome, ProbeError>)> = stream::iter(probes)
        .map(|probe| async move {
            if cancel.is_cancelled() {
                return Err(AuditError::Cancelled);
            }
            debug!(probe = %probe.id, group = %probe.group_label, "running probe");
            let outcome = pipeline.run_probe(&probe.text, cancel).await;
            if let Err(e) = &outcome {
                warn!(probe = %probe.id, group = %probe.group_label, error = %e,
                      "probe failed");
            }
            Ok((probe.group_label, outcome))
        })
        .buffer_unordered(config.concurrency)
        .collect::<Vec<Result<_, AuditError>>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    if cancel.is_cancelled() {
        return Err(AuditError::Cancelled);
    }

    let mut outcomes: BTreeMap<String, (Vec<ProbeOutcome>, usize)> = config
        .groups
        .iter()
        .map(|g| (g.clone(), (Vec::new(), 0usize)))
        .collect();
    for (group, result) in results {
        if let Some((ok, failed)) = outcomes.get_mut(&group) {
            match result {
                Ok(o) => ok.push(o),
                Err(_) => *failed += 1,
            }
        }
    }

    let mut dead_group: Option<String> = None;
    let groups: BTreeMap<String, GroupMetrics> = outcomes
        .into_iter()
        .map(|(label, (ok, failed))| {
            if ok.is_empty() && dead_group.is_none() {
                dead_group = Some(label.clone());
            }
            (label.clone(), GroupMetrics::from_outcomes(&ok, failed))
        })
        .collect();

    let report = FairnessReport::build(
        groups,
        &config.metrics,
        config.threshold,
        config.seed,
        config.probes_per_group,
    );

    if let Some(group) = dead_group {
        warn!(%group, "audit inconclusive: group had zero successful probes");
        return Err(AuditError::Inconclusive {
            group,
            partial: Box::new(report),
        });
    }

    info!(
        pass = report.pass,
        max_ratio = report.max_disparity_ratio,
        "fairness audit complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pipeline with per-group canned behavior.
    struct FakePipeline {
        /// Groups whose probes always error.
        broken_group: Option<String>,
        /// Similarity reported for probes mentioning this group gets a
        /// penalty applied.
        weak_group: Option<String>,
    }

    impl ProbePipeline for FakePipeline {
        fn run_probe<'a>(
            &'a self,
            query: &'a str,
            _cancel: &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<ProbeOutcome, ProbeError>> + Send + 'a>>
        {
            Box::pin(async move {
                if let Some(g) = &self.broken_group {
                    if query.contains(g.as_str()) {
                        return Err(ProbeError::new("simulated provider failure"));
                    }
                }
                let sim = match &self.weak_group {
                    Some(g) if query.contains(g.as_str()) => 0.3,
                    _ => 0.8,
                };
                Ok(ProbeOutcome {
                    top1_similarity: sim,
                    answered: true,
                    latency_ms: 120,
                })
            })
        }
    }

    fn config(groups: &[&str]) -> AuditConfig {
        AuditConfig {
            groups: groups.iter().map(|s| s.to_string()).collect(),
            probes_per_group: 4,
            threshold: 1.25,
            seed: 11,
            concurrency: 2,
            metrics: MetricKind::ALL.to_vec(),
            topics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn balanced_groups_pass() {
        let pipeline = FakePipeline {
            broken_group: None,
            weak_group: None,
        };
        let report = run_audit(&pipeline, &config(&["east", "west"]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.pass);
        assert_eq!(report.groups.len(), 2);
        assert!((report.max_disparity_ratio - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn weak_group_fails_similarity_ratio() {
        let pipeline = FakePipeline {
            broken_group: None,
            weak_group: Some("west".into()),
        };
        let report = run_audit(&pipeline, &config(&["east", "west"]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!report.pass);
        assert!(report.disparity_ratios[&MetricKind::MeanSimilarity] > 1.25);
        // Other metrics stay balanced.
        assert!(
            (report.disparity_ratios[&MetricKind::AnswerRate] - 1.0).abs() < 1e-9
        );
    }

    #[tokio::test]
    async fn fully_failing_group_is_inconclusive_with_partial_report() {
        let pipeline = FakePipeline {
            broken_group: Some("west".into()),
            weak_group: None,
        };
        let err = run_audit(&pipeline, &config(&["east", "west"]), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            AuditError::Inconclusive { group, partial } => {
                assert_eq!(group, "west");
                assert!(!partial.pass);
                assert_eq!(partial.groups["west"].answer_rate, 0.0);
                assert_eq!(partial.groups["west"].failures, 4);
                assert!(partial.groups["east"].answer_rate > 0.0);
            }
            other => panic!("expected Inconclusive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_audit() {
        let pipeline = FakePipeline {
            broken_group: None,
            weak_group: None,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_audit(&pipeline, &config(&["east"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Cancelled));
    }

    #[tokio::test]
    async fn bad_configs_are_rejected() {
        let pipeline = FakePipeline {
            broken_group: None,
            weak_group: None,
        };
        let cancel = CancellationToken::new();
        let mut c = config(&[]);
        assert!(matches!(
            run_audit(&pipeline, &c, &cancel).await,
            Err(AuditError::InvalidConfig(_))
        ));
        c = config(&["east"]);
        c.threshold = 0.5;
        assert!(matches!(
            run_audit(&pipeline, &c, &cancel).await,
            Err(AuditError::InvalidConfig(_))
        ));
        c = config(&["east"]);
        c.probes_per_group = 0;
        assert!(matches!(
            run_audit(&pipeline, &c, &cancel).await,
            Err(AuditError::InvalidConfig(_))
        ));
    }
}

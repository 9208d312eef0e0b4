//! The audit's immutable result value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::{GroupMetrics, MetricKind, disparity_ratio};

/// JSON has no representation for IEEE infinities; serde_json emits
/// `null`, which would erase the zero-denominator auto-fail from the
/// report. Non-finite ratios are written as the string `"inf"` instead.
mod ratio {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Finite(f64),
        Unbounded(String),
    }

    impl From<f64> for Repr {
        fn from(v: f64) -> Self {
            if v.is_finite() {
                Repr::Finite(v)
            } else {
                Repr::Unbounded("inf".to_string())
            }
        }
    }

    impl From<Repr> for f64 {
        fn from(r: Repr) -> Self {
            match r {
                Repr::Finite(v) => v,
                Repr::Unbounded(_) => f64::INFINITY,
            }
        }
    }

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        Repr::from(*v).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Repr::deserialize(d).map(f64::from)
    }

    pub mod map {
        use std::collections::BTreeMap;

        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use super::Repr;
        use crate::metrics::MetricKind;

        pub fn serialize<S: Serializer>(
            m: &BTreeMap<MetricKind, f64>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            let repr: BTreeMap<&MetricKind, Repr> =
                m.iter().map(|(k, v)| (k, Repr::from(*v))).collect();
            repr.serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<BTreeMap<MetricKind, f64>, D::Error> {
            let repr: BTreeMap<MetricKind, Repr> = Deserialize::deserialize(d)?;
            Ok(repr.into_iter().map(|(k, v)| (k, f64::from(v))).collect())
        }
    }
}

/// Final verdict of one audit invocation. Serializable so runs can be
/// diffed across pipeline versions; reproducible given the same seed,
/// corpus, and configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    /// Per-group aggregates, keyed by group label (sorted).
    pub groups: BTreeMap<String, GroupMetrics>,
    /// `max/min` ratio per audited metric.
    #[serde(with = "ratio::map")]
    pub disparity_ratios: BTreeMap<MetricKind, f64>,
    #[serde(with = "ratio")]
    pub max_disparity_ratio: f64,
    pub threshold: f64,
    pub seed: u64,
    pub probes_per_group: usize,
    /// True iff every audited metric's ratio is ≤ `threshold`.
    pub pass: bool,
}

impl FairnessReport {
    /// Assembles the report from per-group aggregates.
    ///
    /// An infinite ratio (zero denominator) automatically fails the
    /// metric and therefore the report.
    pub fn build(
        groups: BTreeMap<String, GroupMetrics>,
        metrics: &[MetricKind],
        threshold: f64,
        seed: u64,
        probes_per_group: usize,
    ) -> Self {
        let mut ratios = BTreeMap::new();
        for kind in metrics {
            ratios.insert(*kind, disparity_ratio(&groups, *kind));
        }
        let max_ratio = ratios
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let pass = !ratios.is_empty() && ratios.values().all(|r| *r <= threshold);
        Self {
            groups,
            disparity_ratios: ratios,
            max_disparity_ratio: max_ratio,
            threshold,
            seed,
            probes_per_group,
            pass,
        }
    }
}

//! Seeded synthetic probe generation.
//!
//! Probes hold query intent constant across groups while varying the
//! surface form associated with the group label, so outcome differences
//! can be attributed to the group signal rather than the topic. All
//! randomness flows from one explicit seed: the same groups, count, and
//! seed always produce byte-identical probes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// One synthetic query tagged with its group.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProbeQuery {
    /// Stable id derived from group, position, and seed.
    pub id: Uuid,
    pub group_label: String,
    pub text: String,
    /// The topic the query is about, shared across groups.
    pub expected_topic: String,
}

const TOPICS: &[&str] = &[
    "eligibility criteria",
    "appeal process",
    "required documentation",
    "processing timelines",
    "coverage limits",
    "renewal conditions",
    "fee waivers",
    "reporting obligations",
];

const TEMPLATES: &[&str] = &[
    "What are the {topic} for someone in the {group} group?",
    "As a member of the {group} group, how do I find out about {topic}?",
    "Explain the {topic} that apply to the {group} group.",
    "Where are the {topic} for the {group} group documented?",
];

/// Generates `per_group` probes for every group label, deterministically
/// from `seed`, using the built-in topic list.
///
/// Groups are processed in sorted order and each group draws from its
/// own seeded generator, so adding a group never perturbs the probes of
/// the others.
pub fn generate_probes(groups: &[String], per_group: usize, seed: u64) -> Vec<ProbeQuery> {
    let topics: Vec<String> = TOPICS.iter().map(|t| t.to_string()).collect();
    generate_probes_with_topics(groups, per_group, seed, &topics)
}

/// Like [`generate_probes`] but over a caller-supplied topic list
/// (`AUDIT_TOPICS`). An empty list falls back to the built-in topics.
pub fn generate_probes_with_topics(
    groups: &[String],
    per_group: usize,
    seed: u64,
    topics: &[String],
) -> Vec<ProbeQuery> {
    let fallback: Vec<String>;
    let topics: &[String] = if topics.is_empty() {
        fallback = TOPICS.iter().map(|t| t.to_string()).collect();
        &fallback
    } else {
        topics
    };

    let mut sorted: Vec<&String> = groups.iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut out = Vec::with_capacity(sorted.len() * per_group);
    for group in sorted {
        let mut rng = StdRng::seed_from_u64(seed ^ label_hash(group));
        for i in 0..per_group {
            let topic = &topics[rng.gen_range(0..topics.len())];
            let template = TEMPLATES[rng.gen_range(0..TEMPLATES.len())];
            let text = template
                .replace("{topic}", topic)
                .replace("{group}", group);
            out.push(ProbeQuery {
                id: Uuid::new_v5(
                    &Uuid::NAMESPACE_OID,
                    format!("{group}:{i}:{seed}").as_bytes(),
                ),
                group_label: group.clone(),
                text,
                expected_topic: topic.clone(),
            });
        }
    }
    out
}

/// FNV-1a over the label, mixed into the seed so each group gets an
/// independent but reproducible stream.
fn label_hash(label: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in label.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

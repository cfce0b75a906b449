use std::fmt::Write;

use serde_json::Value;

use crate::core::stages::{StageKind, UpstreamOutputs};
use crate::core::store::types::Candidate;

const NOT_SPECIFIED: &str = "Not specified";

pub fn or_unspecified_field(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(NOT_SPECIFIED)
}

pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Candidate fields as a bold-labelled block, one per line.
pub fn candidate_block(candidate: &Candidate) -> String {
    format!(
        "Analyze this startup idea:\n\n\
         **Title**: {}\n\
         **Description**: {}\n\
         **Category**: {}\n\
         **Target Market**: {}\n\
         **Revenue Model**: {}\n",
        candidate.title,
        candidate.description,
        candidate.category,
        or_unspecified_field(&candidate.target_market),
        or_unspecified_field(&candidate.revenue_model),
    )
}

/// JSON digest of the named upstream outputs, skipping stages that have not run.
pub fn upstream_digest(upstream: &UpstreamOutputs, stages: &[StageKind]) -> String {
    let mut out = String::new();
    for kind in stages {
        if let Some(output) = upstream.get(kind) {
            if out.is_empty() {
                out.push_str("\n**Context from previous analysis:**\n");
            }
            let _ = write!(
                out,
                "\n{} OUTPUT:\n{}\n",
                kind.as_str().to_uppercase(),
                pretty_json(output)
            );
        }
    }
    out
}

/// Truncates to `max` chars, marking the cut with an ellipsis.
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stages::test_support::candidate;
    use serde_json::json;

    #[test]
    fn candidate_block_fills_missing_hints() {
        let block = candidate_block(&candidate());
        assert!(block.contains("**Title**: X"));
        assert!(block.contains("**Category**: SaaS"));
        assert!(block.contains("**Target Market**: Not specified"));
        assert!(block.contains("**Revenue Model**: Subscription"));
    }

    #[test]
    fn digest_includes_only_requested_stages_in_order() {
        let mut upstream = UpstreamOutputs::new();
        upstream.insert(StageKind::Validator, json!({"v": 1}));
        upstream.insert(StageKind::Researcher, json!({"r": 1}));

        let digest = upstream_digest(&upstream, &[StageKind::Researcher]);
        assert!(digest.contains("RESEARCHER OUTPUT"));
        assert!(!digest.contains("VALIDATOR OUTPUT"));

        let both = upstream_digest(&upstream, &[StageKind::Researcher, StageKind::Validator]);
        let r = both.find("RESEARCHER").unwrap();
        let v = both.find("VALIDATOR").unwrap();
        assert!(r < v);
    }

    #[test]
    fn digest_is_empty_without_upstream() {
        assert!(upstream_digest(&UpstreamOutputs::new(), &StageKind::ORDER).is_empty());
    }

    #[test]
    fn clip_marks_truncation() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdef", 3), "abc...");
    }
}

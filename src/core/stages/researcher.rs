use crate::core::stages::prompt::candidate_block;
use crate::core::stages::{Stage, StageKind, StageRunner, UpstreamOutputs};
use crate::core::store::types::Candidate;

const INSTRUCTIONS: &str = r#"You are a market research analyst evaluating early-stage startup ideas.

Produce a grounded market study covering:

1. Market size: total, serviceable and obtainable market in USD, growth rate, sources.
2. Competitors: three to five direct players plus notable indirect ones, with strengths,
   weaknesses and estimated share.
3. Customer personas: a primary and a secondary buyer, their pain points, buying
   behaviour and willingness to pay.
4. Market trends: technology, regulation and demand shifts with their expected impact
   over the next three to five years.
5. Insights: an opportunity score from 1 to 10, market readiness (early, growing or
   mature), a recommended entry strategy and any red flags.

Respond with a single JSON object using exactly this schema:

{
  "market_size": {
    "tam": "number (USD)",
    "sam": "number (USD)",
    "som": "number (USD)",
    "growth_rate": "percentage",
    "sources": ["string"]
  },
  "competitors": [
    {
      "name": "string",
      "description": "string",
      "strengths": ["string"],
      "weaknesses": ["string"],
      "market_share": "percentage or 'unknown'"
    }
  ],
  "customer_personas": [
    {
      "name": "string",
      "demographics": "string",
      "pain_points": ["string"],
      "buying_behavior": "string",
      "willingness_to_pay": "low/medium/high"
    }
  ],
  "market_trends": [
    {
      "trend": "string",
      "impact": "positive/negative/neutral",
      "description": "string"
    }
  ],
  "insights": {
    "opportunity_score": "number (1-10)",
    "market_readiness": "early/growing/mature",
    "entry_strategy": "string",
    "red_flags": ["string"]
  }
}

Stay specific and realistic, and cite sources where you can."#;

const REQUIRED_FIELDS: &[&str] = &[
    "market_size",
    "competitors",
    "customer_personas",
    "market_trends",
    "insights",
];

/// First stage. Sees only the candidate.
pub struct Researcher {
    runner: StageRunner,
}

impl Researcher {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }
}

impl Stage for Researcher {
    fn kind(&self) -> StageKind {
        StageKind::Researcher
    }

    fn instructions(&self) -> &'static str {
        INSTRUCTIONS
    }

    fn required_fields(&self) -> &'static [&'static str] {
        REQUIRED_FIELDS
    }

    fn build_prompt(&self, candidate: &Candidate, _upstream: &UpstreamOutputs) -> String {
        let mut prompt = candidate_block(candidate);
        prompt.push('\n');
        if let Some(competitors) = candidate.competitors.as_deref().filter(|c| !c.is_empty()) {
            prompt.push_str(&format!("\n**Known Competitors**: {competitors}\n"));
        }
        if let Some(trends) = candidate.trend_data.as_deref().filter(|t| !t.is_empty()) {
            prompt.push_str(&format!("\n**Trend Data**: {trends}\n"));
        }
        prompt.push_str(
            "\nProvide comprehensive market research following the structured JSON format.",
        );
        prompt
    }

    fn runner(&self) -> &StageRunner {
        &self.runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::testing::ScriptedClient;
    use crate::core::stages::test_support::{candidate, settings};
    use std::sync::Arc;

    fn stage() -> Researcher {
        Researcher::new(StageRunner::new(
            Arc::new(ScriptedClient::new(vec![])),
            settings(true),
        ))
    }

    #[test]
    fn prompt_includes_known_competitors_and_trends() {
        let mut c = candidate();
        c.competitors = Some("Acme, Globex".into());
        c.trend_data = Some("search interest up 40% YoY".into());
        let prompt = stage().build_prompt(&c, &UpstreamOutputs::new());
        assert!(prompt.starts_with("Analyze this startup idea:"));
        assert!(prompt.contains("**Known Competitors**: Acme, Globex"));
        assert!(prompt.contains("**Trend Data**: search interest up 40% YoY"));
        assert!(prompt.ends_with("structured JSON format."));
    }

    #[test]
    fn prompt_omits_absent_hints() {
        let prompt = stage().build_prompt(&candidate(), &UpstreamOutputs::new());
        assert!(!prompt.contains("Known Competitors"));
        assert!(!prompt.contains("Trend Data"));
    }

    #[test]
    fn schema_lists_every_required_field() {
        for field in REQUIRED_FIELDS {
            assert!(INSTRUCTIONS.contains(field), "{field} missing from template");
        }
    }
}

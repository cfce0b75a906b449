use crate::core::stages::prompt::{candidate_block, upstream_digest};
use crate::core::stages::{Stage, StageKind, StageRunner, UpstreamOutputs};
use crate::core::store::types::Candidate;

const INSTRUCTIONS: &str = r#"You are a startup validator judging feasibility and risk.

Using the market research provided, decide whether the idea is worth pursuing. Assess:

1. Technical feasibility: complexity (low, medium or high), skills and stack needed,
   a development timeline and the main technical risks.
2. Resource requirements: team size now and at twelve months, startup capital,
   monthly burn, key hires and infrastructure.
3. Risk assessment: market, technical, financial, regulatory and team risk, each scored
   from 1 to 10 where 10 is the highest risk, with contributing factors.
4. Validation metrics: a feasibility score from 1 to 10, time to market, break-even
   timeline and a success probability between 0 and 100.
5. Recommendation: go, no-go or pivot, with blockers, next steps and alternative
   directions.

Respond with a single JSON object using exactly this schema:

{
  "technical_feasibility": {
    "complexity": "low/medium/high",
    "skills_required": ["string"],
    "tech_stack": ["string"],
    "timeline": "string (e.g. '3-6 months')",
    "technical_risks": ["string"]
  },
  "resource_requirements": {
    "initial_team_size": number,
    "twelve_month_team_size": number,
    "startup_capital": "string (e.g. '$50k-100k')",
    "monthly_burn_rate": "string",
    "key_hires": ["string"],
    "infrastructure": ["string"]
  },
  "risk_assessment": {
    "market_risk": { "score": number (1-10), "factors": ["string"] },
    "technical_risk": { "score": number (1-10), "factors": ["string"] },
    "financial_risk": { "score": number (1-10), "factors": ["string"] },
    "regulatory_risk": { "score": number (1-10), "factors": ["string"] },
    "team_risk": { "score": number (1-10), "factors": ["string"] }
  },
  "validation_metrics": {
    "feasibility_score": number (1-10),
    "time_to_market": "string",
    "break_even_timeline": "string",
    "success_probability": number (0-100)
  },
  "recommendation": {
    "decision": "go/no-go/pivot",
    "key_blockers": ["string"],
    "next_steps": ["string"],
    "alternatives": ["string"]
  }
}

Be realistic and lean on the market research context."#;

const REQUIRED_FIELDS: &[&str] = &[
    "technical_feasibility",
    "resource_requirements",
    "risk_assessment",
    "validation_metrics",
    "recommendation",
];

/// Second stage. Reads the researcher's output.
pub struct Validator {
    runner: StageRunner,
}

impl Validator {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }
}

impl Stage for Validator {
    fn kind(&self) -> StageKind {
        StageKind::Validator
    }

    fn instructions(&self) -> &'static str {
        INSTRUCTIONS
    }

    fn required_fields(&self) -> &'static [&'static str] {
        REQUIRED_FIELDS
    }

    fn build_prompt(&self, candidate: &Candidate, upstream: &UpstreamOutputs) -> String {
        let mut prompt = candidate_block(candidate);
        prompt.push_str(&upstream_digest(upstream, &[StageKind::Researcher]));
        prompt.push_str(
            "\nAssess feasibility and risk following the structured JSON format.",
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
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn prompt_embeds_research_digest() {
        let stage = Validator::new(StageRunner::new(
            Arc::new(ScriptedClient::new(vec![])),
            settings(true),
        ));
        let mut upstream = UpstreamOutputs::new();
        upstream.insert(
            StageKind::Researcher,
            json!({"insights": {"opportunity_score": 7}}),
        );
        let prompt = stage.build_prompt(&candidate(), &upstream);
        assert!(prompt.contains("**Context from previous analysis:**"));
        assert!(prompt.contains("RESEARCHER OUTPUT"));
        assert!(prompt.contains("\"opportunity_score\": 7"));
    }

    #[test]
    fn schema_lists_every_required_field() {
        for field in REQUIRED_FIELDS {
            assert!(INSTRUCTIONS.contains(field), "{field} missing from template");
        }
    }
}

use serde_json::Value;

use crate::core::stages::prompt::{clip, or_unspecified_field, pretty_json};
use crate::core::stages::{Stage, StageKind, StageRunner, UpstreamOutputs};
use crate::core::store::types::Candidate;

const INSTRUCTIONS: &str = r#"You are a business strategy consultant turning validated ideas into actionable plans.

Your whole reply must be one valid JSON object: no markdown, no code fences, no commentary
before or after it. Start with { and end with }.

Build the plan from the market research and the validation assessment you are given:

1. business_model: value proposition, primary and secondary revenue streams, pricing
   (tiers where relevant), cost structure, partnerships and key activities.
2. gtm_strategy: prioritised segments, acquisition channels, content/paid/organic
   marketing, a sales motion (self-serve, sales-led or hybrid) and launch phases.
3. financial_projections: twelve months of revenue and customers, unit economics
   (CAC, LTV, LTV:CAC, payback), break-even and funding required.
4. competitive_strategy: differentiation, moat, positioning and pricing relative to
   competitors.
5. milestones: goals for months 1-3, 4-6 and 7-12 plus the KPIs to watch.

Required structure:

{
  "business_model": {
    "value_proposition": "string",
    "revenue_streams": ["string"],
    "pricing_strategy": {
      "model": "freemium/subscription/one-time/usage-based",
      "tiers": [{ "name": "string", "price": "string", "features": ["string"] }]
    },
    "cost_structure": { "fixed_costs": ["string"], "variable_costs": ["string"] },
    "key_partnerships": ["string"],
    "key_activities": ["string"]
  },
  "gtm_strategy": {
    "target_segments": [{ "segment": "string", "priority": "primary/secondary", "size": "string" }],
    "acquisition_channels": [{ "channel": "string", "timeline": "string", "expected_cac": "string" }],
    "marketing_strategy": { "content": ["string"], "paid": ["string"], "organic": ["string"] },
    "sales_strategy": "self-serve/sales-led/hybrid",
    "launch_phases": [{ "phase": "string", "duration": "string", "goals": ["string"] }]
  },
  "financial_projections": {
    "monthly_revenue": [{ "month": number, "revenue": number, "customers": number }],
    "unit_economics": {
      "cac": "string",
      "ltv": "string",
      "ltv_cac_ratio": "string",
      "payback_period": "string"
    },
    "break_even": "string",
    "funding_required": "string"
  },
  "competitive_strategy": {
    "differentiation": "string",
    "competitive_moat": ["string"],
    "positioning": "string",
    "pricing_vs_competitors": "premium/competitive/discount"
  },
  "milestones": {
    "month_1_3": ["string"],
    "month_4_6": ["string"],
    "month_7_12": ["string"],
    "key_kpis": ["string"]
  }
}

When the validation recommends a pivot, the plan must describe the pivoted business,
not the original idea."#;

const REQUIRED_FIELDS: &[&str] = &[
    "business_model",
    "gtm_strategy",
    "financial_projections",
    "competitive_strategy",
    "milestones",
];

const MAX_PIVOT_OPTIONS: usize = 3;
const PIVOT_OPTION_CHARS: usize = 200;

/// Final stage. Reads both upstream outputs and reframes around a pivot when told to.
pub struct Strategist {
    runner: StageRunner,
}

impl Strategist {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }
}

/// `Some(alternatives)` when the validator's decision is "pivot" (any case).
pub(crate) fn pivot_alternatives(validation: &Value) -> Option<Vec<String>> {
    let recommendation = validation.get("recommendation")?.as_object()?;
    let decision = recommendation.get("decision")?.as_str()?;
    if !decision.trim().eq_ignore_ascii_case("pivot") {
        return None;
    }
    let alternatives = recommendation
        .get("alternatives")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(MAX_PIVOT_OPTIONS)
                .map(|item| match item {
                    Value::String(s) => clip(s, PIVOT_OPTION_CHARS),
                    other => clip(&other.to_string(), PIVOT_OPTION_CHARS),
                })
                .collect()
        })
        .unwrap_or_default();
    Some(alternatives)
}

impl Stage for Strategist {
    fn kind(&self) -> StageKind {
        StageKind::Strategist
    }

    fn instructions(&self) -> &'static str {
        INSTRUCTIONS
    }

    fn required_fields(&self) -> &'static [&'static str] {
        REQUIRED_FIELDS
    }

    fn build_prompt(&self, candidate: &Candidate, upstream: &UpstreamOutputs) -> String {
        let mut prompt = format!(
            "Analyze this startup idea and create a comprehensive business strategy.\n\n\
             **Idea Details:**\n\
             - **Title**: {}\n\
             - **Description**: {}\n\
             - **Category**: {}\n\
             - **Target Market**: {}\n\
             - **Revenue Model**: {}\n",
            candidate.title,
            candidate.description,
            candidate.category,
            or_unspecified_field(&candidate.target_market),
            or_unspecified_field(&candidate.revenue_model),
        );

        if !upstream.is_empty() {
            prompt.push_str("\n**Previous Analysis Context:**\n");
        }
        if let Some(research) = upstream.get(&StageKind::Researcher) {
            prompt.push_str("\n**MARKET RESEARCH INSIGHTS:**\n");
            prompt.push_str(&pretty_json(research));
            prompt.push('\n');
        }
        if let Some(validation) = upstream.get(&StageKind::Validator) {
            prompt.push_str("\n**VALIDATION ASSESSMENT:**\n");
            prompt.push_str(&pretty_json(validation));
            prompt.push('\n');

            if let Some(alternatives) = pivot_alternatives(validation) {
                prompt.push_str(
                    "\n**IMPORTANT**: Validation recommends PIVOT. Your business strategy \
                     should address the recommended pivot, not the original idea.\n",
                );
                if !alternatives.is_empty() {
                    prompt.push_str("\n**Recommended Pivot Options:**\n");
                    for (i, alt) in alternatives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, alt));
                    }
                }
            }
        }

        let rule = "=".repeat(80);
        prompt.push_str(&format!(
            "\n{rule}\nCRITICAL: Respond with ONLY valid JSON. No markdown, no explanations, just pure JSON.\n\
             Start with {{ and end with }}. Follow the exact schema provided in the system prompt.\n{rule}\n"
        ));
        prompt
    }

    fn runner(&self) -> &StageRunner {
        &self.runner
    }
}

use serde_json::{Value, json};

const NEUTRAL_SCORE: f64 = 5.0;
const NEUTRAL_PERCENT: f64 = 50.0;
pub const FALLBACK_SUMMARY: &str = "Blueprint generated successfully.";

/// Derived fields of a blueprint, computed from the three structured outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub success_probability: f64,
    pub executive_summary: String,
    pub key_insights: Value,
}

pub fn synthesize(research: &Value, validation: &Value, strategy: &Value) -> Synthesis {
    Synthesis {
        success_probability: success_probability(research, validation),
        executive_summary: executive_summary(research, validation),
        key_insights: key_insights(research, validation, strategy),
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

/// Finite numbers and numeric strings count; anything else is treated as absent.
fn number_at(value: &Value, path: &[&str]) -> Option<f64> {
    let number = match lookup(value, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn text_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(value, path)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `0.3*opportunity/10 + 0.3*feasibility/10 + 0.4*success/100`, as 0-100 with two decimals.
/// Absent inputs take the midpoint of their range; present ones are clamped to it.
pub fn success_probability(research: &Value, validation: &Value) -> f64 {
    let opportunity = number_at(research, &["insights", "opportunity_score"])
        .unwrap_or(NEUTRAL_SCORE)
        .clamp(0.0, 10.0);
    let feasibility = number_at(validation, &["validation_metrics", "feasibility_score"])
        .unwrap_or(NEUTRAL_SCORE)
        .clamp(0.0, 10.0);
    let success = number_at(validation, &["validation_metrics", "success_probability"])
        .unwrap_or(NEUTRAL_PERCENT)
        .clamp(0.0, 100.0);

    let blended = (0.3 * (opportunity / 10.0) + 0.3 * (feasibility / 10.0) + 0.4 * (success / 100.0))
        * 100.0;
    (blended * 100.0).round() / 100.0
}

/// Upper-cases the first letter of every run of letters, lower-cases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for ch in s.chars() {
        if in_word {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        in_word = ch.is_alphabetic();
    }
    out
}

/// One templated sentence, or the fallback when readiness or decision is missing.
pub fn executive_summary(research: &Value, validation: &Value) -> String {
    let (Some(readiness), Some(decision)) = (
        text_at(research, &["insights", "market_readiness"]),
        text_at(validation, &["recommendation", "decision"]),
    ) else {
        return FALLBACK_SUMMARY.to_string();
    };

    let mut summary = format!(
        "Market Readiness: {}. Recommendation: {}.",
        title_case(readiness),
        decision.to_uppercase()
    );
    let red_flags: Vec<&str> = lookup(research, &["insights", "red_flags"])
        .and_then(Value::as_array)
        .map(|flags| flags.iter().filter_map(Value::as_str).take(2).collect())
        .unwrap_or_default();
    if !red_flags.is_empty() {
        summary.push_str(&format!(" Key concerns: {}.", red_flags.join(", ")));
    }
    summary
}

fn field(value: &Value, path: &[&str]) -> Value {
    lookup(value, path).cloned().unwrap_or(Value::Null)
}

pub fn key_insights(research: &Value, validation: &Value, strategy: &Value) -> Value {
    json!({
        "market": {
            "opportunity_score": field(research, &["insights", "opportunity_score"]),
            "market_readiness": field(research, &["insights", "market_readiness"]),
        },
        "validation": {
            "feasibility_score": field(validation, &["validation_metrics", "feasibility_score"]),
            "recommendation": field(validation, &["recommendation", "decision"]),
        },
        "strategy": {
            "pricing_model": field(strategy, &["business_model", "pricing_strategy", "model"]),
            "sales_strategy": field(strategy, &["gtm_strategy", "sales_strategy"]),
        },
    })
}

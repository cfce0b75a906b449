use crate::config::DEFAULT_MODEL;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const PRICES: &[(&str, ModelPrice)] = &[
    (
        "claude-sonnet-4-5-20250929",
        ModelPrice {
            input_per_million: 3.00,
            output_per_million: 15.00,
        },
    ),
    (
        "claude-opus-4-6",
        ModelPrice {
            input_per_million: 15.00,
            output_per_million: 75.00,
        },
    ),
    (
        "claude-haiku-4-5-20251001",
        ModelPrice {
            input_per_million: 0.80,
            output_per_million: 4.00,
        },
    ),
];

/// Unknown identifiers are billed at the default model's rate.
pub fn price_for(model: &str) -> ModelPrice {
    let lookup = |id: &str| PRICES.iter().find(|(m, _)| *m == id).map(|(_, p)| *p);
    lookup(model)
        .or_else(|| lookup(DEFAULT_MODEL))
        .unwrap_or(ModelPrice {
            input_per_million: 3.00,
            output_per_million: 15.00,
        })
}

/// USD cost of one call, rounded to six decimals.
pub fn calculate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let price = price_for(model);
    let cost = input_tokens as f64 / 1_000_000.0 * price.input_per_million
        + output_tokens as f64 / 1_000_000.0 * price.output_per_million;
    (cost * 1_000_000.0).round() / 1_000_000.0
}

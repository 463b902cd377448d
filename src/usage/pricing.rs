use super::snapshot::TokenUsage;
use serde::Serialize;
use std::ops::AddAssign;

const TOKENS_PER_MTOK: f64 = 1_000_000.0;

/// Cache reads are billed at this fraction of the input rate.
pub const CACHE_READ_MULTIPLIER: f64 = 0.10;
/// Cache writes are billed at this fraction of the input rate.
pub const CACHE_WRITE_MULTIPLIER: f64 = 1.25;

/// Per-million-token rates for one pricing tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl ModelPricing {
    /// Builds a tier whose cache rates derive from the input rate.
    pub const fn from_base_rates(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            cache_read: input * CACHE_READ_MULTIPLIER,
            cache_write: input * CACHE_WRITE_MULTIPLIER,
        }
    }
}

pub const SONNET_PRICING: ModelPricing = ModelPricing::from_base_rates(3.0, 15.0);
pub const OPUS_PRICING: ModelPricing = ModelPricing::from_base_rates(15.0, 75.0);

struct TierRule {
    matches: fn(&str) -> bool,
    pricing: ModelPricing,
}

fn is_opus(name: &str) -> bool {
    name.contains("opus")
}

fn any_model(_: &str) -> bool {
    true
}

// Evaluated in order against the lowercased model name. The last rule must
// match everything so every model resolves to a tier.
const TIER_RULES: &[TierRule] = &[
    TierRule {
        matches: is_opus,
        pricing: OPUS_PRICING,
    },
    TierRule {
        matches: any_model,
        pricing: SONNET_PRICING,
    },
];

pub fn resolve_tier(model: &str) -> ModelPricing {
    let lower = model.to_lowercase();
    TIER_RULES
        .iter()
        .find(|rule| (rule.matches)(&lower))
        .map(|rule| rule.pricing)
        .unwrap_or(SONNET_PRICING)
}

/// Cost of each token category, in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.input + self.output + self.cache_read + self.cache_write
    }
}

impl AddAssign for CostBreakdown {
    fn add_assign(&mut self, other: Self) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
    }
}

pub fn cost_breakdown(usage: &TokenUsage, model: &str) -> CostBreakdown {
    let pricing = resolve_tier(model);
    let to_mtok = |tokens: u64| tokens as f64 / TOKENS_PER_MTOK;

    CostBreakdown {
        input: to_mtok(usage.input_tokens) * pricing.input,
        output: to_mtok(usage.output_tokens) * pricing.output,
        cache_read: to_mtok(usage.cache_read_input_tokens) * pricing.cache_read,
        cache_write: to_mtok(usage.cache_creation_input_tokens) * pricing.cache_write,
    }
}

/// Locally calculated cost for a model's cumulative usage. Ignores the
/// externally reported `cost_usd`.
pub fn calculate_cost(usage: &TokenUsage, model: &str) -> f64 {
    cost_breakdown(usage, model).total()
}

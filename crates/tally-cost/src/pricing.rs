// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Price table lookup and cost calculation.
//!
//! Prices are configuration: a map from model id to per-token input and
//! output prices, plus a fallback model whose prices apply to anything not
//! in the map. Each cost component is rounded to the monetary scale before
//! the total is summed, so `total == input + output` holds exactly.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tally_config::{ModelPrice, PricingConfig};
use tally_core::money::round_money;
use tally_core::{CostBreakdown, TallyError};

/// Immutable model price table.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: BTreeMap<String, ModelPrice>,
    fallback_model: String,
    fallback: ModelPrice,
}

impl PriceTable {
    /// Build from configuration. The fallback model must have an entry.
    pub fn from_config(config: &PricingConfig) -> Result<Self, TallyError> {
        let fallback = config
            .models
            .get(&config.fallback_model)
            .copied()
            .ok_or_else(|| {
                TallyError::Config(format!(
                    "fallback model `{}` is missing from the price table",
                    config.fallback_model
                ))
            })?;
        Ok(Self {
            prices: config.models.clone(),
            fallback_model: config.fallback_model.clone(),
            fallback,
        })
    }

    /// Unit prices for `model`, falling back for unknown ids.
    pub fn lookup(&self, model: &str) -> ModelPrice {
        self.prices.get(model).copied().unwrap_or(self.fallback)
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.prices.contains_key(model)
    }

    pub fn fallback_model(&self) -> &str {
        &self.fallback_model
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }

    /// Itemized cost of one interaction. Never fails.
    pub fn price(&self, model: &str, input_tokens: u64, output_tokens: u64) -> CostBreakdown {
        let unit = self.lookup(model);
        let input_cost = component_cost(input_tokens, unit.input);
        let output_cost = component_cost(output_tokens, unit.output);
        CostBreakdown {
            input_cost,
            output_cost,
            total_cost: input_cost.checked_add(output_cost).unwrap_or(Decimal::MAX),
        }
    }
}

fn component_cost(tokens: u64, unit_price: Decimal) -> Decimal {
    let raw = Decimal::from(tokens)
        .checked_mul(unit_price)
        .unwrap_or(Decimal::MAX);
    round_money(raw)
}

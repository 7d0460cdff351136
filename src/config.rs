// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Credit Engine Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration.
//!
//! Loaded once at process start; the engine never mutates it at runtime.

use crate::subscription::SubscriptionTier;
use crate::wallet::SpendLimits;
use crate::LedgerError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Signup bonus credited to every lazily created wallet.
    pub initial_bonus_credits: Decimal,

    /// Minimum marketplace sale price, in cents.
    pub min_sale_cents: i64,

    /// Minimum payout request, in cents.
    pub min_payout_cents: i64,

    /// Spend limits applied to newly created wallets.
    pub default_limits: SpendLimits,

    /// Subscription tier table.
    pub tiers: Vec<SubscriptionTier>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_bonus_credits: dec!(1000),
            min_sale_cents: 199,
            min_payout_cents: 1000,
            default_limits: SpendLimits::default(),
            tiers: vec![
                SubscriptionTier {
                    name: "starter".to_string(),
                    monthly_credits: dec!(1000),
                    price_cents: 990,
                },
                SubscriptionTier {
                    name: "pro".to_string(),
                    monthly_credits: dec!(5000),
                    price_cents: 2990,
                },
                SubscriptionTier {
                    name: "enterprise".to_string(),
                    monthly_credits: dec!(20000),
                    price_cents: 9900,
                },
            ],
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, LedgerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse from a TOML string. Absent fields keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, LedgerError> {
        toml::from_str(content).map_err(|e| LedgerError::Config(format!("failed to parse config: {e}")))
    }
}

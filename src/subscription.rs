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

//! Subscription tiers and periodic credit grants.
//!
//! The tier table is loaded once from configuration and never mutated at
//! runtime. The engine holds no timers: an external scheduler calls
//! `CreditEngine::allocate_credits(subscription_id)` once per billing
//! period.

use crate::base::{SubscriptionId, TenantId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One row of the immutable tier table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub name: String,
    /// Credits granted per billing period.
    pub monthly_credits: Decimal,
    pub price_cents: i64,
}

/// A tenant's active subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub tier: String,
    pub started_at: DateTime<Utc>,
}

/// Tier lookup table plus the subscription registry.
pub struct SubscriptionBook {
    tiers: HashMap<String, SubscriptionTier>,
    subscriptions: DashMap<SubscriptionId, Subscription>,
    next_id: AtomicU64,
}

impl SubscriptionBook {
    pub fn new(tiers: Vec<SubscriptionTier>) -> Self {
        Self {
            tiers: tiers
                .into_iter()
                .map(|tier| (tier.name.clone(), tier))
                .collect(),
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn tier(&self, name: &str) -> Result<&SubscriptionTier, LedgerError> {
        self.tiers
            .get(name)
            .ok_or_else(|| LedgerError::UnknownTier(name.to_string()))
    }

    /// Registers a subscription on a configured tier.
    pub fn register(
        &self,
        tenant: TenantId,
        tier_name: &str,
    ) -> Result<SubscriptionId, LedgerError> {
        self.tier(tier_name)?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                tenant_id: tenant,
                tier: tier_name.to_string(),
                started_at: Utc::now(),
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: SubscriptionId) -> Result<Subscription, LedgerError> {
        self.subscriptions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(LedgerError::SubscriptionNotFound(id))
    }

    /// Subscription plus its tier row, for the credit-allocation path.
    pub fn grant_for(
        &self,
        id: SubscriptionId,
    ) -> Result<(Subscription, SubscriptionTier), LedgerError> {
        let subscription = self.get(id)?;
        let tier = self.tier(&subscription.tier)?.clone();
        Ok((subscription, tier))
    }
}

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

//! Spend-rate limiting over fixed hour/day usage buckets.
//!
//! This is a fixed-bucket approximation of a sliding window, good enough
//! for soft spend caps but not a precise real-time limiter. Checks are
//! advisory and lock-free; the authoritative, race-proof gate stays the
//! balance floor inside `WalletStore::apply_delta`.
//!
//! Public entry points use the current time; the `*_at` variants take an
//! explicit `now` so tests can pin bucket boundaries.

use crate::base::TenantId;
use crate::wallet::SpendLimits;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

const SECS_PER_HOUR: i64 = 3_600;
const HOURS_PER_DAY: i64 = 24;

/// Consumption counters for one `(tenant, hour)` bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourlyUsage {
    pub credits_consumed: Decimal,
    pub task_count: u64,
    pub local_model_count: u64,
    pub paid_model_count: u64,
}

/// Outcome of a budget pre-check.
///
/// `allowed = false` only happens when the wallet has `pause_on_limit` set;
/// otherwise an exceeded limit is reported through `reason` and the
/// remaining fields while the task is still allowed to proceed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub hourly_remaining: Option<Decimal>,
    pub daily_remaining: Option<Decimal>,
    /// Projected usage crossed the configured alert threshold.
    pub alert: bool,
}

/// Day-level usage rollup for UI display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub current_hour: HourlyUsage,
    pub day_credits: Decimal,
    pub day_tasks: u64,
    pub day_local_tasks: u64,
    pub day_paid_tasks: u64,
    /// Fraction of the day's tasks served by free local models.
    pub local_model_fraction: f64,
}

fn hour_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(SECS_PER_HOUR)
}

fn day_of(bucket: i64) -> i64 {
    bucket.div_euclid(HOURS_PER_DAY)
}

/// Advisory rate limiter over per-tenant hour buckets.
pub struct BudgetGuard {
    /// Usage counters keyed by `(tenant, hours since the Unix epoch)`.
    usage: DashMap<(TenantId, i64), HourlyUsage>,
}

impl BudgetGuard {
    pub fn new() -> Self {
        Self {
            usage: DashMap::new(),
        }
    }

    /// Records one task's consumption in the current hour bucket.
    pub fn record_usage(&self, tenant: TenantId, credits: Decimal, is_local_model: bool) {
        self.record_usage_at(tenant, credits, is_local_model, Utc::now());
    }

    pub fn record_usage_at(
        &self,
        tenant: TenantId,
        credits: Decimal,
        is_local_model: bool,
        now: DateTime<Utc>,
    ) {
        let bucket = hour_bucket(now);
        let mut entry = self
            .usage
            .entry((tenant, bucket))
            .or_insert_with(HourlyUsage::default);
        entry.credits_consumed += credits;
        entry.task_count += 1;
        if is_local_model {
            entry.local_model_count += 1;
        } else {
            entry.paid_model_count += 1;
        }
        debug!(%tenant, bucket, credits = %credits, is_local_model, "recorded usage");
    }

    /// Checks an estimated spend against the wallet's hour/day limits.
    ///
    /// A limit that is not configured is not checked. An exceeded limit is
    /// a hard rejection only when `limits.pause_on_limit` is set; otherwise
    /// the overage is carried back as advisory information.
    pub fn check_budget(
        &self,
        tenant: TenantId,
        limits: &SpendLimits,
        estimated: Decimal,
    ) -> BudgetDecision {
        self.check_budget_at(tenant, limits, estimated, Utc::now())
    }

    pub fn check_budget_at(
        &self,
        tenant: TenantId,
        limits: &SpendLimits,
        estimated: Decimal,
        now: DateTime<Utc>,
    ) -> BudgetDecision {
        let hourly_used = self.hour_credits(tenant, now);
        let daily_used = self.day_credits(tenant, now);

        let hourly_remaining = limits
            .hourly_limit
            .map(|limit| (limit - hourly_used).max(Decimal::ZERO));
        let daily_remaining = limits
            .daily_limit
            .map(|limit| (limit - daily_used).max(Decimal::ZERO));

        let mut reason = None;
        if let Some(limit) = limits.hourly_limit {
            if hourly_used + estimated > limit {
                reason = Some(format!(
                    "hourly budget exceeded: {hourly_used} of {limit} credits used this hour, \
                     estimated {estimated} more"
                ));
            }
        }
        if reason.is_none() {
            if let Some(limit) = limits.daily_limit {
                if daily_used + estimated > limit {
                    reason = Some(format!(
                        "daily budget exceeded: {daily_used} of {limit} credits used today, \
                         estimated {estimated} more"
                    ));
                }
            }
        }

        let alert = limits.alert_threshold.is_some_and(|threshold| {
            let hour_alert = limits
                .hourly_limit
                .is_some_and(|limit| hourly_used + estimated >= limit * threshold);
            let day_alert = limits
                .daily_limit
                .is_some_and(|limit| daily_used + estimated >= limit * threshold);
            hour_alert || day_alert
        });
        if alert {
            warn!(%tenant, hourly = %hourly_used, daily = %daily_used, "budget alert threshold crossed");
        }

        match reason {
            Some(reason) if limits.pause_on_limit => {
                warn!(%tenant, %reason, "budget check rejected");
                BudgetDecision {
                    allowed: false,
                    reason: Some(reason),
                    hourly_remaining,
                    daily_remaining,
                    alert,
                }
            }
            reason => BudgetDecision {
                allowed: true,
                reason,
                hourly_remaining,
                daily_remaining,
                alert,
            },
        }
    }

    /// Day rollup plus the local-model task fraction.
    pub fn usage_summary(&self, tenant: TenantId) -> UsageSummary {
        self.usage_summary_at(tenant, Utc::now())
    }

    pub fn usage_summary_at(&self, tenant: TenantId, now: DateTime<Utc>) -> UsageSummary {
        let current_hour = self
            .usage
            .get(&(tenant, hour_bucket(now)))
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut day_credits = Decimal::ZERO;
        let mut day_tasks = 0;
        let mut day_local_tasks = 0;
        let mut day_paid_tasks = 0;
        for usage in self.day_buckets(tenant, now) {
            day_credits += usage.credits_consumed;
            day_tasks += usage.task_count;
            day_local_tasks += usage.local_model_count;
            day_paid_tasks += usage.paid_model_count;
        }

        let local_model_fraction = if day_tasks == 0 {
            0.0
        } else {
            day_local_tasks as f64 / day_tasks as f64
        };

        UsageSummary {
            current_hour,
            day_credits,
            day_tasks,
            day_local_tasks,
            day_paid_tasks,
            local_model_fraction,
        }
    }

    fn hour_credits(&self, tenant: TenantId, now: DateTime<Utc>) -> Decimal {
        self.usage
            .get(&(tenant, hour_bucket(now)))
            .map(|entry| entry.credits_consumed)
            .unwrap_or(Decimal::ZERO)
    }

    fn day_credits(&self, tenant: TenantId, now: DateTime<Utc>) -> Decimal {
        self.day_buckets(tenant, now)
            .map(|usage| usage.credits_consumed)
            .sum()
    }

    /// All populated hour buckets of the UTC day containing `now`.
    fn day_buckets(
        &self,
        tenant: TenantId,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = HourlyUsage> + '_ {
        let day = day_of(hour_bucket(now));
        (0..HOURS_PER_DAY).filter_map(move |hour| {
            self.usage
                .get(&(tenant, day * HOURS_PER_DAY + hour))
                .map(|entry| entry.value().clone())
        })
    }
}

impl Default for BudgetGuard {
    fn default() -> Self {
        Self::new()
    }
}

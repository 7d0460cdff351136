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

//! Tenant wallets and the atomic delta operation.
//!
//! [`WalletStore::apply_delta`] is the sole mutation path for wallet
//! balances. It holds the wallet's mutex while it checks the balance floor,
//! writes the new balance, and appends the ledger row, so the balance and
//! the `balance_after` snapshot can never disagree.
//!
//! # Thread Safety
//!
//! One mutex per wallet serializes all mutations to that wallet; mutations
//! to distinct wallets proceed independently with no shared lock.

use crate::base::{TaskId, TenantId};
use crate::error::LedgerError;
use crate::journal::TransactionJournal;
use crate::transaction::{Delta, Transaction, TransactionKind, TransactionRef};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-wallet spend-rate limits, enforced by the budget guard.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, Deserialize)]
#[serde(default)]
pub struct SpendLimits {
    /// Max credits consumable in one hour bucket.
    pub hourly_limit: Option<Decimal>,
    /// Max credits consumable in one UTC day.
    pub daily_limit: Option<Decimal>,
    /// Fraction of a limit (e.g. 0.8) at which budget decisions raise an
    /// advisory alert.
    pub alert_threshold: Option<Decimal>,
    /// When set, an exceeded limit becomes a hard rejection instead of an
    /// advisory warning.
    pub pause_on_limit: bool,
}

#[derive(Debug)]
struct WalletData {
    tenant_id: TenantId,
    balance: Decimal,
    total_purchased: Decimal,
    total_bonus: Decimal,
    total_consumed: Decimal,
    limits: SpendLimits,
    /// This wallet's ledger rows, oldest first.
    ledger: Vec<Arc<Transaction>>,
}

impl WalletData {
    fn new(tenant_id: TenantId, initial_bonus: Decimal, limits: SpendLimits) -> Self {
        Self {
            tenant_id,
            balance: initial_bonus,
            total_purchased: Decimal::ZERO,
            total_bonus: initial_bonus,
            total_consumed: Decimal::ZERO,
            limits,
            ledger: Vec::new(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            self.total_consumed >= Decimal::ZERO,
            "Invariant violated: total_consumed went negative: {}",
            self.total_consumed
        );
    }
}

/// Tenant wallet.
#[derive(Debug)]
pub struct Wallet {
    inner: Mutex<WalletData>,
}

impl Wallet {
    fn new(tenant_id: TenantId, initial_bonus: Decimal, limits: SpendLimits) -> Self {
        Self {
            inner: Mutex::new(WalletData::new(tenant_id, initial_bonus, limits)),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn limits(&self) -> SpendLimits {
        self.inner.lock().limits.clone()
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        let data = self.inner.lock();
        WalletSnapshot {
            tenant_id: data.tenant_id,
            balance: data.balance,
            total_purchased: data.total_purchased,
            total_bonus: data.total_bonus,
            total_consumed: data.total_consumed,
            limits: data.limits.clone(),
        }
    }
}

/// Point-in-time copy of a wallet's state.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletSnapshot {
    pub tenant_id: TenantId,
    pub balance: Decimal,
    pub total_purchased: Decimal,
    pub total_bonus: Decimal,
    pub total_consumed: Decimal,
    pub limits: SpendLimits,
}

impl WalletSnapshot {
    const DECIMAL_PRECISION: u32 = 4;
}

impl Serialize for WalletSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let dp = WalletSnapshot::DECIMAL_PRECISION;
        let mut state = serializer.serialize_struct("WalletSnapshot", 5)?;
        state.serialize_field("tenant", &self.tenant_id)?;
        state.serialize_field("balance", &self.balance.round_dp(dp))?;
        state.serialize_field("total_purchased", &self.total_purchased.round_dp(dp))?;
        state.serialize_field("total_bonus", &self.total_bonus.round_dp(dp))?;
        state.serialize_field("total_consumed", &self.total_consumed.round_dp(dp))?;
        state.end()
    }
}

/// Wallet registry and mutation engine.
///
/// Wallets are created lazily with a configured signup bonus; creation is
/// idempotent under race via the map's entry API.
pub struct WalletStore {
    /// Wallets indexed by tenant id.
    wallets: DashMap<TenantId, Arc<Wallet>>,
    /// Global append-only audit journal shared with the rest of the engine.
    journal: Arc<TransactionJournal>,
    initial_bonus: Decimal,
    default_limits: SpendLimits,
}

impl WalletStore {
    pub fn new(
        initial_bonus: Decimal,
        default_limits: SpendLimits,
        journal: Arc<TransactionJournal>,
    ) -> Self {
        Self {
            wallets: DashMap::new(),
            journal,
            initial_bonus,
            default_limits,
        }
    }

    /// Returns the tenant's wallet, creating it with the signup bonus if
    /// absent.
    ///
    /// The bonus seeds `balance` and `total_bonus` directly; it is not a
    /// ledger row, so `balance == initial_bonus + Σ(amounts)` holds for the
    /// wallet's whole lifetime.
    pub fn get_or_create_wallet(&self, tenant: TenantId) -> WalletSnapshot {
        self.get_or_create(tenant).snapshot()
    }

    fn get_or_create(&self, tenant: TenantId) -> Arc<Wallet> {
        self.wallets
            .entry(tenant)
            .or_insert_with(|| {
                info!(%tenant, bonus = %self.initial_bonus, "creating wallet with signup bonus");
                Arc::new(Wallet::new(
                    tenant,
                    self.initial_bonus,
                    self.default_limits.clone(),
                ))
            })
            .clone()
    }

    fn get(&self, tenant: TenantId) -> Result<Arc<Wallet>, LedgerError> {
        self.wallets
            .get(&tenant)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::WalletNotFound(tenant))
    }

    /// Applies a signed balance delta to an existing wallet.
    ///
    /// The wallet mutex is held across the floor check, the balance write,
    /// the lifetime-counter update, and both ledger appends, making the
    /// mutation all-or-nothing with respect to concurrent callers.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WalletNotFound`] - No wallet exists for the tenant.
    /// - [`LedgerError::InvalidAmount`] - The delta amount is zero.
    /// - [`LedgerError::InsufficientCredits`] - A debit exceeds the balance;
    ///   nothing is mutated.
    pub fn apply_delta(
        &self,
        tenant: TenantId,
        delta: Delta,
    ) -> Result<Arc<Transaction>, LedgerError> {
        if delta.amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let wallet = self.get(tenant)?;
        let mut data = wallet.inner.lock();

        if delta.amount < Decimal::ZERO && data.balance + delta.amount < Decimal::ZERO {
            let requested = -delta.amount;
            warn!(
                %tenant,
                %requested,
                available = %data.balance,
                "debit rejected, insufficient credits"
            );
            return Err(LedgerError::InsufficientCredits {
                requested,
                available: data.balance,
            });
        }

        data.balance += delta.amount;
        match delta.kind {
            TransactionKind::Purchase | TransactionKind::Subscription => {
                data.total_purchased += delta.amount;
            }
            TransactionKind::Bonus => data.total_bonus += delta.amount,
            TransactionKind::Consumption => data.total_consumed += delta.amount.abs(),
            // Refunds and adjustments track no lifetime counter.
            TransactionKind::Refund | TransactionKind::Adjustment => {}
        }

        let transaction = Arc::new(Transaction {
            id: self.journal.next_id(),
            tenant_id: tenant,
            kind: delta.kind,
            amount: delta.amount,
            balance_after: data.balance,
            reference: delta.reference,
            description: delta.description,
            metadata: delta.metadata,
            created_at: Utc::now(),
        });
        data.ledger.push(Arc::clone(&transaction));
        self.journal.append(Arc::clone(&transaction));
        data.assert_invariants();

        debug!(
            %tenant,
            id = %transaction.id,
            kind = %transaction.kind,
            amount = %transaction.amount,
            balance_after = %transaction.balance_after,
            "applied delta"
        );
        Ok(transaction)
    }

    /// Debits `credits` for an AI task execution.
    pub fn consume(
        &self,
        tenant: TenantId,
        credits: Decimal,
        task_id: TaskId,
        description: &str,
    ) -> Result<Arc<Transaction>, LedgerError> {
        if credits <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.apply_delta(
            tenant,
            Delta::new(-credits, TransactionKind::Consumption, description)
                .with_reference(TransactionRef::Task(task_id)),
        )
    }

    /// Returns `credits` to the wallet after a failed or cancelled task.
    ///
    /// No balance floor applies; a refund always succeeds on an existing
    /// wallet.
    pub fn refund(
        &self,
        tenant: TenantId,
        credits: Decimal,
        task_id: TaskId,
        reason: &str,
    ) -> Result<Arc<Transaction>, LedgerError> {
        if credits <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.apply_delta(
            tenant,
            Delta::new(credits, TransactionKind::Refund, reason)
                .with_reference(TransactionRef::Task(task_id)),
        )
    }

    /// Credits a wallet, creating it first if needed.
    ///
    /// Negative amounts are only accepted for `Adjustment` deltas (manual
    /// corrections); every other kind is a pure credit here.
    pub fn add_credits(
        &self,
        tenant: TenantId,
        amount: Decimal,
        kind: TransactionKind,
        description: &str,
        reference: Option<TransactionRef>,
    ) -> Result<Arc<Transaction>, LedgerError> {
        if amount < Decimal::ZERO && kind != TransactionKind::Adjustment {
            return Err(LedgerError::InvalidAmount);
        }
        self.get_or_create(tenant);
        let mut delta = Delta::new(amount, kind, description);
        if let Some(reference) = reference {
            delta = delta.with_reference(reference);
        }
        self.apply_delta(tenant, delta)
    }

    /// Newest-first page of the wallet's ledger.
    pub fn transaction_history(
        &self,
        tenant: TenantId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Arc<Transaction>>, LedgerError> {
        let wallet = self.get(tenant)?;
        let data = wallet.inner.lock();
        Ok(data
            .ledger
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn balance(&self, tenant: TenantId) -> Result<Decimal, LedgerError> {
        Ok(self.get(tenant)?.balance())
    }

    pub fn limits(&self, tenant: TenantId) -> Result<SpendLimits, LedgerError> {
        Ok(self.get(tenant)?.limits())
    }

    pub fn set_limits(&self, tenant: TenantId, limits: SpendLimits) -> Result<(), LedgerError> {
        let wallet = self.get(tenant)?;
        wallet.inner.lock().limits = limits;
        Ok(())
    }

    pub fn snapshot(&self, tenant: TenantId) -> Result<WalletSnapshot, LedgerError> {
        Ok(self.get(tenant)?.snapshot())
    }

    /// Snapshots of every wallet, for reports and the replay CLI.
    pub fn snapshots(&self) -> Vec<WalletSnapshot> {
        let mut all: Vec<WalletSnapshot> = self
            .wallets
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        all.sort_by_key(|snapshot| snapshot.tenant_id.0);
        all
    }

    pub fn journal(&self) -> &TransactionJournal {
        &self.journal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store(initial_bonus: Decimal) -> WalletStore {
        WalletStore::new(
            initial_bonus,
            SpendLimits::default(),
            Arc::new(TransactionJournal::new()),
        )
    }

    #[test]
    fn creation_is_idempotent() {
        let store = store(dec!(1000));
        let first = store.get_or_create_wallet(TenantId(1));
        store.consume(TenantId(1), dec!(100), TaskId(1), "t").unwrap();
        let second = store.get_or_create_wallet(TenantId(1));

        assert_eq!(first.balance, dec!(1000));
        assert_eq!(second.balance, dec!(900));
        assert_eq!(second.total_bonus, dec!(1000));
    }

    #[test]
    fn zero_delta_is_rejected() {
        let store = store(dec!(1000));
        store.get_or_create_wallet(TenantId(1));
        let result = store.apply_delta(
            TenantId(1),
            Delta::new(Decimal::ZERO, TransactionKind::Adjustment, "noop"),
        );
        assert_eq!(result, Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn rejected_debit_mutates_nothing() {
        let store = store(dec!(700));
        store.get_or_create_wallet(TenantId(1));

        let result = store.consume(TenantId(1), dec!(5000), TaskId(1), "big task");
        assert_eq!(
            result,
            Err(LedgerError::InsufficientCredits {
                requested: dec!(5000),
                available: dec!(700),
            })
        );

        let snapshot = store.snapshot(TenantId(1)).unwrap();
        assert_eq!(snapshot.balance, dec!(700));
        assert_eq!(snapshot.total_consumed, Decimal::ZERO);
        assert!(store.transaction_history(TenantId(1), 10, 0).unwrap().is_empty());
        assert!(store.journal().is_empty());
    }

    #[test]
    fn counters_follow_transaction_kind() {
        let store = store(dec!(1000));
        store.get_or_create_wallet(TenantId(1));

        store
            .add_credits(TenantId(1), dec!(500), TransactionKind::Purchase, "pack", None)
            .unwrap();
        store
            .add_credits(TenantId(1), dec!(50), TransactionKind::Bonus, "promo", None)
            .unwrap();
        store.consume(TenantId(1), dec!(200), TaskId(1), "task").unwrap();
        store.refund(TenantId(1), dec!(80), TaskId(1), "task failed").unwrap();

        let snapshot = store.snapshot(TenantId(1)).unwrap();
        assert_eq!(snapshot.balance, dec!(1430));
        assert_eq!(snapshot.total_purchased, dec!(500));
        assert_eq!(snapshot.total_bonus, dec!(1050));
        // Refunds do not unwind the gross consumption counter.
        assert_eq!(snapshot.total_consumed, dec!(200));
    }

    #[test]
    fn balance_after_snapshots_every_step() {
        let store = store(dec!(1000));
        store.get_or_create_wallet(TenantId(1));

        let first = store.consume(TenantId(1), dec!(300), TaskId(1), "a").unwrap();
        let second = store.consume(TenantId(1), dec!(100), TaskId(2), "b").unwrap();

        assert_eq!(first.balance_after, dec!(700));
        assert_eq!(second.balance_after, dec!(600));
    }

    #[test]
    fn history_is_newest_first_and_paginated() {
        let store = store(dec!(1000));
        store.get_or_create_wallet(TenantId(1));
        for i in 1..=5u64 {
            store
                .consume(TenantId(1), Decimal::from(i), TaskId(i), "task")
                .unwrap();
        }

        let page = store.transaction_history(TenantId(1), 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].amount, dec!(-5));
        assert_eq!(page[1].amount, dec!(-4));

        let next = store.transaction_history(TenantId(1), 2, 2).unwrap();
        assert_eq!(next[0].amount, dec!(-3));
        assert_eq!(next[1].amount, dec!(-2));

        let tail = store.transaction_history(TenantId(1), 10, 4).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].amount, dec!(-1));
    }

    #[test]
    fn consume_on_missing_wallet_fails() {
        let store = store(dec!(1000));
        let result = store.consume(TenantId(99), dec!(10), TaskId(1), "t");
        assert_eq!(result, Err(LedgerError::WalletNotFound(TenantId(99))));
    }

    #[test]
    fn add_credits_creates_the_wallet() {
        let store = store(dec!(1000));
        store
            .add_credits(TenantId(2), dec!(250), TransactionKind::Purchase, "pack", None)
            .unwrap();

        let snapshot = store.snapshot(TenantId(2)).unwrap();
        // Signup bonus plus the purchased pack.
        assert_eq!(snapshot.balance, dec!(1250));
        assert_eq!(snapshot.total_purchased, dec!(250));
    }

    #[test]
    fn negative_add_credits_requires_adjustment() {
        let store = store(dec!(1000));
        store.get_or_create_wallet(TenantId(1));

        let rejected =
            store.add_credits(TenantId(1), dec!(-10), TransactionKind::Bonus, "oops", None);
        assert_eq!(rejected, Err(LedgerError::InvalidAmount));

        let adjusted = store
            .add_credits(
                TenantId(1),
                dec!(-10),
                TransactionKind::Adjustment,
                "ops correction",
                None,
            )
            .unwrap();
        assert_eq!(adjusted.balance_after, dec!(990));
    }

    // === Serialization Tests ===

    #[test]
    fn serializer_rounds_to_four_decimal_places() {
        let snapshot = WalletSnapshot {
            tenant_id: TenantId(1),
            balance: dec!(123.456789),
            total_purchased: dec!(0.000001),
            total_bonus: Decimal::ZERO,
            total_consumed: Decimal::ZERO,
            limits: SpendLimits::default(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["tenant"], 1);
        assert_eq!(parsed["balance"].as_str().unwrap(), "123.4568");
        assert_eq!(parsed["total_purchased"].as_str().unwrap(), "0.0000");
    }
}

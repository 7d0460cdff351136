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

//! The credit engine facade.
//!
//! [`CreditEngine`] wires the wallet store, budget guard, commission
//! engine, payout workflow, and subscription book behind one in-process
//! API. It exposes no wire protocol: the surrounding service layer (task
//! dispatch, marketplace purchase flow, billing UI) marshals these calls
//! onto whatever transport the deployment uses.
//!
//! # Concurrency
//!
//! Every call runs synchronously in the caller's context. Mutations to one
//! wallet or one author balance serialize through that key's mutex;
//! distinct keys never contend. Reads (`check_budget`, `wallet`,
//! `author_balance`) are advisory and may observe slightly stale state —
//! the authoritative gates are the balance floor inside `apply_delta` and
//! the check-then-reserve inside `request_payout`.

use crate::base::{
    AuthorId, EarningId, PayoutId, SubscriptionId, TaskId, TemplateId, TenantId, UserId,
};
use crate::budget::{BudgetDecision, BudgetGuard, UsageSummary};
use crate::commission::{AuthorAccounts, AuthorBalance, AuthorEarning, CommissionEngine};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::journal::TransactionJournal;
use crate::payout::{PayoutRecord, PayoutWorkflow};
use crate::subscription::SubscriptionBook;
use crate::transaction::{Delta, Transaction, TransactionKind, TransactionRef};
use crate::wallet::{SpendLimits, WalletSnapshot, WalletStore};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Central credit ledger and budget-enforcement engine.
pub struct CreditEngine {
    config: EngineConfig,
    wallets: WalletStore,
    budget: BudgetGuard,
    commission: CommissionEngine,
    payouts: PayoutWorkflow,
    subscriptions: SubscriptionBook,
}

impl CreditEngine {
    pub fn new(config: EngineConfig) -> Self {
        let journal = Arc::new(TransactionJournal::new());
        let wallets = WalletStore::new(
            config.initial_bonus_credits,
            config.default_limits.clone(),
            journal,
        );
        let accounts = Arc::new(AuthorAccounts::new());
        let commission = CommissionEngine::new(Arc::clone(&accounts), config.min_sale_cents);
        let payouts = PayoutWorkflow::new(accounts, config.min_payout_cents);
        let subscriptions = SubscriptionBook::new(config.tiers.clone());
        Self {
            config,
            wallets,
            budget: BudgetGuard::new(),
            commission,
            payouts,
            subscriptions,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // === Wallets ===

    /// Returns the tenant's wallet, creating it with the signup bonus if
    /// absent. Idempotent under race.
    pub fn get_or_create_wallet(&self, tenant: TenantId) -> WalletSnapshot {
        self.wallets.get_or_create_wallet(tenant)
    }

    pub fn wallet(&self, tenant: TenantId) -> Result<WalletSnapshot, LedgerError> {
        self.wallets.snapshot(tenant)
    }

    /// Debits `credits` for an AI task execution.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientCredits`] - The debit exceeds the
    /// balance; nothing is mutated. The engine never retries; reattempting
    /// after a refund is the caller's call.
    pub fn consume(
        &self,
        tenant: TenantId,
        credits: Decimal,
        task_id: TaskId,
        description: &str,
    ) -> Result<Arc<Transaction>, LedgerError> {
        self.wallets.consume(tenant, credits, task_id, description)
    }

    /// Returns credits after a failed or cancelled task. Always succeeds on
    /// an existing wallet.
    pub fn refund(
        &self,
        tenant: TenantId,
        credits: Decimal,
        task_id: TaskId,
        reason: &str,
    ) -> Result<Arc<Transaction>, LedgerError> {
        self.wallets.refund(tenant, credits, task_id, reason)
    }

    /// Credits a wallet (purchases, bonuses, manual adjustments), creating
    /// it first if needed.
    pub fn add_credits(
        &self,
        tenant: TenantId,
        amount: Decimal,
        kind: TransactionKind,
        description: &str,
        reference: Option<TransactionRef>,
    ) -> Result<Arc<Transaction>, LedgerError> {
        self.wallets
            .add_credits(tenant, amount, kind, description, reference)
    }

    /// Newest-first page of the tenant's ledger.
    pub fn transaction_history(
        &self,
        tenant: TenantId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Arc<Transaction>>, LedgerError> {
        self.wallets.transaction_history(tenant, limit, offset)
    }

    pub fn set_limits(&self, tenant: TenantId, limits: SpendLimits) -> Result<(), LedgerError> {
        self.wallets.set_limits(tenant, limits)
    }

    /// Snapshots of every wallet, sorted by tenant id.
    pub fn wallet_snapshots(&self) -> Vec<WalletSnapshot> {
        self.wallets.snapshots()
    }

    /// Drains the global journal in append order for one-shot audit export.
    pub fn drain_audit_log(&self) -> Vec<Arc<Transaction>> {
        self.wallets.journal().drain_in_order()
    }

    // === Budget ===

    /// Advisory pre-check of an estimated spend against the wallet's
    /// hour/day limits.
    pub fn check_budget(
        &self,
        tenant: TenantId,
        estimated_credits: Decimal,
    ) -> Result<BudgetDecision, LedgerError> {
        let limits = self.wallets.limits(tenant)?;
        Ok(self.budget.check_budget(tenant, &limits, estimated_credits))
    }

    /// Like [`check_budget`](Self::check_budget), but a pause-enabled
    /// rejection becomes a hard [`LedgerError::BudgetExceeded`].
    pub fn ensure_within_budget(
        &self,
        tenant: TenantId,
        estimated_credits: Decimal,
    ) -> Result<BudgetDecision, LedgerError> {
        let decision = self.check_budget(tenant, estimated_credits)?;
        if !decision.allowed {
            return Err(LedgerError::BudgetExceeded {
                reason: decision
                    .reason
                    .clone()
                    .unwrap_or_else(|| "spend limit reached".to_string()),
            });
        }
        Ok(decision)
    }

    /// Records one task's consumption in the current hour bucket.
    pub fn record_usage(&self, tenant: TenantId, credits: Decimal, is_local_model: bool) {
        self.budget.record_usage(tenant, credits, is_local_model);
    }

    pub fn usage_summary(&self, tenant: TenantId) -> UsageSummary {
        self.budget.usage_summary(tenant)
    }

    // === Marketplace ===

    /// Records a template sale, splitting revenue between platform and
    /// author.
    #[allow(clippy::too_many_arguments)]
    pub fn record_sale(
        &self,
        author: AuthorId,
        template: TemplateId,
        purchaser: UserId,
        purchaser_tenant: TenantId,
        sale_amount_cents: i64,
        external_ref: &str,
    ) -> Result<EarningId, LedgerError> {
        self.commission.record_sale(
            author,
            template,
            purchaser,
            purchaser_tenant,
            sale_amount_cents,
            external_ref,
        )
    }

    pub fn author_balance(&self, author: AuthorId) -> Result<AuthorBalance, LedgerError> {
        self.commission.author_balance(author)
    }

    pub fn earnings_for_author(
        &self,
        author: AuthorId,
    ) -> Result<Vec<Arc<AuthorEarning>>, LedgerError> {
        self.commission.earnings_for_author(author)
    }

    // === Payouts ===

    pub fn request_payout(
        &self,
        author: AuthorId,
        amount_cents: i64,
    ) -> Result<PayoutId, LedgerError> {
        self.payouts.request_payout(author, amount_cents)
    }

    pub fn begin_processing(&self, payout: PayoutId) -> Result<(), LedgerError> {
        self.payouts.begin_processing(payout)
    }

    pub fn complete_payout(&self, payout: PayoutId, external_ref: &str) -> Result<(), LedgerError> {
        self.payouts.complete_payout(payout, external_ref)
    }

    pub fn fail_payout(&self, payout: PayoutId, reason: &str) -> Result<(), LedgerError> {
        self.payouts.fail_payout(payout, reason)
    }

    pub fn payout(&self, payout: PayoutId) -> Result<PayoutRecord, LedgerError> {
        self.payouts.payout(payout)
    }

    pub fn payouts_for_author(
        &self,
        author: AuthorId,
    ) -> Result<Vec<PayoutRecord>, LedgerError> {
        self.payouts.payouts_for_author(author)
    }

    // === Subscriptions ===

    pub fn register_subscription(
        &self,
        tenant: TenantId,
        tier: &str,
    ) -> Result<SubscriptionId, LedgerError> {
        self.subscriptions.register(tenant, tier)
    }

    /// Applies a subscription's monthly credit grant.
    ///
    /// Called by an external periodic scheduler once per billing period;
    /// the engine holds no internal timers.
    pub fn allocate_credits(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Arc<Transaction>, LedgerError> {
        let (subscription, tier) = self.subscriptions.grant_for(subscription)?;
        self.wallets.get_or_create_wallet(subscription.tenant_id);
        self.wallets.apply_delta(
            subscription.tenant_id,
            Delta::new(
                tier.monthly_credits,
                TransactionKind::Subscription,
                format!("monthly credit grant ({})", tier.name),
            )
            .with_reference(TransactionRef::Subscription(subscription.id)),
        )
    }
}

impl Default for CreditEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

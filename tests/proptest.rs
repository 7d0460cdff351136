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

//! Property-based tests for the credit engine.
//!
//! These verify invariants that must hold for any sequence of valid
//! operations: ledger reconciliation, balance non-negativity, the
//! deterministic commission split, and payout reservation accounting.

use credit_engine_rs::{
    AuthorId, CreditEngine, TaskId, TemplateId, TenantId, TransactionKind, UserId,
    commission_split,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive credit amount (0.01 to 100,000 with 2 decimal places).
fn arb_credits() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Invariant 1: balance == signup bonus + sum of applied amounts, for
    /// any interleaving of credits and (possibly rejected) debits.
    #[test]
    fn balance_reconciles_with_ledger(
        purchases in prop::collection::vec(arb_credits(), 1..5),
        debits in prop::collection::vec(arb_credits(), 0..8),
    ) {
        let engine = CreditEngine::default();
        engine.get_or_create_wallet(TenantId(1));

        for amount in &purchases {
            engine
                .add_credits(TenantId(1), *amount, TransactionKind::Purchase, "pack", None)
                .unwrap();
        }
        // Debits may exceed the balance; rejections must leave no trace.
        for (i, amount) in debits.iter().enumerate() {
            let _ = engine.consume(TenantId(1), *amount, TaskId(i as u64), "task");
        }

        let wallet = engine.wallet(TenantId(1)).unwrap();
        prop_assert!(wallet.balance >= Decimal::ZERO);

        let applied: Decimal = engine
            .transaction_history(TenantId(1), usize::MAX, 0)
            .unwrap()
            .iter()
            .map(|tx| tx.amount)
            .sum();
        prop_assert_eq!(wallet.balance, dec!(1000) + applied);
    }

    /// Invariant 3: every ledger row's balance_after chains exactly to its
    /// neighbors.
    #[test]
    fn balance_after_forms_a_chain(
        amounts in prop::collection::vec(arb_credits(), 1..12),
    ) {
        let engine = CreditEngine::default();
        engine.get_or_create_wallet(TenantId(1));

        for (i, amount) in amounts.iter().enumerate() {
            if i % 2 == 0 {
                engine
                    .add_credits(TenantId(1), *amount, TransactionKind::Purchase, "pack", None)
                    .unwrap();
            } else {
                let _ = engine.consume(TenantId(1), *amount, TaskId(i as u64), "task");
            }
        }

        // Newest first; walk back in time.
        let history = engine
            .transaction_history(TenantId(1), usize::MAX, 0)
            .unwrap();
        for pair in history.windows(2) {
            let (newer, older) = (&pair[0], &pair[1]);
            prop_assert_eq!(older.balance_after, newer.balance_after - newer.amount);
        }
        if let Some(oldest) = history.last() {
            prop_assert_eq!(oldest.balance_after, dec!(1000) + oldest.amount);
        }

        prop_assert_eq!(
            engine.wallet(TenantId(1)).unwrap().balance,
            history.first().map(|tx| tx.balance_after).unwrap_or(dec!(1000))
        );
    }

    /// A debit larger than the balance is rejected and leaves the wallet
    /// untouched.
    #[test]
    fn cannot_overdraw(
        purchase in arb_credits(),
        extra in arb_credits(),
    ) {
        let engine = CreditEngine::default();
        engine.get_or_create_wallet(TenantId(1));
        engine
            .add_credits(TenantId(1), purchase, TransactionKind::Purchase, "pack", None)
            .unwrap();

        let balance_before = engine.wallet(TenantId(1)).unwrap().balance;
        let result = engine.consume(TenantId(1), balance_before + extra, TaskId(1), "task");

        prop_assert!(result.is_err());
        prop_assert_eq!(engine.wallet(TenantId(1)).unwrap().balance, balance_before);
    }

    /// Consume then refund is balance-neutral, while the gross consumption
    /// counter only grows.
    #[test]
    fn refund_restores_balance_not_counters(
        credits in arb_credits(),
    ) {
        let engine = CreditEngine::default();
        engine.get_or_create_wallet(TenantId(1));
        engine
            .add_credits(TenantId(1), credits, TransactionKind::Purchase, "pack", None)
            .unwrap();

        engine.consume(TenantId(1), credits, TaskId(1), "task").unwrap();
        engine.refund(TenantId(1), credits, TaskId(1), "task failed").unwrap();

        let wallet = engine.wallet(TenantId(1)).unwrap();
        prop_assert_eq!(wallet.balance, dec!(1000) + credits);
        prop_assert_eq!(wallet.total_consumed, credits);
    }
}

// =============================================================================
// Commission Split Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Invariant 4: the split always sums back to the sale and the
    /// commission is exactly the floor of 20%.
    #[test]
    fn split_sums_and_floors(sale in 199i64..=100_000_000) {
        let (commission, earning) = commission_split(sale);
        prop_assert_eq!(commission + earning, sale);
        prop_assert_eq!(commission, sale / 5);
        prop_assert!(commission * 5 <= sale);
        prop_assert!((commission + 1) * 5 > sale);
    }

    /// Recorded sales accumulate exactly into the author's earned total.
    #[test]
    fn sales_accumulate_exactly(
        sales in prop::collection::vec(199i64..=1_000_000, 1..10),
    ) {
        let engine = CreditEngine::default();
        let expected: i64 = sales.iter().map(|sale| commission_split(*sale).1).sum();

        for (i, sale) in sales.iter().enumerate() {
            engine
                .record_sale(
                    AuthorId(1),
                    TemplateId(i as u64),
                    UserId(i as u64),
                    TenantId(i as u64),
                    *sale,
                    "pay_ref",
                )
                .unwrap();
        }

        let balance = engine.author_balance(AuthorId(1)).unwrap();
        prop_assert_eq!(balance.total_earned_cents, expected);
        prop_assert_eq!(balance.available_balance_cents, expected);
    }
}

// =============================================================================
// Payout Reservation Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Invariant 5: whatever sequence of payout requests arrives, the
    /// derived available balance never goes negative and reservations
    /// never exceed earnings.
    #[test]
    fn reservations_never_exceed_earnings(
        requests in prop::collection::vec(1000i64..=5000, 1..10),
    ) {
        let engine = CreditEngine::default();
        // 12500 sale -> 10000 cents earned.
        engine
            .record_sale(AuthorId(1), TemplateId(1), UserId(1), TenantId(1), 12_500, "pay")
            .unwrap();

        let mut reserved = 0i64;
        for amount in &requests {
            if engine.request_payout(AuthorId(1), *amount).is_ok() {
                reserved += amount;
            }
        }

        prop_assert!(reserved <= 10_000);
        let balance = engine.author_balance(AuthorId(1)).unwrap();
        prop_assert_eq!(balance.pending_payout_cents, reserved);
        prop_assert_eq!(balance.available_balance_cents, 10_000 - reserved);
        prop_assert!(balance.available_balance_cents >= 0);
    }

    /// Failing every open payout returns the account to its pre-request
    /// state; completing moves funds exactly once.
    #[test]
    fn fail_or_complete_settles_reservations(
        requests in prop::collection::vec(1000i64..=4000, 1..8),
        complete_mask in prop::collection::vec(any::<bool>(), 8),
    ) {
        let engine = CreditEngine::default();
        engine
            .record_sale(AuthorId(1), TemplateId(1), UserId(1), TenantId(1), 12_500, "pay")
            .unwrap();

        let mut ids = Vec::new();
        for amount in &requests {
            if let Ok(id) = engine.request_payout(AuthorId(1), *amount) {
                ids.push((id, *amount));
            }
        }

        let mut paid_out = 0i64;
        for (i, (id, amount)) in ids.iter().enumerate() {
            if complete_mask[i % complete_mask.len()] {
                engine.complete_payout(*id, "tr").unwrap();
                paid_out += amount;
            } else {
                engine.fail_payout(*id, "declined").unwrap();
            }
        }

        let balance = engine.author_balance(AuthorId(1)).unwrap();
        prop_assert_eq!(balance.pending_payout_cents, 0);
        prop_assert_eq!(balance.total_paid_out_cents, paid_out);
        prop_assert_eq!(balance.available_balance_cents, 10_000 - paid_out);
    }
}

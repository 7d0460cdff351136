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

//! Global append-only transaction journal.
//!
//! Combines a [`DashMap`] for O(1) lookup by id with a [`SegQueue`] that
//! preserves global append order across all wallets. All operations are
//! lock-free and safe for concurrent access.

use crate::base::TransactionId;
use crate::transaction::Transaction;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only audit log of every balance-affecting transaction.
///
/// The journal also allocates [`TransactionId`]s; ids are monotonically
/// increasing, starting at 1.
#[derive(Debug)]
pub struct TransactionJournal {
    /// Transactions indexed by id.
    by_id: DashMap<TransactionId, Arc<Transaction>>,

    /// Transaction ids in global append order.
    order: SegQueue<TransactionId>,

    /// Next id to hand out.
    next_id: AtomicU64,
}

impl TransactionJournal {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            order: SegQueue::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates the next transaction id.
    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends a transaction to the journal.
    ///
    /// Ids come from [`next_id`](Self::next_id), so every append carries a
    /// fresh id; the map insert never displaces an existing row.
    pub fn append(&self, transaction: Arc<Transaction>) {
        let id = transaction.id;
        let previous = self.by_id.insert(id, transaction);
        debug_assert!(previous.is_none(), "journal id {id} reused");
        self.order.push(id);
    }

    /// Looks up a transaction by id.
    pub fn get(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.by_id.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Drains the append-order queue into a `Vec` for one-shot audit export.
    ///
    /// Consumes the ordering (the lookup map is left intact), so this is
    /// meant for end-of-run export, not repeated reads.
    pub fn drain_in_order(&self) -> Vec<Arc<Transaction>> {
        let mut out = Vec::with_capacity(self.by_id.len());
        while let Some(id) = self.order.pop() {
            if let Some(tx) = self.get(id) {
                out.push(tx);
            }
        }
        out
    }
}

impl Default for TransactionJournal {
    fn default() -> Self {
        Self::new()
    }
}

use crate::domain::money::{Amount, Balance};
use crate::domain::order::VendorId;
use crate::domain::transaction::{BalanceSnapshot, TransactionKind, TransactionStatus, WalletTransaction};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Balance record of a single vendor.
///
/// `pending` holds revenue from orders that have not been delivered yet,
/// `available` can be withdrawn. Both are kept non-negative by the operations
/// below; the ledger service is the only caller.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct VendorWallet {
    pub vendor: VendorId,
    pub available: Balance,
    pub pending: Balance,
    pub lifetime_earned: Balance,
    pub lifetime_withdrawn: Balance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VendorWallet {
    pub fn new(vendor: VendorId, now: DateTime<Utc>) -> Self {
        Self {
            vendor,
            available: Balance::ZERO,
            pending: Balance::ZERO,
            lifetime_earned: Balance::ZERO,
            lifetime_withdrawn: Balance::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            available: self.available,
            pending: self.pending,
        }
    }

    pub fn total(&self) -> Balance {
        self.available + self.pending
    }

    /// Adds revenue that is not yet withdrawable.
    pub fn credit(&mut self, amount: Amount) {
        self.pending += amount.into();
    }

    /// Moves up to `amount` from pending to available. Returns what moved.
    pub fn release(&mut self, amount: Balance) -> Balance {
        let moved = self.pending.take_up_to(amount);
        self.available += moved;
        self.lifetime_earned += moved;
        moved
    }

    /// Removes `amount`, pending first and then available, never below zero.
    /// Returns the amount actually removed.
    pub fn debit(&mut self, amount: Amount) -> Balance {
        let wanted = Balance::from(amount);
        let from_pending = self.pending.take_up_to(wanted);
        let from_available = self.available.take_up_to(wanted - from_pending);
        from_pending + from_available
    }

    pub fn withdraw(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let amount = Balance::from(amount);
        if self.available >= amount {
            self.available -= amount;
            self.lifetime_withdrawn += amount;
            Ok(())
        } else {
            Err(LedgerError::InsufficientBalance {
                requested: amount.value(),
                available: self.available.value(),
            })
        }
    }
}

/// Result of replaying a vendor's transaction log against its wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// `available + pending` derived from the log.
    pub expected: Balance,
    /// `available + pending` as stored.
    pub actual: Balance,
    /// Sum of released credits in the log. Can exceed `lifetime_earned` when a
    /// release was clamped by an earlier debit.
    pub released_credits: Balance,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.expected == self.actual
    }
}

/// Replays `log` and compares it with the stored wallet.
///
/// Credits count whether pending or completed, refund debits count by the
/// amount actually applied, withdrawals count unless they failed.
pub fn reconcile(wallet: &VendorWallet, log: &[WalletTransaction]) -> Reconciliation {
    let mut expected = Balance::ZERO;
    let mut released_credits = Balance::ZERO;
    for tx in log.iter().filter(|tx| tx.status != TransactionStatus::Failed) {
        match tx.kind {
            TransactionKind::Credit => {
                expected += Balance::new(tx.applied);
                if tx.status == TransactionStatus::Completed {
                    released_credits += Balance::new(tx.applied);
                }
            }
            TransactionKind::Debit | TransactionKind::RefundDebit | TransactionKind::Withdrawal => {
                expected -= Balance::new(tx.applied);
            }
        }
    }
    Reconciliation {
        expected,
        actual: wallet.total(),
        released_credits,
    }
}

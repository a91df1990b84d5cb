use crate::domain::money::Balance;
use crate::domain::order::{OrderNumber, VendorId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
    Withdrawal,
    RefundDebit,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Withdrawal => "withdrawal",
            Self::RefundDebit => "refund_debit",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Wallet state captured right after a transaction was applied.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct BalanceSnapshot {
    pub available: Balance,
    pub pending: Balance,
}

/// Where a withdrawal should be paid out. Processed outside the ledger.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutDestination {
    BankAccount {
        holder: String,
        account_number: String,
        ifsc: String,
    },
    Upi {
        vpa: String,
    },
}

/// Immutable ledger entry.
///
/// The only permitted change after creation is a credit moving from
/// `Pending` to `Completed` when it is released.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub vendor: VendorId,
    pub order: Option<OrderNumber>,
    /// Amount requested by the operation.
    pub amount: Decimal,
    /// Amount that actually moved. Differs from `amount` only for a clamped
    /// refund debit.
    pub applied: Decimal,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub balance_after: BalanceSnapshot,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<PayoutDestination>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WalletTransaction {
    pub fn is_pending_credit_for(&self, order: OrderNumber) -> bool {
        self.kind == TransactionKind::Credit
            && self.status == TransactionStatus::Pending
            && self.order == Some(order)
    }
}

/// Filters for listing a vendor's transactions. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub order: Option<OrderNumber>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &WalletTransaction) -> bool {
        self.kind.is_none_or(|k| k == tx.kind)
            && self.status.is_none_or(|s| s == tx.status)
            && self.order.is_none_or(|o| tx.order == Some(o))
            && self.since.is_none_or(|since| tx.created_at >= since)
            && self.until.is_none_or(|until| tx.created_at < until)
    }

    /// Applies the filter to a log, newest first, then pages it.
    pub fn apply(&self, mut log: Vec<WalletTransaction>) -> Vec<WalletTransaction> {
        log.retain(|tx| self.matches(tx));
        // Ties on `created_at` keep the latest append first.
        log.reverse();
        log.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        log.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

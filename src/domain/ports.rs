use super::events::Notification;
use super::order::{Order, OrderNumber, VendorId};
use super::transaction::WalletTransaction;
use super::wallet::VendorWallet;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Everything one ledger operation or order transition writes.
///
/// Stores apply a batch all-or-nothing: either every write lands or none does.
#[derive(Debug, Clone, Default)]
pub struct LedgerBatch {
    /// Order insert or update. Updates must carry `version == stored + 1`.
    pub order: Option<Order>,
    pub wallets: Vec<VendorWallet>,
    pub appends: Vec<WalletTransaction>,
    /// Credits flipped from pending to completed, replacing the stored record.
    pub completions: Vec<WalletTransaction>,
}

impl LedgerBatch {
    pub fn is_empty(&self) -> bool {
        self.order.is_none()
            && self.wallets.is_empty()
            && self.appends.is_empty()
            && self.completions.is_empty()
    }
}

/// Optimistic check every store runs before writing an order.
pub fn ensure_next_version(stored: Option<&Order>, incoming: &Order) -> Result<()> {
    let expected = stored.map_or(1, |order| order.version + 1);
    if incoming.version == expected {
        Ok(())
    } else {
        Err(LedgerError::storage(format!(
            "order {} version conflict: expected {expected}, got {}",
            incoming.number, incoming.version
        )))
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn next_order_number(&self) -> Result<OrderNumber>;
    async fn get_order(&self, number: OrderNumber) -> Result<Option<Order>>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_wallet(&self, vendor: &VendorId) -> Result<Option<VendorWallet>>;
    async fn all_wallets(&self) -> Result<Vec<VendorWallet>>;
    /// A vendor's full log in insertion order.
    async fn transactions(&self, vendor: &VendorId) -> Result<Vec<WalletTransaction>>;
    async fn commit(&self, batch: LedgerBatch) -> Result<()>;
}

/// Receives notifications. Must return immediately; delivery is best-effort.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub type OrderStoreBox = Box<dyn OrderStore>;
pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type NotifierRef = Arc<dyn Notifier>;

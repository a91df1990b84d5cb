use crate::domain::order::{Order, OrderNumber, VendorId};
use crate::domain::ports::{LedgerBatch, LedgerStore, OrderStore, ensure_next_version};
use crate::domain::transaction::WalletTransaction;
use crate::domain::wallet::VendorWallet;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    last_order: u64,
    orders: BTreeMap<OrderNumber, Order>,
    wallets: HashMap<VendorId, VendorWallet>,
    transactions: HashMap<VendorId, Vec<WalletTransaction>>,
}

/// A thread-safe in-memory store for orders, wallets and the transaction log.
///
/// All three live behind one `RwLock` so a [`LedgerBatch`] is applied under a
/// single write guard. `Clone` shares the underlying state, which lets the
/// order service and the ledger hold the same store.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn next_order_number(&self) -> Result<OrderNumber> {
        let mut state = self.state.write().await;
        state.last_order += 1;
        Ok(OrderNumber(state.last_order))
    }

    async fn get_order(&self, number: OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&number).cloned())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.values().cloned().collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn get_wallet(&self, vendor: &VendorId) -> Result<Option<VendorWallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.get(vendor).cloned())
    }

    async fn all_wallets(&self) -> Result<Vec<VendorWallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.values().cloned().collect())
    }

    async fn transactions(&self, vendor: &VendorId) -> Result<Vec<WalletTransaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(vendor).cloned().unwrap_or_default())
    }

    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        let mut state = self.state.write().await;

        // Validate everything before the first write so a bad batch leaves no trace.
        if let Some(order) = &batch.order {
            ensure_next_version(state.orders.get(&order.number), order)?;
        }
        for completed in &batch.completions {
            let known = state
                .transactions
                .get(&completed.vendor)
                .is_some_and(|log| log.iter().any(|tx| tx.id == completed.id));
            if !known {
                return Err(LedgerError::storage(format!(
                    "cannot complete unknown transaction {}",
                    completed.id
                )));
            }
        }

        if let Some(order) = batch.order {
            state.orders.insert(order.number, order);
        }
        for wallet in batch.wallets {
            state.wallets.insert(wallet.vendor.clone(), wallet);
        }
        for completed in batch.completions {
            if let Some(tx) = state
                .transactions
                .get_mut(&completed.vendor)
                .and_then(|log| log.iter_mut().find(|tx| tx.id == completed.id))
            {
                *tx = completed;
            }
        }
        for tx in batch.appends {
            state.transactions.entry(tx.vendor.clone()).or_default().push(tx);
        }
        Ok(())
    }
}

use crate::domain::order::{Order, OrderNumber, VendorId};
use crate::domain::ports::{LedgerBatch, LedgerStore, OrderStore, ensure_next_version};
use crate::domain::transaction::WalletTransaction;
use crate::domain::wallet::VendorWallet;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for order records, keyed by big-endian order number.
pub const CF_ORDERS: &str = "orders";
/// Column Family for vendor wallets, keyed by vendor id.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for the transaction log, keyed by `vendor \0 sequence`.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for counters.
pub const CF_META: &str = "meta";

const KEY_LAST_ORDER: &[u8] = b"last_order";
const KEY_LAST_TX: &[u8] = b"last_tx";

/// A persistent store implementation using RocksDB.
///
/// Each [`LedgerBatch`] becomes one `WriteBatch`, so an order update, its
/// wallet writes and its log entries reach disk together or not at all.
/// Writers are serialized by an async mutex that also guards the counters.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_WALLETS, CF_TRANSACTIONS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::storage(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn counter(&self, key: &[u8]) -> Result<u64> {
        let bytes = self.db.get_cf(self.cf(CF_META)?, key)?;
        match bytes {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::storage("corrupt counter value"))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Raw `(key, record)` pairs of a vendor's log in insertion order.
    fn vendor_log(&self, vendor: &VendorId) -> Result<Vec<(Box<[u8]>, WalletTransaction)>> {
        let prefix = log_prefix(vendor);
        let iter = self.db.iterator_cf(
            self.cf(CF_TRANSACTIONS)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );
        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let tx: WalletTransaction = serde_json::from_slice(&value)?;
            entries.push((key, tx));
        }
        Ok(entries)
    }
}

fn log_prefix(vendor: &VendorId) -> Vec<u8> {
    let mut prefix = vendor.as_str().as_bytes().to_vec();
    prefix.push(0);
    prefix
}

fn log_key(vendor: &VendorId, sequence: u64) -> Vec<u8> {
    let mut key = log_prefix(vendor);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn next_order_number(&self) -> Result<OrderNumber> {
        let _writer = self.writer.lock().await;
        let next = self.counter(KEY_LAST_ORDER)? + 1;
        self.db
            .put_cf(self.cf(CF_META)?, KEY_LAST_ORDER, next.to_be_bytes())?;
        Ok(OrderNumber(next))
    }

    async fn get_order(&self, number: OrderNumber) -> Result<Option<Order>> {
        self.read(CF_ORDERS, &number.0.to_be_bytes())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let iter = self
            .db
            .iterator_cf(self.cf(CF_ORDERS)?, IteratorMode::Start);
        let mut orders = Vec::new();
        for item in iter {
            let (_key, value) = item?;
            orders.push(serde_json::from_slice(&value)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn get_wallet(&self, vendor: &VendorId) -> Result<Option<VendorWallet>> {
        self.read(CF_WALLETS, vendor.as_str().as_bytes())
    }

    async fn all_wallets(&self) -> Result<Vec<VendorWallet>> {
        let iter = self
            .db
            .iterator_cf(self.cf(CF_WALLETS)?, IteratorMode::Start);
        let mut wallets = Vec::new();
        for item in iter {
            let (_key, value) = item?;
            wallets.push(serde_json::from_slice(&value)?);
        }
        Ok(wallets)
    }

    async fn transactions(&self, vendor: &VendorId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .vendor_log(vendor)?
            .into_iter()
            .map(|(_key, tx)| tx)
            .collect())
    }

    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut write = WriteBatch::default();

        if let Some(order) = &batch.order {
            let stored: Option<Order> = self.read(CF_ORDERS, &order.number.0.to_be_bytes())?;
            ensure_next_version(stored.as_ref(), order)?;
            write.put_cf(
                self.cf(CF_ORDERS)?,
                order.number.0.to_be_bytes(),
                serde_json::to_vec(order)?,
            );
        }

        for wallet in &batch.wallets {
            write.put_cf(
                self.cf(CF_WALLETS)?,
                wallet.vendor.as_str().as_bytes(),
                serde_json::to_vec(wallet)?,
            );
        }

        for completed in &batch.completions {
            let key = self
                .vendor_log(&completed.vendor)?
                .into_iter()
                .find(|(_key, tx)| tx.id == completed.id)
                .map(|(key, _tx)| key)
                .ok_or_else(|| {
                    LedgerError::storage(format!(
                        "cannot complete unknown transaction {}",
                        completed.id
                    ))
                })?;
            write.put_cf(self.cf(CF_TRANSACTIONS)?, key, serde_json::to_vec(completed)?);
        }

        let mut sequence = self.counter(KEY_LAST_TX)?;
        for tx in &batch.appends {
            sequence += 1;
            write.put_cf(
                self.cf(CF_TRANSACTIONS)?,
                log_key(&tx.vendor, sequence),
                serde_json::to_vec(tx)?,
            );
        }
        write.put_cf(self.cf(CF_META)?, KEY_LAST_TX, sequence.to_be_bytes());

        self.db.write(write)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::transaction::{BalanceSnapshot, TransactionKind, TransactionStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn credit(vendor: &str, order: u64) -> WalletTransaction {
        WalletTransaction {
            id: Uuid::new_v4(),
            vendor: VendorId::new(vendor),
            order: Some(OrderNumber(order)),
            amount: dec!(100),
            applied: dec!(100),
            kind: TransactionKind::Credit,
            status: TransactionStatus::Pending,
            balance_after: BalanceSnapshot::default(),
            description: "credit".into(),
            payout: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_ORDERS, CF_WALLETS, CF_TRANSACTIONS, CF_META] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_counters_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            assert_eq!(store.next_order_number().await.unwrap(), OrderNumber(1));
            assert_eq!(store.next_order_number().await.unwrap(), OrderNumber(2));
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.next_order_number().await.unwrap(), OrderNumber(3));
    }

    #[tokio::test]
    async fn test_rocksdb_log_keeps_insertion_order_per_vendor() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut wallet = VendorWallet::new(VendorId::new("v1"), Utc::now());
        wallet.pending = Balance::new(dec!(300));
        let txs: Vec<_> = (1..=3).map(|n| credit("v1", n)).collect();
        store
            .commit(LedgerBatch {
                wallets: vec![wallet.clone()],
                appends: txs.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .commit(LedgerBatch {
                appends: vec![credit("v10", 9)],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.transactions(&VendorId::new("v1")).await.unwrap(), txs);
        assert_eq!(store.transactions(&VendorId::new("v10")).await.unwrap().len(), 1);
        assert_eq!(store.get_wallet(&VendorId::new("v1")).await.unwrap(), Some(wallet));

        let mut done = txs[1].clone();
        done.status = TransactionStatus::Completed;
        store
            .commit(LedgerBatch {
                completions: vec![done.clone()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.transactions(&VendorId::new("v1")).await.unwrap()[1], done);
    }

    #[tokio::test]
    async fn test_rocksdb_rejects_unknown_completion_atomically() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let wallet = VendorWallet::new(VendorId::new("v1"), Utc::now());

        let result = store
            .commit(LedgerBatch {
                wallets: vec![wallet],
                completions: vec![credit("v1", 1)],
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(LedgerError::StorageError(_))));
        assert!(store.get_wallet(&VendorId::new("v1")).await.unwrap().is_none());
    }
}

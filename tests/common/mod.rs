#![allow(dead_code)]

use async_trait::async_trait;
use orderledger::application::ledger::WalletLedger;
use orderledger::application::orders::{NewOrder, OrderService};
use orderledger::domain::lifecycle::TransitionExtra;
use orderledger::domain::order::{
    LineItem, OrderNumber, PaymentMethod, ProductId, ShippingAddress, VendorId,
};
use orderledger::domain::ports::{LedgerBatch, LedgerStore};
use orderledger::domain::split::RevenueShare;
use orderledger::domain::transaction::WalletTransaction;
use orderledger::domain::wallet::VendorWallet;
use orderledger::error::{LedgerError, Result};
use orderledger::infrastructure::in_memory::InMemoryStore;
use orderledger::infrastructure::notify::RecordingNotifier;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const CUSTOMER: &str = "cust-1";

pub fn vendor(id: &str) -> VendorId {
    VendorId::new(id)
}

pub fn item(product: &str, vendor_id: &str, unit_price: Decimal, quantity: u32) -> LineItem {
    LineItem {
        product: ProductId(product.to_string()),
        vendor: vendor(vendor_id),
        unit_price,
        quantity,
    }
}

pub fn new_order(items: Vec<LineItem>, method: PaymentMethod) -> NewOrder {
    NewOrder {
        customer: CUSTOMER.to_string(),
        items,
        shipping_address: ShippingAddress {
            name: "Asha".into(),
            line1: "12 Market Road".into(),
            city: "Pune".into(),
            postal_code: "411001".into(),
            ..Default::default()
        },
        payment_method: method,
        payment_reference: (!method.is_cash_on_delivery()).then(|| "pay_ref_1".to_string()),
        discount: Decimal::ZERO,
        shipping_fee: Decimal::ZERO,
        tax: Decimal::ZERO,
    }
}

/// Two items from V1 (200 and 300) and one from V2 (500).
pub fn two_vendor_order(method: PaymentMethod) -> NewOrder {
    new_order(
        vec![
            item("p1", "V1", dec!(200), 1),
            item("p2", "V1", dec!(300), 1),
            item("p3", "V2", dec!(500), 1),
        ],
        method,
    )
}

pub fn shipping_extra() -> TransitionExtra {
    TransitionExtra {
        delivery_payment: Some(dec!(40)),
        estimated_delivery_minutes: Some(45),
        delivery_actor: Some("rider-1".into()),
        ..Default::default()
    }
}

/// Wraps the in-memory store and fails every commit while `fail` is set.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn get_wallet(&self, vendor: &VendorId) -> Result<Option<VendorWallet>> {
        self.inner.get_wallet(vendor).await
    }

    async fn all_wallets(&self) -> Result<Vec<VendorWallet>> {
        self.inner.all_wallets().await
    }

    async fn transactions(&self, vendor: &VendorId) -> Result<Vec<WalletTransaction>> {
        self.inner.transactions(vendor).await
    }

    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LedgerError::storage("disk unavailable"));
        }
        self.inner.commit(batch).await
    }
}

pub struct Harness {
    pub service: Arc<OrderService>,
    pub store: FlakyStore,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(dec!(100), RevenueShare::default())
    }

    pub fn with(min_withdrawal: Decimal, share: RevenueShare) -> Self {
        Self::on_store(FlakyStore::default(), min_withdrawal, share)
    }

    /// A fresh set of services over existing state, like a process restart.
    pub fn on_store(store: FlakyStore, min_withdrawal: Decimal, share: RevenueShare) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let ledger = Arc::new(WalletLedger::new(
            Box::new(store.clone()),
            notifier.clone(),
            min_withdrawal,
        ));
        let service = OrderService::new(
            Box::new(store.inner.clone()),
            ledger,
            share,
            notifier.clone(),
        );
        Self {
            service: Arc::new(service),
            store,
            notifier,
        }
    }

    pub fn ledger(&self) -> &WalletLedger {
        self.service.ledger()
    }

    pub async fn wallet(&self, id: &str) -> VendorWallet {
        self.ledger().get_wallet(&vendor(id)).await.unwrap()
    }

    pub async fn status_of(&self, number: OrderNumber) -> orderledger::domain::order::OrderStatus {
        self.service.get_order(number).await.unwrap().status
    }
}

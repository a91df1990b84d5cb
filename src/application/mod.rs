//! Application layer orchestrating the domain.
//!
//! [`orders::OrderService`] owns the order state machine entry points and
//! [`ledger::WalletLedger`] owns every balance mutation. Both serialize work
//! per key with [`locks::KeyedLocks`] so unrelated orders and vendors run in
//! parallel on the tokio runtime.

pub mod ledger;
pub mod locks;
pub mod orders;

use crate::config::LedgerConfig;
use crate::domain::ports::{LedgerStoreBox, NotifierRef, OrderStoreBox};
use crate::error::Result;
use ledger::WalletLedger;
use orders::OrderService;
use std::sync::Arc;

/// Wires the services from validated configuration.
pub fn build(
    config: &LedgerConfig,
    orders: OrderStoreBox,
    ledger_store: LedgerStoreBox,
    notifier: NotifierRef,
) -> Result<OrderService> {
    config.validate()?;
    let ledger = Arc::new(WalletLedger::new(
        ledger_store,
        notifier.clone(),
        config.min_withdrawal,
    ));
    Ok(OrderService::new(
        orders,
        ledger,
        config.revenue_share()?,
        notifier,
    ))
}

use crate::application::ledger::{Posting, WalletLedger};
use crate::application::locks::KeyedLocks;
use crate::domain::events::{Notification, NotificationKind};
use crate::domain::lifecycle::{self, TransitionExtra, WalletEffect};
use crate::domain::order::{
    LineItem, Order, OrderNumber, OrderStatus, OrderTotals, Payment, PaymentMethod, Principal,
    ShippingAddress, items_total,
};
use crate::domain::ports::{NotifierRef, OrderStoreBox};
use crate::domain::split::{self, RevenueShare};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Checkout output handed to the core once payment has been captured.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer: String,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub shipping_fee: Decimal,
    #[serde(default)]
    pub tax: Decimal,
}

impl NewOrder {
    fn totals(&self) -> Result<OrderTotals> {
        if self.items.is_empty() {
            return Err(LedgerError::ValidationError(
                "order must contain at least one item".to_string(),
            ));
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(LedgerError::ValidationError(format!(
                    "item {} has zero quantity",
                    item.product.0
                )));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(LedgerError::ValidationError(format!(
                    "item {} has a negative price",
                    item.product.0
                )));
            }
        }
        for (name, value) in [
            ("discount", self.discount),
            ("shipping fee", self.shipping_fee),
            ("tax", self.tax),
        ] {
            if value < Decimal::ZERO {
                return Err(LedgerError::ValidationError(format!(
                    "{name} must not be negative"
                )));
            }
        }

        let subtotal = items_total(&self.items)?;
        let total = subtotal
            .checked_add(self.shipping_fee)
            .and_then(|t| t.checked_add(self.tax))
            .map(|t| t - self.discount)
            .ok_or_else(|| {
                LedgerError::ValidationError("order total is too large".to_string())
            })?;
        if total < Decimal::ZERO {
            return Err(LedgerError::ValidationError(format!(
                "discount {} exceeds the order value",
                self.discount
            )));
        }
        Ok(OrderTotals {
            subtotal,
            discount: self.discount,
            shipping_fee: self.shipping_fee,
            tax: self.tax,
            total,
        })
    }
}

/// Entry point for order placement and every status change.
pub struct OrderService {
    orders: OrderStoreBox,
    ledger: Arc<WalletLedger>,
    locks: KeyedLocks<OrderNumber>,
    share: RevenueShare,
    notifier: NotifierRef,
}

impl OrderService {
    pub fn new(
        orders: OrderStoreBox,
        ledger: Arc<WalletLedger>,
        share: RevenueShare,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            orders,
            ledger,
            locks: KeyedLocks::new(),
            share,
            notifier,
        }
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    /// Stores a new `pending` order and, unless it is cash-on-delivery, credits
    /// each vendor's share as pending revenue in the same commit.
    #[instrument(skip(self, new_order), fields(customer = %new_order.customer))]
    pub async fn place_order(&self, new_order: NewOrder) -> Result<Order> {
        let totals = new_order.totals()?;
        let number = self.orders.next_order_number().await?;
        let now = Utc::now();

        let order = Order {
            number,
            customer: new_order.customer,
            items: new_order.items,
            shipping_address: new_order.shipping_address,
            payment: Payment {
                method: new_order.payment_method,
                reference: new_order.payment_reference,
            },
            totals,
            status: OrderStatus::Pending,
            timeline: Order::initial_timeline(now),
            delivery_actor: None,
            delivery: None,
            refund: None,
            cancellation_reason: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let postings = if order.payment.method.is_cash_on_delivery() {
            Vec::new()
        } else {
            split::vendors(&order)
                .into_iter()
                .map(|vendor| {
                    let gross = split::split_for(&order, &vendor)?.gross;
                    Ok(Posting::Credit {
                        amount: self.share.vendor_share(gross),
                        description: format!("Revenue from order {number}"),
                        vendor,
                    })
                })
                .collect::<Result<_>>()?
        };

        let _guard = self.locks.lock(&number).await;
        self.ledger.post(order.clone(), postings).await?;

        info!(order = %number, total = %order.totals.total, "order placed");
        self.notifier.notify(Notification::order(
            NotificationKind::OrderPlaced,
            number,
            OrderStatus::Pending,
            format!("Order {number} placed"),
        ));
        Ok(order)
    }

    pub async fn get_order(&self, number: OrderNumber) -> Result<Order> {
        self.orders
            .get_order(number)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("order {number}")))
    }

    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        self.orders.all_orders().await
    }

    /// The only way an order's status changes.
    ///
    /// Concurrent calls for the same order are serialized; the order write and
    /// any wallet postings are committed together, so a rejected or failed
    /// call leaves both untouched.
    #[instrument(skip(self, principal, extra), fields(order = %number, to = %to, role = %principal.role))]
    pub async fn transition(
        &self,
        number: OrderNumber,
        to: OrderStatus,
        principal: &Principal,
        extra: TransitionExtra,
    ) -> Result<Order> {
        let _guard = self.locks.lock(&number).await;
        let current = self.get_order(number).await?;

        let plan = lifecycle::plan(&current, to, principal, &extra).inspect_err(|err| {
            warn!(error = %err, "transition rejected");
        })?;

        let mut updated = current.clone();
        lifecycle::apply(&mut updated, &plan, &extra, Utc::now());

        let postings = match plan.wallet {
            WalletEffect::None => Vec::new(),
            WalletEffect::ReleaseVendorShares => split::vendors(&current)
                .into_iter()
                .map(|vendor| Posting::Release { vendor })
                .collect(),
            WalletEffect::ReverseCredits => split::vendors(&current)
                .into_iter()
                .map(|vendor| Posting::ReverseCredit { vendor })
                .collect(),
        };

        self.ledger.post(updated.clone(), postings).await?;

        info!(from = %plan.from, "order status changed");
        self.notifier.notify(Notification::order(
            NotificationKind::OrderStatusChanged,
            number,
            to,
            format!("Order {number} is now {to}"),
        ));
        if let Some(refund) = &updated.refund
            && current.refund.is_none()
        {
            self.notifier.notify(Notification {
                amount: Some(refund.amount.value()),
                ..Notification::order(
                    NotificationKind::RefundRequested,
                    number,
                    to,
                    format!("Refund requested for payment {}", refund.payment_reference),
                )
            });
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::order::{ActorRole, ProductId, VendorId};
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::infrastructure::notify::RecordingNotifier;
    use rust_decimal_macros::dec;

    fn service() -> (OrderService, Arc<RecordingNotifier>) {
        let store = InMemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let ledger = Arc::new(WalletLedger::new(
            Box::new(store.clone()),
            notifier.clone(),
            dec!(100),
        ));
        let service = OrderService::new(
            Box::new(store),
            ledger,
            RevenueShare::default(),
            notifier.clone(),
        );
        (service, notifier)
    }

    fn item(vendor: &str, price: Decimal) -> LineItem {
        LineItem {
            product: ProductId(format!("sku-{vendor}-{price}")),
            vendor: VendorId::new(vendor),
            unit_price: price,
            quantity: 1,
        }
    }

    fn new_order(method: PaymentMethod) -> NewOrder {
        NewOrder {
            customer: "c1".into(),
            items: vec![item("v1", dec!(200)), item("v2", dec!(50))],
            shipping_address: ShippingAddress::default(),
            payment_method: method,
            payment_reference: (!method.is_cash_on_delivery()).then(|| "pay_1".to_string()),
            discount: dec!(20),
            shipping_fee: dec!(30),
            tax: dec!(12.5),
        }
    }

    #[tokio::test]
    async fn test_place_order_computes_totals_and_numbers() {
        let (service, _) = service();
        let first = service.place_order(new_order(PaymentMethod::Cod)).await.unwrap();
        let second = service.place_order(new_order(PaymentMethod::Cod)).await.unwrap();

        assert_eq!(first.number, OrderNumber(1));
        assert_eq!(second.number, OrderNumber(2));
        assert_eq!(first.totals.subtotal, dec!(250));
        assert_eq!(first.totals.total, dec!(272.5));
        assert_eq!(first.status, OrderStatus::Pending);
        assert!(lifecycle::timeline_is_consistent(&first));
    }

    #[tokio::test]
    async fn test_place_order_validation() {
        let (service, _) = service();
        let mut order = new_order(PaymentMethod::Upi);
        order.items.clear();
        assert!(matches!(
            service.place_order(order).await,
            Err(LedgerError::ValidationError(_))
        ));

        let mut order = new_order(PaymentMethod::Upi);
        order.discount = dec!(1000);
        assert!(matches!(
            service.place_order(order).await,
            Err(LedgerError::ValidationError(_))
        ));

        let mut order = new_order(PaymentMethod::Upi);
        order.items[0].quantity = 0;
        assert!(matches!(
            service.place_order(order).await,
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_place_order_rejects_unrepresentable_totals() {
        let (service, notifier) = service();
        let mut order = new_order(PaymentMethod::Upi);
        order.items[0].unit_price = Decimal::MAX;
        order.items[0].quantity = 2;
        assert!(matches!(
            service.place_order(order).await,
            Err(LedgerError::ValidationError(_))
        ));

        let mut order = new_order(PaymentMethod::Upi);
        order.shipping_fee = Decimal::MAX;
        assert!(matches!(
            service.place_order(order).await,
            Err(LedgerError::ValidationError(_))
        ));

        assert!(service.all_orders().await.unwrap().is_empty());
        assert!(matches!(
            service.ledger().get_wallet(&VendorId::new("v1")).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_online_order_credits_each_vendor_pending() {
        let (service, notifier) = service();
        service.place_order(new_order(PaymentMethod::Upi)).await.unwrap();

        let v1 = service.ledger().get_wallet(&VendorId::new("v1")).await.unwrap();
        let v2 = service.ledger().get_wallet(&VendorId::new("v2")).await.unwrap();
        assert_eq!(v1.pending, Balance::new(dec!(200)));
        assert_eq!(v2.pending, Balance::new(dec!(50)));
        assert!(notifier.kinds().contains(&NotificationKind::OrderPlaced));
    }

    #[tokio::test]
    async fn test_cod_order_creates_no_wallet() {
        let (service, _) = service();
        service.place_order(new_order(PaymentMethod::Cod)).await.unwrap();
        assert!(matches!(
            service.ledger().get_wallet(&VendorId::new("v1")).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_unknown_order() {
        let (service, _) = service();
        let err = service
            .transition(
                OrderNumber(99),
                OrderStatus::Confirmed,
                &Principal::admin("root"),
                TransitionExtra::default(),
            )
            .await;
        assert!(matches!(err, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_reverses_credits_and_requests_refund() {
        let (service, notifier) = service();
        let order = service.place_order(new_order(PaymentMethod::Card)).await.unwrap();
        let customer = Principal::new("c1", ActorRole::Customer);

        let cancelled = service
            .transition(order.number, OrderStatus::Cancelled, &customer, TransitionExtra::default())
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.refund.unwrap().amount, Balance::new(dec!(272.5)));

        let v1 = service.ledger().get_wallet(&VendorId::new("v1")).await.unwrap();
        assert_eq!(v1.pending, Balance::ZERO);
        assert_eq!(v1.available, Balance::ZERO);
        assert!(service.ledger().reconcile(&VendorId::new("v1")).await.unwrap().is_balanced());

        let kinds = notifier.kinds();
        assert!(kinds.contains(&NotificationKind::WalletDebited));
        assert!(kinds.contains(&NotificationKind::RefundRequested));
    }

    #[tokio::test]
    async fn test_rejected_transition_changes_nothing() {
        let (service, _) = service();
        let order = service.place_order(new_order(PaymentMethod::Upi)).await.unwrap();
        let vendor = Principal::new("v1", ActorRole::Vendor);

        let err = service
            .transition(order.number, OrderStatus::Shipped, &vendor, TransitionExtra::default())
            .await;
        assert!(matches!(err, Err(LedgerError::ValidationError(_))));

        let stored = service.get_order(order.number).await.unwrap();
        assert_eq!(stored, order);
    }
}

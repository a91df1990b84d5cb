use crate::domain::money::Balance;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable order number, assigned monotonically by the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(pub u64);

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ORD-{:06}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub String);

impl VendorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

/// Role of the caller, as established by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Vendor,
    Admin,
    Delivery,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActorRole::Customer => "customer",
            ActorRole::Vendor => "vendor",
            ActorRole::Admin => "admin",
            ActorRole::Delivery => "delivery",
        })
    }
}

/// An already-verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: ActorRole,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    pub fn vendor(id: &VendorId) -> Self {
        Self::new(id.as_str(), ActorRole::Vendor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Timeline stage reached when an order enters this status.
    /// `Cancelled` has no stage: cancellation leaves the timeline untouched.
    pub fn stage(&self) -> Option<TimelineStage> {
        match self {
            Self::Pending => Some(TimelineStage::Placed),
            Self::Confirmed | Self::Processing => Some(TimelineStage::Confirmed),
            Self::Shipped => Some(TimelineStage::Shipped),
            Self::OutForDelivery => Some(TimelineStage::OutForDelivery),
            Self::Delivered => Some(TimelineStage::Delivered),
            Self::Cancelled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStage {
    Placed,
    Confirmed,
    Shipped,
    OutForDelivery,
    Delivered,
}

impl TimelineStage {
    pub const ALL: [TimelineStage; 5] = [
        TimelineStage::Placed,
        TimelineStage::Confirmed,
        TimelineStage::Shipped,
        TimelineStage::OutForDelivery,
        TimelineStage::Delivered,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub stage: TimelineStage,
    pub completed: bool,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Upi,
    Card,
    NetBanking,
    Wallet,
}

impl PaymentMethod {
    /// Cash-on-delivery is collected outside the online wallet flow.
    pub fn is_cash_on_delivery(&self) -> bool {
        matches!(self, Self::Cod)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    /// Gateway reference of the captured customer payment, absent for COD.
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product: ProductId,
    pub vendor: VendorId,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineItem {
    /// `unit_price * quantity`, or a validation error when it cannot be represented.
    pub fn line_total(&self) -> Result<Decimal> {
        self.unit_price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("item {} total is too large", self.product.0))
            })
    }
}

/// Sum of line totals over `items`.
pub fn items_total<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> Result<Decimal> {
    items.into_iter().try_fold(Decimal::ZERO, |acc, item| {
        acc.checked_add(item.line_total()?)
            .ok_or_else(|| LedgerError::ValidationError("order total is too large".to_string()))
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Vendor-supplied delivery terms, recorded when the order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTerms {
    pub payment: Decimal,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundIntent {
    pub amount: Balance,
    pub payment_reference: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: OrderNumber,
    pub customer: String,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment: Payment,
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub timeline: Vec<TimelineEntry>,
    pub delivery_actor: Option<String>,
    pub delivery: Option<DeliveryTerms>,
    pub refund: Option<RefundIntent>,
    pub cancellation_reason: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every persisted mutation; stores reject stale writes.
    pub version: u64,
}

impl Order {
    /// Fresh five-stage timeline with only `Placed` completed.
    pub fn initial_timeline(placed_at: DateTime<Utc>) -> Vec<TimelineEntry> {
        TimelineStage::ALL
            .iter()
            .map(|&stage| TimelineEntry {
                stage,
                completed: stage == TimelineStage::Placed,
                at: (stage == TimelineStage::Placed).then_some(placed_at),
            })
            .collect()
    }

    pub fn contains_vendor(&self, vendor: &VendorId) -> bool {
        self.items.iter().any(|item| &item.vendor == vendor)
    }

    pub fn timeline_entry(&self, stage: TimelineStage) -> Option<&TimelineEntry> {
        self.timeline.get(stage.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_number_display() {
        assert_eq!(OrderNumber(42).to_string(), "ORD-000042");
        assert_eq!(OrderNumber(1_234_567).to_string(), "ORD-1234567");
    }

    #[test]
    fn test_status_stage_mapping() {
        assert_eq!(OrderStatus::Pending.stage(), Some(TimelineStage::Placed));
        assert_eq!(OrderStatus::Confirmed.stage(), Some(TimelineStage::Confirmed));
        assert_eq!(OrderStatus::Processing.stage(), Some(TimelineStage::Confirmed));
        assert_eq!(OrderStatus::Shipped.stage().map(|s| s.index()), Some(2));
        assert_eq!(OrderStatus::OutForDelivery.stage().map(|s| s.index()), Some(3));
        assert_eq!(OrderStatus::Delivered.stage().map(|s| s.index()), Some(4));
        assert_eq!(OrderStatus::Cancelled.stage(), None);
    }

    #[test]
    fn test_initial_timeline() {
        let now = Utc::now();
        let timeline = Order::initial_timeline(now);
        assert_eq!(timeline.len(), 5);
        assert!(timeline[0].completed);
        assert_eq!(timeline[0].at, Some(now));
        assert!(timeline[1..].iter().all(|e| !e.completed && e.at.is_none()));
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
        let role: ActorRole = serde_json::from_str("\"delivery\"").unwrap();
        assert_eq!(role, ActorRole::Delivery);
    }

    #[test]
    fn test_line_total() {
        let item = LineItem {
            product: ProductId("p1".into()),
            vendor: VendorId::new("v1"),
            unit_price: dec!(199.50),
            quantity: 3,
        };
        assert_eq!(item.line_total().unwrap(), dec!(598.50));
    }

    #[test]
    fn test_oversized_totals_are_rejected() {
        let item = LineItem {
            product: ProductId("p1".into()),
            vendor: VendorId::new("v1"),
            unit_price: Decimal::MAX,
            quantity: 2,
        };
        assert!(matches!(item.line_total(), Err(LedgerError::ValidationError(_))));

        let half = LineItem {
            quantity: 1,
            ..item
        };
        assert!(matches!(
            items_total([&half, &half]),
            Err(LedgerError::ValidationError(_))
        ));
    }
}

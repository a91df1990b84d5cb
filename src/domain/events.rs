use crate::domain::order::{OrderNumber, OrderStatus, VendorId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderStatusChanged,
    RefundRequested,
    WalletCredited,
    WalletReleased,
    WalletDebited,
    WithdrawalRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Order(OrderNumber),
    Vendor(VendorId),
}

/// Payload handed to the notification dispatcher after a committed change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: Subject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    pub description: String,
}

impl Notification {
    pub fn order(
        kind: NotificationKind,
        order: OrderNumber,
        status: OrderStatus,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subject: Subject::Order(order),
            status: Some(status),
            amount: None,
            description: description.into(),
        }
    }

    pub fn vendor(
        kind: NotificationKind,
        vendor: VendorId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subject: Subject::Vendor(vendor),
            status: None,
            amount: Some(amount),
            description: description.into(),
        }
    }
}

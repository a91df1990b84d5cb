use crate::domain::order::{LineItem, Order, VendorId, items_total};
use crate::error::{LedgerError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeSet;

/// One vendor's portion of a multi-vendor order.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorSplit<'a> {
    pub vendor: VendorId,
    pub items: Vec<&'a LineItem>,
    /// Sum of `unit_price * quantity` over `items`, before commission.
    pub gross: Decimal,
}

/// Line items owned by `vendor` and their gross subtotal.
pub fn split_for<'a>(order: &'a Order, vendor: &VendorId) -> Result<VendorSplit<'a>> {
    let items: Vec<&LineItem> = order
        .items
        .iter()
        .filter(|item| &item.vendor == vendor)
        .collect();
    let gross = items_total(items.iter().copied())?;
    Ok(VendorSplit {
        vendor: vendor.clone(),
        items,
        gross,
    })
}

/// Distinct vendors of an order, sorted so lock acquisition order is stable.
pub fn vendors(order: &Order) -> Vec<VendorId> {
    order
        .items
        .iter()
        .map(|item| item.vendor.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Converts a vendor's gross subtotal into what the vendor is owed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevenueShare {
    commission_rate: Decimal,
}

impl RevenueShare {
    pub fn new(commission_rate: Decimal) -> Result<Self> {
        if commission_rate < Decimal::ZERO || commission_rate > Decimal::ONE {
            return Err(LedgerError::ValidationError(format!(
                "commission rate must be within [0, 1], got {commission_rate}"
            )));
        }
        Ok(Self { commission_rate })
    }

    pub fn vendor_share(&self, gross: Decimal) -> Decimal {
        let commission = (gross * self.commission_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
        gross - commission
    }
}

impl Default for RevenueShare {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{
        OrderNumber, OrderStatus, OrderTotals, Payment, PaymentMethod, ProductId, ShippingAddress,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn item(vendor: &str, price: Decimal, quantity: u32) -> LineItem {
        LineItem {
            product: ProductId(format!("{vendor}-{price}")),
            vendor: VendorId::new(vendor),
            unit_price: price,
            quantity,
        }
    }

    fn order(items: Vec<LineItem>) -> Order {
        let now = Utc::now();
        Order {
            number: OrderNumber(7),
            customer: "c".into(),
            items,
            shipping_address: ShippingAddress::default(),
            payment: Payment {
                method: PaymentMethod::Upi,
                reference: None,
            },
            totals: OrderTotals {
                subtotal: dec!(0),
                discount: dec!(0),
                shipping_fee: dec!(0),
                tax: dec!(0),
                total: dec!(0),
            },
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
        }
    }

    #[test]
    fn test_split_multi_vendor_order() {
        let o = order(vec![
            item("v1", dec!(200), 1),
            item("v2", dec!(500), 1),
            item("v1", dec!(300), 1),
        ]);
        let v1 = split_for(&o, &VendorId::new("v1")).unwrap();
        assert_eq!(v1.items.len(), 2);
        assert_eq!(v1.gross, dec!(500));

        let v2 = split_for(&o, &VendorId::new("v2")).unwrap();
        assert_eq!(v2.items.len(), 1);
        assert_eq!(v2.gross, dec!(500));
    }

    #[test]
    fn test_split_respects_quantity() {
        let o = order(vec![item("v1", dec!(19.99), 3)]);
        assert_eq!(split_for(&o, &VendorId::new("v1")).unwrap().gross, dec!(59.97));
    }

    #[test]
    fn test_split_for_absent_vendor_is_empty() {
        let o = order(vec![item("v1", dec!(10), 1)]);
        let split = split_for(&o, &VendorId::new("nobody")).unwrap();
        assert!(split.items.is_empty());
        assert_eq!(split.gross, Decimal::ZERO);
    }

    #[test]
    fn test_vendors_sorted_and_distinct() {
        let o = order(vec![
            item("zeta", dec!(1), 1),
            item("alpha", dec!(1), 1),
            item("zeta", dec!(2), 1),
        ]);
        assert_eq!(vendors(&o), vec![VendorId::new("alpha"), VendorId::new("zeta")]);
    }

    #[test]
    fn test_revenue_share() {
        assert_eq!(RevenueShare::default().vendor_share(dec!(500)), dec!(500));
        let share = RevenueShare::new(dec!(0.10)).unwrap();
        assert_eq!(share.vendor_share(dec!(500)), dec!(450.00));
        assert_eq!(share.vendor_share(dec!(33.33)), dec!(30.00));
        assert!(RevenueShare::new(dec!(1.5)).is_err());
        assert!(RevenueShare::new(dec!(-0.1)).is_err());
    }
}

//! Order status state machine.
//!
//! Everything here is pure: legality, permission and timeline bookkeeping are
//! decided from the order value alone. The application layer owns locking,
//! persistence and the wallet postings that accompany some edges.

use crate::domain::money::Balance;
use crate::domain::order::{
    ActorRole, DeliveryTerms, Order, OrderStatus, Principal, RefundIntent, VendorId,
};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transition-specific data supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionExtra {
    pub delivery_payment: Option<Decimal>,
    pub estimated_delivery_minutes: Option<i64>,
    pub delivery_actor: Option<String>,
    pub reason: Option<String>,
}

/// Money movement that must be committed together with a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEffect {
    None,
    /// Move each vendor's pending credit for the order into available.
    ReleaseVendorShares,
    /// Reverse any pending credit recorded for the order.
    ReverseCredits,
}

/// A validated transition, ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub delivery: Option<DeliveryTerms>,
    pub wallet: WalletEffect,
}

/// Whether the state graph has an edge `from -> to`, regardless of who asks.
pub fn edge_is_legal(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match to {
        Confirmed => matches!(from, Pending),
        Processing => matches!(from, Pending | Confirmed),
        Shipped => matches!(from, Pending | Confirmed | Processing),
        OutForDelivery => matches!(from, Shipped),
        Delivered => matches!(from, Shipped | OutForDelivery),
        Cancelled => matches!(from, Pending | Confirmed | Processing),
        Pending => false,
    }
}

/// Statuses a role is allowed to set.
pub fn role_may_set(role: ActorRole, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match role {
        ActorRole::Admin => true,
        ActorRole::Customer => matches!(to, Cancelled),
        ActorRole::Vendor => matches!(to, Confirmed | Processing | Shipped | Cancelled),
        ActorRole::Delivery => matches!(to, OutForDelivery | Delivered),
    }
}

/// The complete transition table as a single predicate.
pub fn is_allowed(from: OrderStatus, to: OrderStatus, role: ActorRole) -> bool {
    !from.is_terminal() && edge_is_legal(from, to) && role_may_set(role, to)
}

/// Validates a requested transition without touching the order.
///
/// Checks run from the most general to the most specific so the caller gets
/// the most useful rejection: terminal guard, same-status, edge legality, role,
/// ownership, then the extra data.
pub fn plan(
    order: &Order,
    to: OrderStatus,
    principal: &Principal,
    extra: &TransitionExtra,
) -> Result<TransitionPlan> {
    let from = order.status;

    if from == OrderStatus::Cancelled && to == OrderStatus::Cancelled {
        return Err(LedgerError::AlreadyCancelled);
    }
    if from.is_terminal() {
        return Err(LedgerError::AlreadyTerminal(from));
    }
    if from == to || !edge_is_legal(from, to) {
        return Err(LedgerError::InvalidTransition { from, to });
    }
    if !role_may_set(principal.role, to) {
        return Err(LedgerError::Forbidden {
            role: principal.role,
            action: format!("set order status to {to}"),
        });
    }
    check_ownership(order, principal)?;

    let delivery = if to == OrderStatus::Shipped {
        Some(delivery_terms(extra)?)
    } else {
        None
    };

    let wallet = match to {
        OrderStatus::Delivered if !order.payment.method.is_cash_on_delivery() => {
            WalletEffect::ReleaseVendorShares
        }
        OrderStatus::Cancelled => WalletEffect::ReverseCredits,
        _ => WalletEffect::None,
    };

    Ok(TransitionPlan {
        from,
        to,
        delivery,
        wallet,
    })
}

fn check_ownership(order: &Order, principal: &Principal) -> Result<()> {
    let owns = match principal.role {
        ActorRole::Admin => true,
        ActorRole::Customer => order.customer == principal.id,
        ActorRole::Vendor => order.contains_vendor(&VendorId::new(principal.id.as_str())),
        ActorRole::Delivery => order
            .delivery_actor
            .as_ref()
            .is_none_or(|assigned| assigned == &principal.id),
    };
    if owns {
        Ok(())
    } else {
        Err(LedgerError::Forbidden {
            role: principal.role,
            action: format!("act on order {}", order.number),
        })
    }
}

fn delivery_terms(extra: &TransitionExtra) -> Result<DeliveryTerms> {
    let payment = extra
        .delivery_payment
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| {
            LedgerError::ValidationError(
                "shipping requires a positive delivery payment".to_string(),
            )
        })?;
    let minutes = extra
        .estimated_delivery_minutes
        .filter(|m| *m > 0)
        .and_then(|m| u32::try_from(m).ok())
        .ok_or_else(|| {
            LedgerError::ValidationError(
                "shipping requires a positive estimated delivery time in minutes".to_string(),
            )
        })?;
    Ok(DeliveryTerms {
        payment,
        estimated_minutes: minutes,
    })
}

/// Applies a validated plan to the order.
///
/// Timeline entries up to the new stage are completed; timestamps already set
/// are kept so history is never rewritten.
pub fn apply(order: &mut Order, plan: &TransitionPlan, extra: &TransitionExtra, now: DateTime<Utc>) {
    order.status = plan.to;

    if let Some(stage) = plan.to.stage() {
        for entry in order.timeline.iter_mut().take(stage.index() + 1) {
            entry.completed = true;
            entry.at.get_or_insert(now);
        }
    }

    match plan.to {
        OrderStatus::Shipped => {
            order.delivery = plan.delivery.clone();
        }
        OrderStatus::Delivered => {
            order.delivered_at = Some(now);
        }
        OrderStatus::Cancelled => {
            order.cancellation_reason = extra.reason.clone();
            if let Some(reference) = order.payment.reference.clone()
                && !order.payment.method.is_cash_on_delivery()
            {
                order.refund = Some(RefundIntent {
                    amount: Balance::new(order.totals.total),
                    payment_reference: reference,
                    requested_at: now,
                });
            }
        }
        _ => {}
    }

    if let Some(actor) = &extra.delivery_actor
        && matches!(plan.to, OrderStatus::Shipped | OrderStatus::OutForDelivery)
    {
        order.delivery_actor = Some(actor.clone());
    }

    order.updated_at = now;
    order.version += 1;
}

/// Checks the timeline prefix property for the order's current status.
pub fn timeline_is_consistent(order: &Order) -> bool {
    let Some(stage) = order.status.stage() else {
        // Cancelled orders keep whatever prefix they had reached.
        return order
            .timeline
            .iter()
            .all(|e| e.completed == e.at.is_some());
    };
    order.timeline.iter().enumerate().all(|(i, e)| {
        if i <= stage.index() {
            e.completed && e.at.is_some()
        } else {
            !e.completed && e.at.is_none()
        }
    })
}

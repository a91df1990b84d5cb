use crate::application::locks::KeyedLocks;
use crate::domain::events::{Notification, NotificationKind};
use crate::domain::money::{Amount, Balance};
use crate::domain::order::{Order, OrderNumber, VendorId};
use crate::domain::ports::{LedgerBatch, LedgerStoreBox, NotifierRef};
use crate::domain::transaction::{
    PayoutDestination, TransactionFilter, TransactionKind, TransactionStatus, WalletTransaction,
};
use crate::domain::wallet::{Reconciliation, VendorWallet, reconcile};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A ledger movement requested as part of an order change.
#[derive(Debug, Clone, PartialEq)]
pub enum Posting {
    Credit {
        vendor: VendorId,
        amount: Decimal,
        description: String,
    },
    /// Release the vendor's pending credit for the order, as recorded.
    Release { vendor: VendorId },
    /// Debit back the vendor's still-pending credit for the order, if any.
    ReverseCredit { vendor: VendorId },
}

impl Posting {
    fn vendor(&self) -> &VendorId {
        match self {
            Posting::Credit { vendor, .. }
            | Posting::Release { vendor }
            | Posting::ReverseCredit { vendor } => vendor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Released {
        moved: Balance,
        transaction: WalletTransaction,
    },
    /// The credit for this order was already released; nothing moved.
    AlreadyReleased,
    /// The credit for this order was reversed by a cancellation.
    CreditReversed,
    NoPendingCredit,
}

/// The only writer of vendor balances.
///
/// Each operation locks the vendor, stages its changes against a private copy
/// of the wallet and commits wallet and log entries as one batch.
pub struct WalletLedger {
    store: LedgerStoreBox,
    locks: KeyedLocks<VendorId>,
    notifier: NotifierRef,
    min_withdrawal: Decimal,
}

impl WalletLedger {
    pub fn new(store: LedgerStoreBox, notifier: NotifierRef, min_withdrawal: Decimal) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            notifier,
            min_withdrawal,
        }
    }

    /// Adds `amount` to the vendor's pending balance. A zero amount is a no-op.
    #[instrument(skip(self, description), fields(vendor = %vendor))]
    pub async fn credit(
        &self,
        vendor: &VendorId,
        amount: Decimal,
        order: Option<OrderNumber>,
        description: &str,
    ) -> Result<Option<WalletTransaction>> {
        let Some(amount) = non_negative(amount)? else {
            return Ok(None);
        };
        let _guard = self.locks.lock(vendor).await;
        let mut stage = Stage::new(Utc::now());
        let tx = stage
            .credit(self.store.as_ref(), vendor, amount, order, description)
            .await?;
        self.finish(stage).await?;
        Ok(Some(tx))
    }

    /// Moves up to `amount` of the pending credit for `order` into available.
    /// Never moves more than that credit recorded.
    #[instrument(skip(self), fields(vendor = %vendor, order = %order))]
    pub async fn release(
        &self,
        vendor: &VendorId,
        amount: Decimal,
        order: OrderNumber,
    ) -> Result<ReleaseOutcome> {
        let amount = non_negative(amount)?.map(Balance::from).unwrap_or(Balance::ZERO);
        let _guard = self.locks.lock(vendor).await;
        self.require_wallet(vendor).await?;
        let mut stage = Stage::new(Utc::now());
        let outcome = stage
            .release(self.store.as_ref(), vendor, Some(amount), order)
            .await?;
        self.finish(stage).await?;
        Ok(outcome)
    }

    /// Removes `amount` from pending, then available, flooring both at zero.
    /// The log records the full requested amount.
    #[instrument(skip(self, description), fields(vendor = %vendor))]
    pub async fn debit(
        &self,
        vendor: &VendorId,
        amount: Decimal,
        order: Option<OrderNumber>,
        description: &str,
    ) -> Result<WalletTransaction> {
        let amount = Amount::new(amount)?;
        let _guard = self.locks.lock(vendor).await;
        self.require_wallet(vendor).await?;
        let mut stage = Stage::new(Utc::now());
        let tx = stage
            .debit(self.store.as_ref(), vendor, amount, order, description)
            .await?;
        self.finish(stage).await?;
        Ok(tx)
    }

    #[instrument(skip(self, destination), fields(vendor = %vendor))]
    pub async fn request_withdrawal(
        &self,
        vendor: &VendorId,
        amount: Decimal,
        destination: PayoutDestination,
    ) -> Result<WalletTransaction> {
        let amount = Amount::new(amount)?;
        if amount.value() < self.min_withdrawal {
            return Err(LedgerError::BelowMinimum {
                requested: amount.value(),
                minimum: self.min_withdrawal,
            });
        }
        let _guard = self.locks.lock(vendor).await;
        let mut stage = Stage::new(Utc::now());
        let tx = stage
            .withdraw(self.store.as_ref(), vendor, amount, destination)
            .await?;
        self.finish(stage).await?;
        Ok(tx)
    }

    pub async fn get_wallet(&self, vendor: &VendorId) -> Result<VendorWallet> {
        self.require_wallet(vendor).await
    }

    pub async fn all_wallets(&self) -> Result<Vec<VendorWallet>> {
        let mut wallets = self.store.all_wallets().await?;
        wallets.sort_by(|a, b| a.vendor.cmp(&b.vendor));
        Ok(wallets)
    }

    pub async fn list_transactions(
        &self,
        vendor: &VendorId,
        filter: &TransactionFilter,
    ) -> Result<Vec<WalletTransaction>> {
        self.require_wallet(vendor).await?;
        let log = self.store.transactions(vendor).await?;
        Ok(filter.apply(log))
    }

    /// Replays the vendor's log and compares it with the stored balances.
    pub async fn reconcile(&self, vendor: &VendorId) -> Result<Reconciliation> {
        let _guard = self.locks.lock(vendor).await;
        let wallet = self.require_wallet(vendor).await?;
        let log = self.store.transactions(vendor).await?;
        Ok(reconcile(&wallet, &log))
    }

    /// Commits `order` together with `postings` in one batch.
    ///
    /// Used by the order service so a status change and its money movement
    /// land together or not at all. Vendor locks are taken in sorted order.
    pub(crate) async fn post(&self, order: Order, postings: Vec<Posting>) -> Result<()> {
        let vendors: Vec<VendorId> = postings.iter().map(|p| p.vendor().clone()).collect();
        let _guards = self.locks.lock_all(&vendors).await;
        debug!(order = %order.number, vendors = vendors.len(), "vendor locks acquired");

        let number = order.number;
        let mut stage = Stage::new(order.updated_at);
        for posting in postings {
            match posting {
                Posting::Credit {
                    vendor,
                    amount,
                    description,
                } => {
                    if let Some(amount) = non_negative(amount)? {
                        stage
                            .credit(self.store.as_ref(), &vendor, amount, Some(number), &description)
                            .await?;
                    }
                }
                Posting::Release { vendor } => {
                    stage
                        .release(self.store.as_ref(), &vendor, None, number)
                        .await?;
                }
                Posting::ReverseCredit { vendor } => {
                    stage
                        .reverse_credit(self.store.as_ref(), &vendor, number)
                        .await?;
                }
            }
        }
        stage.batch.order = Some(order);
        self.finish(stage).await
    }

    async fn require_wallet(&self, vendor: &VendorId) -> Result<VendorWallet> {
        self.store
            .get_wallet(vendor)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("wallet for vendor {vendor}")))
    }

    async fn finish(&self, stage: Stage) -> Result<()> {
        let Stage {
            wallets,
            mut batch,
            notifications,
            ..
        } = stage;
        batch.wallets = wallets.into_values().filter(|w| w.touched).map(|w| w.wallet).collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.store.commit(batch).await?;
        for notification in notifications {
            self.notifier.notify(notification);
        }
        Ok(())
    }
}

fn non_negative(amount: Decimal) -> Result<Option<Amount>> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::ValidationError(format!(
            "amount must not be negative, got {amount}"
        )));
    }
    Ok(Amount::new(amount).ok())
}

struct StagedWallet {
    wallet: VendorWallet,
    log: Vec<WalletTransaction>,
    touched: bool,
}

/// Uncommitted changes of one ledger operation.
struct Stage {
    now: DateTime<Utc>,
    wallets: HashMap<VendorId, StagedWallet>,
    batch: LedgerBatch,
    notifications: Vec<Notification>,
}

impl Stage {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            wallets: HashMap::new(),
            batch: LedgerBatch::default(),
            notifications: Vec::new(),
        }
    }

    /// Loads the vendor's wallet and log once per stage. With `create`, a
    /// missing wallet starts at zero.
    async fn load(
        &mut self,
        store: &dyn crate::domain::ports::LedgerStore,
        vendor: &VendorId,
        create: bool,
    ) -> Result<Option<&mut StagedWallet>> {
        if !self.wallets.contains_key(vendor) {
            let wallet = match store.get_wallet(vendor).await? {
                Some(wallet) => wallet,
                None if create => VendorWallet::new(vendor.clone(), self.now),
                None => return Ok(None),
            };
            let log = store.transactions(vendor).await?;
            self.wallets.insert(
                vendor.clone(),
                StagedWallet {
                    wallet,
                    log,
                    touched: false,
                },
            );
        }
        Ok(self.wallets.get_mut(vendor))
    }

    fn entry(
        &self,
        staged: &StagedWallet,
        kind: TransactionKind,
        status: TransactionStatus,
        order: Option<OrderNumber>,
        amount: Decimal,
        applied: Decimal,
        description: &str,
    ) -> WalletTransaction {
        WalletTransaction {
            id: Uuid::new_v4(),
            vendor: staged.wallet.vendor.clone(),
            order,
            amount,
            applied,
            kind,
            status,
            balance_after: staged.wallet.snapshot(),
            description: description.to_string(),
            payout: None,
            created_at: self.now,
            completed_at: (status == TransactionStatus::Completed).then_some(self.now),
        }
    }

    fn record(&mut self, vendor: &VendorId, tx: WalletTransaction, notification: Notification) {
        if let Some(staged) = self.wallets.get_mut(vendor) {
            staged.wallet.updated_at = self.now;
            staged.touched = true;
            staged.log.push(tx.clone());
        }
        self.batch.appends.push(tx);
        self.notifications.push(notification);
    }

    async fn credit(
        &mut self,
        store: &dyn crate::domain::ports::LedgerStore,
        vendor: &VendorId,
        amount: Amount,
        order: Option<OrderNumber>,
        description: &str,
    ) -> Result<WalletTransaction> {
        let Some(staged) = self.load(store, vendor, true).await? else {
            return Err(LedgerError::NotFound(format!("wallet for vendor {vendor}")));
        };
        staged.wallet.credit(amount);
        let tx = self.entry(
            &self.wallets[vendor],
            TransactionKind::Credit,
            TransactionStatus::Pending,
            order,
            amount.value(),
            amount.value(),
            description,
        );
        info!(vendor = %vendor, amount = %amount, "pending credit posted");
        let note = Notification::vendor(
            NotificationKind::WalletCredited,
            vendor.clone(),
            amount.value(),
            description,
        );
        self.record(vendor, tx.clone(), note);
        Ok(tx)
    }

    async fn release(
        &mut self,
        store: &dyn crate::domain::ports::LedgerStore,
        vendor: &VendorId,
        requested: Option<Balance>,
        order: OrderNumber,
    ) -> Result<ReleaseOutcome> {
        let now = self.now;
        let Some(staged) = self.load(store, vendor, false).await? else {
            return Ok(ReleaseOutcome::NoPendingCredit);
        };
        if was_reversed(&staged.log, order) {
            return Ok(ReleaseOutcome::CreditReversed);
        }
        let Some(idx) = staged.log.iter().position(|tx| tx.is_pending_credit_for(order)) else {
            let released = staged.log.iter().any(|tx| {
                tx.kind == TransactionKind::Credit
                    && tx.order == Some(order)
                    && tx.status == TransactionStatus::Completed
            });
            return Ok(if released {
                ReleaseOutcome::AlreadyReleased
            } else {
                ReleaseOutcome::NoPendingCredit
            });
        };

        let credited = Balance::new(staged.log[idx].applied);
        let cap = requested.map_or(credited, |amount| amount.min(credited));
        let moved = staged.wallet.release(cap);
        staged.wallet.updated_at = now;
        staged.touched = true;
        let credit = &mut staged.log[idx];
        credit.status = TransactionStatus::Completed;
        credit.balance_after = staged.wallet.snapshot();
        credit.completed_at = Some(now);
        let completed = credit.clone();

        info!(vendor = %vendor, order = %order, moved = %moved, "pending credit released");
        self.batch.completions.push(completed.clone());
        self.notifications.push(Notification::vendor(
            NotificationKind::WalletReleased,
            vendor.clone(),
            moved.value(),
            format!("Revenue for order {order} is now available"),
        ));
        Ok(ReleaseOutcome::Released {
            moved,
            transaction: completed,
        })
    }

    async fn debit(
        &mut self,
        store: &dyn crate::domain::ports::LedgerStore,
        vendor: &VendorId,
        amount: Amount,
        order: Option<OrderNumber>,
        description: &str,
    ) -> Result<WalletTransaction> {
        let Some(staged) = self.load(store, vendor, false).await? else {
            return Err(LedgerError::NotFound(format!("wallet for vendor {vendor}")));
        };
        let removed = staged.wallet.debit(amount);
        let tx = self.entry(
            &self.wallets[vendor],
            TransactionKind::RefundDebit,
            TransactionStatus::Completed,
            order,
            amount.value(),
            removed.value(),
            description,
        );
        info!(vendor = %vendor, requested = %amount, removed = %removed, "refund debit posted");
        let note = Notification::vendor(
            NotificationKind::WalletDebited,
            vendor.clone(),
            amount.value(),
            description,
        );
        self.record(vendor, tx.clone(), note);
        Ok(tx)
    }

    async fn reverse_credit(
        &mut self,
        store: &dyn crate::domain::ports::LedgerStore,
        vendor: &VendorId,
        order: OrderNumber,
    ) -> Result<Option<WalletTransaction>> {
        let Some(staged) = self.load(store, vendor, false).await? else {
            return Ok(None);
        };
        if was_reversed(&staged.log, order) {
            return Ok(None);
        }
        let Some(credit) = staged.log.iter().find(|tx| tx.is_pending_credit_for(order)) else {
            return Ok(None);
        };
        let amount = Amount::new(credit.amount)?;
        let description = format!("Order {order} cancelled");
        self.debit(store, vendor, amount, Some(order), &description)
            .await
            .map(Some)
    }

    async fn withdraw(
        &mut self,
        store: &dyn crate::domain::ports::LedgerStore,
        vendor: &VendorId,
        amount: Amount,
        destination: PayoutDestination,
    ) -> Result<WalletTransaction> {
        let Some(staged) = self.load(store, vendor, false).await? else {
            return Err(LedgerError::NotFound(format!("wallet for vendor {vendor}")));
        };
        staged.wallet.withdraw(amount)?;
        let mut tx = self.entry(
            &self.wallets[vendor],
            TransactionKind::Withdrawal,
            TransactionStatus::Pending,
            None,
            amount.value(),
            amount.value(),
            "Withdrawal requested",
        );
        tx.payout = Some(destination);
        info!(vendor = %vendor, amount = %amount, "withdrawal requested");
        let note = Notification::vendor(
            NotificationKind::WithdrawalRequested,
            vendor.clone(),
            amount.value(),
            "Withdrawal requested",
        );
        self.record(vendor, tx.clone(), note);
        Ok(tx)
    }
}

fn was_reversed(log: &[WalletTransaction], order: OrderNumber) -> bool {
    log.iter()
        .any(|tx| tx.kind == TransactionKind::RefundDebit && tx.order == Some(order))
}

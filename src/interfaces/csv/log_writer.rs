use crate::domain::transaction::{TransactionKind, TransactionStatus, WalletTransaction};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct LogRow<'a> {
    id: Uuid,
    vendor: &'a str,
    order: Option<u64>,
    kind: TransactionKind,
    status: TransactionStatus,
    amount: Decimal,
    applied: Decimal,
    available_after: Decimal,
    pending_after: Decimal,
    description: &'a str,
    created_at: DateTime<Utc>,
}

/// Exports wallet transaction logs as CSV, one row per entry.
pub struct LogWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LogWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_log(&mut self, log: &[WalletTransaction]) -> Result<()> {
        for tx in log {
            self.writer.serialize(LogRow {
                id: tx.id,
                vendor: tx.vendor.as_str(),
                order: tx.order.map(|n| n.0),
                kind: tx.kind,
                status: tx.status,
                amount: tx.amount.normalize(),
                applied: tx.applied.normalize(),
                available_after: tx.balance_after.available.value().normalize(),
                pending_after: tx.balance_after.pending.value().normalize(),
                description: &tx.description,
                created_at: tx.created_at,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

use crate::domain::wallet::VendorWallet;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct WalletRow<'a> {
    vendor: &'a str,
    available: Decimal,
    pending: Decimal,
    lifetime_earned: Decimal,
    lifetime_withdrawn: Decimal,
}

/// Writes final wallet balances as CSV with a header row.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_wallets(&mut self, wallets: &[VendorWallet]) -> Result<()> {
        for wallet in wallets {
            self.writer.serialize(WalletRow {
                vendor: wallet.vendor.as_str(),
                available: wallet.available.value().normalize(),
                pending: wallet.pending.value().normalize(),
                lifetime_earned: wallet.lifetime_earned.value().normalize(),
                lifetime_withdrawn: wallet.lifetime_withdrawn.value().normalize(),
            })?;
        }
        if wallets.is_empty() {
            self.writer.write_record([
                "vendor",
                "available",
                "pending",
                "lifetime_earned",
                "lifetime_withdrawn",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

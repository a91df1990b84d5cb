use crate::domain::split::RevenueShare;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Platform policy values the core needs at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Smallest withdrawal a vendor may request.
    pub min_withdrawal: Decimal,
    /// Platform commission taken from each vendor's gross, in `[0, 1]`.
    pub commission_rate: Decimal,
    /// Capacity of the notification queue.
    pub notification_buffer: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_withdrawal: dec!(100),
            commission_rate: Decimal::ZERO,
            notification_buffer: 1024,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_withdrawal < Decimal::ZERO {
            return Err(LedgerError::ValidationError(format!(
                "minimum withdrawal must not be negative, got {}",
                self.min_withdrawal
            )));
        }
        self.revenue_share().map(|_| ())
    }

    pub fn revenue_share(&self) -> Result<RevenueShare> {
        RevenueShare::new(self.commission_rate)
    }
}

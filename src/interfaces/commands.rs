use crate::application::orders::{NewOrder, OrderService};
use crate::domain::lifecycle::TransitionExtra;
use crate::domain::order::{OrderNumber, OrderStatus, Principal, VendorId};
use crate::domain::transaction::PayoutDestination;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::BufRead;

/// One line of a command file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    PlaceOrder(NewOrder),
    Transition {
        order: OrderNumber,
        status: OrderStatus,
        actor: Principal,
        #[serde(default)]
        extra: TransitionExtra,
    },
    Credit {
        vendor: VendorId,
        amount: Decimal,
        #[serde(default)]
        order: Option<OrderNumber>,
        #[serde(default)]
        description: String,
    },
    Release {
        vendor: VendorId,
        amount: Decimal,
        order: OrderNumber,
    },
    Debit {
        vendor: VendorId,
        amount: Decimal,
        #[serde(default)]
        order: Option<OrderNumber>,
        #[serde(default)]
        description: String,
    },
    Withdraw {
        vendor: VendorId,
        amount: Decimal,
        destination: PayoutDestination,
    },
}

impl Command {
    /// Runs the command and returns a one-line summary of what happened.
    pub async fn execute(self, service: &OrderService) -> Result<String> {
        let ledger = service.ledger();
        match self {
            Command::PlaceOrder(new_order) => {
                let order = service.place_order(new_order).await?;
                Ok(format!("placed {} total {}", order.number, order.totals.total))
            }
            Command::Transition {
                order,
                status,
                actor,
                extra,
            } => {
                let order = service.transition(order, status, &actor, extra).await?;
                Ok(format!("{} -> {}", order.number, order.status))
            }
            Command::Credit {
                vendor,
                amount,
                order,
                description,
            } => match ledger.credit(&vendor, amount, order, &description).await? {
                Some(tx) => Ok(format!("credited {} to {vendor}", tx.amount)),
                None => Ok(format!("zero credit for {vendor} skipped")),
            },
            Command::Release {
                vendor,
                amount,
                order,
            } => {
                let outcome = ledger.release(&vendor, amount, order).await?;
                Ok(format!("release {order} for {vendor}: {outcome:?}"))
            }
            Command::Debit {
                vendor,
                amount,
                order,
                description,
            } => {
                let tx = ledger.debit(&vendor, amount, order, &description).await?;
                Ok(format!("debited {} from {vendor} ({} applied)", tx.amount, tx.applied))
            }
            Command::Withdraw {
                vendor,
                amount,
                destination,
            } => {
                let tx = ledger.request_withdrawal(&vendor, amount, destination).await?;
                Ok(format!("withdrawal {} of {} pending", tx.id, tx.amount))
            }
        }
    }
}

/// Reads commands from a JSON Lines source, one per line. Blank lines and
/// lines starting with `#` are skipped.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses commands, yielding `(line number, result)`.
    pub fn commands(self) -> impl Iterator<Item = (usize, Result<Command>)> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let line_no = idx + 1;
                match line {
                    Ok(line) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() || trimmed.starts_with('#') {
                            None
                        } else {
                            Some((line_no, parse(trimmed)))
                        }
                    }
                    Err(err) => Some((line_no, Err(LedgerError::from(err)))),
                }
            })
    }
}

fn parse(line: &str) -> Result<Command> {
    serde_json::from_str(line)
        .map_err(|err| LedgerError::ValidationError(format!("malformed command: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{ActorRole, PaymentMethod};
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_parses_commands_and_skips_comments() {
        let data = r#"
# seed
{"op":"place_order","customer":"c1","payment_method":"upi","payment_reference":"pay_1","items":[{"product":"p1","vendor":"v1","unit_price":"200","quantity":2}]}
{"op":"transition","order":1,"status":"shipped","actor":{"id":"v1","role":"vendor"},"extra":{"delivery_payment":"40","estimated_delivery_minutes":30}}
{"op":"withdraw","vendor":"v1","amount":150,"destination":{"type":"upi","vpa":"v1@bank"}}
"#;
        let results: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();
        assert_eq!(results.len(), 3);

        let (line, first) = &results[0];
        assert_eq!(*line, 3);
        let Ok(Command::PlaceOrder(order)) = first else {
            panic!("expected place_order, got {first:?}");
        };
        assert_eq!(order.payment_method, PaymentMethod::Upi);
        assert_eq!(order.items[0].line_total().unwrap(), dec!(400));

        let Ok(Command::Transition { actor, extra, status, .. }) = &results[1].1 else {
            panic!("expected transition");
        };
        assert_eq!(actor.role, ActorRole::Vendor);
        assert_eq!(*status, OrderStatus::Shipped);
        assert_eq!(extra.delivery_payment, Some(dec!(40)));

        assert!(matches!(results[2].1, Ok(Command::Withdraw { .. })));
    }

    #[test]
    fn test_reader_reports_malformed_line() {
        let data = "{\"op\":\"teleport\",\"order\":1}\n";
        let results: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, Err(LedgerError::ValidationError(_))));
    }
}

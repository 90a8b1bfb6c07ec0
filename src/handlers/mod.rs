//! Command Handlers module
//!
//! CQRS Command handlers that orchestrate business operations.
//! Each handler coordinates aggregates, event store, and projections.

mod bulk_handler;
mod cash_handler;
mod commands;
mod initiate_remittance_handler;
mod pay_remittance_handler;
mod provision_handler;
mod settle_remittance_handler;
mod teller_handler;


pub use bulk_handler::BulkCashHandler;
pub use cash_handler::{CashInHandler, CashOutHandler};
pub use commands::*;
pub use initiate_remittance_handler::InitiateRemittanceHandler;
pub use pay_remittance_handler::PayRemittanceHandler;
pub use provision_handler::ProvisionTillHandler;
pub use settle_remittance_handler::{RejectRemittanceHandler, WithdrawRemittanceHandler};
pub use teller_handler::{CloseTellerHandler, OpenTellerHandler};

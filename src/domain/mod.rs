//! Domain module
//!
//! Core domain types and business logic.

pub mod cash;
pub mod commission;
pub mod context;
pub mod error;
pub mod events;
pub mod money;
pub mod status;

pub use cash::{CashDrawer, Denomination};
pub use commission::{CommissionShares, CommissionSplit};
pub use context::OperationContext;
pub use error::DomainError;
pub use events::{PostingFailureReason, RemittanceEvent, TellerEvent};
pub use money::{Amount, AmountError};
pub use status::RemittanceStatus;

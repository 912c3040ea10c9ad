//! Command Handlers module
//!
//! Handlers run the balance transfer protocol against a `LedgerStore`:
//! validate, replay by idempotency key, load, compute, then commit with
//! optimistic concurrency.

mod commands;
mod deposit_handler;
mod protocol;
mod transfer_handler;
mod withdraw_handler;


pub use commands::*;
pub use deposit_handler::DepositHandler;
pub use transfer_handler::TransferHandler;
pub use withdraw_handler::WithdrawHandler;

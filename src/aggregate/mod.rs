//! Aggregate module
//!
//! Account balance aggregate and its compare-and-swap updates.

pub mod account;

pub use account::{AccountBalance, BalanceUpdate};

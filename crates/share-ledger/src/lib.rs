// share-ledger/src/lib.rs

//! Rebasing share ledger for the vault's principal token
//!
//! Balances are a projection of an internal share count onto the current
//! total supply, so injecting yield (a "rebase") inflates every holder's
//! balance proportionally without touching shares. Two rebase modes are
//! supported:
//! - instant: supply jumps immediately (streaming yield distribution)
//! - linear: supply ramps up over a duration, read-resolved to any instant

pub mod ledger;

pub use ledger::{RebaseRamp, ShareLedger};

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur in share-ledger operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Balance exceeded")]
    InsufficientBalance,

    #[error("Shares exceeded")]
    InsufficientShares,

    #[error("Allowance exceeded")]
    InsufficientAllowance,

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

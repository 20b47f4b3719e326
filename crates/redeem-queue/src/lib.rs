// redeem-queue/src/lib.rs

//! Per-epoch redemption queue for principal tokens
//!
//! Holders park principal tokens here to redeem them for the underlying
//! asset at epoch settlement. The queue holds the tokens in the share
//! ledger under its own synthetic address and tracks depositors with
//! internal queue shares, so direct donations to the queue address cannot
//! steal from queued holders. After settlement the queue becomes a fixed
//! pro-rata claim on the asset it received.

pub mod queue;

pub use queue::{ClaimOutcome, ExitOutcome, RedemptionQueue};

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur in redemption queue operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Cannot redeem 0")]
    CannotRedeemZero,

    #[error("Cannot withdraw 0")]
    CannotWithdrawZero,

    #[error("Insufficient redeeming balance")]
    InsufficientRedeemingBalance,

    #[error("Already settled")]
    AlreadySettled,

    #[error("Not settled")]
    NotSettled,

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error(transparent)]
    Ledger(#[from] share_ledger::LedgerError),
}

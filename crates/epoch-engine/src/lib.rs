// epoch-engine/src/lib.rs

//! Epoch lifecycle and yield pricing for the principal vault
//!
//! The vault splits a yield-bearing deposit into a rebasing principal
//! token (the share ledger) and per-epoch yield rights. Buyers swap the
//! underlying asset for yield rights at a price set by the epoch's
//! pricing model; swap proceeds rebase the principal token so holders
//! accrue the yield that was sold. Each epoch carries its own redemption
//! queue, settled at par when the epoch ends.

pub mod collaborators;
pub mod epoch;
pub mod params;
pub mod pricing;
pub mod vault;

pub use collaborators::{
    BribesPool, CollaboratorError, InMemoryStakingPool, RecordingBribesPool, SwapNotice,
    YieldSource,
};
pub use epoch::{Epoch, EpochInfo};
pub use params::{ParamStore, StaticParams, VaultParams};
pub use pricing::{PricingModel, SwapQuote, SwapState};
pub use vault::Vault;

pub use redeem_queue::{ClaimOutcome, ExitOutcome};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in epoch-engine operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Vault is closed")]
    VaultClosed,

    #[error("Vault is not closed")]
    VaultNotClosed,

    #[error("Not the owner")]
    NotOwner,

    #[error("No epochs yet")]
    NoEpochsYet,

    #[error("Invalid epoch id")]
    InvalidEpochId,

    #[error("Out of bounds")]
    OutOfBounds,

    #[error("No principal token minted yet")]
    NoPrincipalMinted,

    #[error("Epoch not ended yet")]
    EpochNotEnded,

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Calculation error: {0}")]
    Calculation(String),

    #[error("Yield source error: {0}")]
    YieldSource(String),

    #[error("Bribes pool error: {0}")]
    BribesPool(String),

    #[error(transparent)]
    Ledger(#[from] share_ledger::LedgerError),

    #[error(transparent)]
    Queue(#[from] redeem_queue::QueueError),
}

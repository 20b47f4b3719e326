// vault-core/src/lib.rs

//! Core primitives shared by the principal-vault crates
//!
//! This crate provides:
//! - Account addresses and identifiers
//! - Arbitrary-precision token amounts
//! - Fixed-point rates at the protocol settings scale (1e10)
//! - Exact integer mul-div helpers used by share and pricing math

pub mod types;
pub mod math;

pub use types::{Address, Amount, EpochId, Rate, Timestamp, RATE_SCALE};
pub use math::{mul_div, square};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core primitives
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),
}

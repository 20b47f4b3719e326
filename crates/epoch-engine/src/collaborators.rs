// epoch-engine/src/collaborators.rs

//! External collaborators the vault calls out to.
//!
//! The yield source custodies the underlying asset (a staking pool in
//! the reference deployment); the bribe pools track yield-rights
//! positions for reward distribution. Both are trait objects owned by
//! the vault and cannot call back into it, so every vault operation
//! makes its collaborator calls before committing ledger state.

use std::sync::{Arc, Mutex};
use vault_core::{Address, Amount, EpochId, Timestamp};

/// Result type for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Opaque failure from an external collaborator
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// Custodian of the underlying asset
pub trait YieldSource {
    fn stake(&mut self, amount: &Amount) -> CollaboratorResult<()>;
    fn withdraw(&mut self, amount: &Amount) -> CollaboratorResult<()>;
    fn staked_balance(&self) -> Amount;
}

/// Reward pool notified of yield-rights activity
pub trait BribesPool {
    fn notify_yield_swapped(
        &mut self,
        epoch_id: EpochId,
        account: Address,
        amount: &Amount,
        now: Timestamp,
    ) -> CollaboratorResult<()>;

    fn on_epoch_ended(&mut self, epoch_id: EpochId, now: Timestamp) -> CollaboratorResult<()>;
}

/// Yield source holding the asset in memory, for tests and simulation
#[derive(Debug, Default)]
pub struct InMemoryStakingPool {
    balance: Amount,
}

impl InMemoryStakingPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl YieldSource for InMemoryStakingPool {
    fn stake(&mut self, amount: &Amount) -> CollaboratorResult<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| CollaboratorError("Stake overflow".into()))?;
        Ok(())
    }

    fn withdraw(&mut self, amount: &Amount) -> CollaboratorResult<()> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| CollaboratorError("Insufficient staked balance".into()))?;
        Ok(())
    }

    fn staked_balance(&self) -> Amount {
        self.balance.clone()
    }
}

/// A swap notification a bribes pool received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapNotice {
    pub epoch_id: EpochId,
    pub account: Address,
    pub amount: Amount,
    pub timestamp: Timestamp,
}

/// Bribes pool that records every notification. Cloning shares the
/// record buffers, so tests keep a handle while the vault owns the pool.
#[derive(Debug, Clone, Default)]
pub struct RecordingBribesPool {
    swaps: Arc<Mutex<Vec<SwapNotice>>>,
    ended_epochs: Arc<Mutex<Vec<(EpochId, Timestamp)>>>,
}

impl RecordingBribesPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swaps(&self) -> Vec<SwapNotice> {
        self.swaps.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn ended_epochs(&self) -> Vec<(EpochId, Timestamp)> {
        self.ended_epochs
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl BribesPool for RecordingBribesPool {
    fn notify_yield_swapped(
        &mut self,
        epoch_id: EpochId,
        account: Address,
        amount: &Amount,
        now: Timestamp,
    ) -> CollaboratorResult<()> {
        self.swaps
            .lock()
            .map_err(|_| CollaboratorError("Record lock poisoned".into()))?
            .push(SwapNotice {
                epoch_id,
                account,
                amount: amount.clone(),
                timestamp: now,
            });
        Ok(())
    }

    fn on_epoch_ended(&mut self, epoch_id: EpochId, now: Timestamp) -> CollaboratorResult<()> {
        self.ended_epochs
            .lock()
            .map_err(|_| CollaboratorError("Record lock poisoned".into()))?
            .push((epoch_id, now));
        Ok(())
    }
}

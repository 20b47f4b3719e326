// epoch-engine/src/epoch.rs

use crate::pricing::SwapState;
use crate::{EngineError, EngineResult};
use redeem_queue::RedemptionQueue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vault_core::{Address, Amount, EpochId, Timestamp};

/// Snapshot of an epoch's identity, for queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub id: EpochId,
    pub start_time: Timestamp,
    pub duration: u64,
    pub redeem_queue_address: Address,
}

/// One yield epoch.
///
/// Yield rights minted at epoch open sit in the vault's own account (the
/// unclaimed bucket) and move to buyers as swaps execute. The map plus
/// `yield_rights_total` satisfy the conservation invariant: the sum of
/// all entries equals the total at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epoch {
    id: EpochId,
    start_time: Timestamp,
    duration: u64,
    swap_state: SwapState,
    yield_rights: HashMap<Address, Amount>,
    yield_rights_total: Amount,
    redeem_queue: RedemptionQueue,
}

impl Epoch {
    pub fn open(
        id: EpochId,
        vault: &Address,
        start_time: Timestamp,
        duration: u64,
        swap_state: SwapState,
        decimals_offset: u8,
    ) -> Self {
        Self {
            id,
            start_time,
            duration,
            swap_state,
            yield_rights: HashMap::new(),
            yield_rights_total: Amount::zero(),
            redeem_queue: RedemptionQueue::new(vault, id, decimals_offset),
        }
    }

    pub fn id(&self) -> EpochId {
        self.id
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn end_time(&self) -> Timestamp {
        self.start_time + self.duration
    }

    pub fn has_ended(&self, now: Timestamp) -> bool {
        now >= self.end_time()
    }

    /// Cut the epoch short at `now` (vault close)
    pub fn truncate(&mut self, now: Timestamp) {
        if now < self.end_time() {
            self.duration = now.saturating_sub(self.start_time);
        }
    }

    pub fn info(&self) -> EpochInfo {
        EpochInfo {
            id: self.id,
            start_time: self.start_time,
            duration: self.duration,
            redeem_queue_address: self.redeem_queue.address(),
        }
    }

    pub fn swap_state(&self) -> &SwapState {
        &self.swap_state
    }

    pub fn swap_state_mut(&mut self) -> &mut SwapState {
        &mut self.swap_state
    }

    pub fn queue(&self) -> &RedemptionQueue {
        &self.redeem_queue
    }

    pub fn queue_mut(&mut self) -> &mut RedemptionQueue {
        &mut self.redeem_queue
    }

    pub fn yield_rights_of(&self, account: &Address) -> Amount {
        self.yield_rights
            .get(account)
            .cloned()
            .unwrap_or_else(Amount::zero)
    }

    pub fn yield_rights_total(&self) -> Amount {
        self.yield_rights_total.clone()
    }

    /// Mint new yield rights to `account`
    pub fn credit_yield_rights(&mut self, account: Address, amount: Amount) -> EngineResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.yield_rights_total = self
            .yield_rights_total
            .checked_add(&amount)
            .ok_or_else(|| EngineError::Calculation("Yield rights overflow".into()))?;
        let entry = self
            .yield_rights
            .entry(account)
            .or_insert_with(Amount::zero);
        *entry = entry
            .checked_add(&amount)
            .ok_or_else(|| EngineError::Calculation("Yield rights overflow".into()))?;
        Ok(())
    }

    /// Move yield rights between accounts, capped at the sender's
    /// balance. Returns the amount actually moved.
    pub fn move_yield_rights(
        &mut self,
        from: &Address,
        to: &Address,
        amount: &Amount,
    ) -> EngineResult<Amount> {
        let moved = amount.min_of(&self.yield_rights_of(from));
        if moved.is_zero() {
            return Ok(moved);
        }

        let debited = self
            .yield_rights_of(from)
            .checked_sub(&moved)
            .ok_or_else(|| EngineError::Calculation("Yield rights underflow".into()))?;
        if debited.is_zero() {
            self.yield_rights.remove(from);
        } else {
            self.yield_rights.insert(*from, debited);
        }

        let entry = self.yield_rights.entry(*to).or_insert_with(Amount::zero);
        *entry = entry
            .checked_add(&moved)
            .ok_or_else(|| EngineError::Calculation("Yield rights overflow".into()))?;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::VaultParams;
    use crate::pricing::PricingModel;

    const T0: Timestamp = 1_700_000_000;

    fn create_test_epoch() -> Epoch {
        let params = VaultParams::default();
        let state = SwapState::initialize(
            PricingModel::Decaying,
            &Amount::from_tokens(1000),
            &params,
            T0,
        );
        Epoch::open(1, &Address::new([0xFF; 20]), T0, params.epoch_duration, state, 8)
    }

    #[test]
    fn test_epoch_lifetime() {
        let mut epoch = create_test_epoch();
        assert!(!epoch.has_ended(T0));
        assert!(!epoch.has_ended(epoch.end_time() - 1));
        assert!(epoch.has_ended(epoch.end_time()));

        epoch.truncate(T0 + 100);
        assert_eq!(epoch.duration(), 100);
        assert!(epoch.has_ended(T0 + 100));

        // truncation never extends an already-ended epoch
        let end = epoch.end_time();
        epoch.truncate(T0 + 500);
        assert_eq!(epoch.end_time(), end);
    }

    #[test]
    fn test_yield_rights_conservation() {
        let mut epoch = create_test_epoch();
        let vault = Address::new([0xFF; 20]);
        let bob = Address::new([1; 20]);

        epoch
            .credit_yield_rights(vault, Amount::from_tokens(1000))
            .unwrap();
        let moved = epoch
            .move_yield_rights(&vault, &bob, &Amount::from_tokens(300))
            .unwrap();
        assert_eq!(moved, Amount::from_tokens(300));

        let sum = epoch
            .yield_rights_of(&vault)
            .checked_add(&epoch.yield_rights_of(&bob))
            .unwrap();
        assert_eq!(sum, epoch.yield_rights_total());
    }

    #[test]
    fn test_move_yield_rights_caps_at_balance() {
        let mut epoch = create_test_epoch();
        let vault = Address::new([0xFF; 20]);
        let bob = Address::new([1; 20]);

        epoch
            .credit_yield_rights(vault, Amount::from_tokens(10))
            .unwrap();
        let moved = epoch
            .move_yield_rights(&vault, &bob, &Amount::from_tokens(50))
            .unwrap();
        assert_eq!(moved, Amount::from_tokens(10));
        assert_eq!(epoch.yield_rights_of(&vault), Amount::zero());
    }
}

// redeem-queue/src/queue.rs

use crate::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use share_ledger::ShareLedger;
use std::collections::HashMap;
use vault_core::{Address, Amount, EpochId, Rate, Timestamp};

/// Result of a post-settlement claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// Asset paid to the claimant after the redemption fee
    pub net: Amount,
    /// Fee portion, owed to the treasury
    pub fee: Amount,
}

/// What `exit` did, depending on settlement state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Pre-settlement: the caller's entire queued balance was returned
    Withdrawn(Amount),
    /// Post-settlement: the caller's asset claim was paid out
    Claimed(ClaimOutcome),
}

/// Redemption queue for one epoch.
///
/// Queued principal lives in the share ledger under `self.address`;
/// depositors hold internal queue shares against it. Queue shares use the
/// same virtual-offset scheme as the ledger so a donor inflating the
/// queue's principal balance dilutes only themselves.
///
/// Settlement snapshots the queue share supply, burns the queued
/// principal, and records the asset received. From then on the queue is
/// frozen: only claims remain, and the pre-settlement views error with
/// `AlreadySettled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionQueue {
    address: Address,
    epoch_id: EpochId,
    user_shares: HashMap<Address, Amount>,
    total_shares: Amount,
    decimals_offset: u8,
    settled: bool,
    settled_asset_amount: Amount,
    settled_share_supply: Amount,
    asset_remaining: Amount,
}

impl RedemptionQueue {
    pub fn new(vault: &Address, epoch_id: EpochId, decimals_offset: u8) -> Self {
        Self {
            address: Address::derived(vault, 0xEE, epoch_id),
            epoch_id,
            user_shares: HashMap::new(),
            total_shares: Amount::zero(),
            decimals_offset,
            settled: false,
            settled_asset_amount: Amount::zero(),
            settled_share_supply: Amount::zero(),
            asset_remaining: Amount::zero(),
        }
    }

    /// Synthetic ledger address holding the queued principal
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn epoch_id(&self) -> EpochId {
        self.epoch_id
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Queue principal tokens for redemption at settlement. Returns the
    /// queue shares credited.
    pub fn redeem(
        &mut self,
        ledger: &mut ShareLedger,
        user: Address,
        amount: Amount,
        now: Timestamp,
    ) -> QueueResult<Amount> {
        if self.settled {
            return Err(QueueError::AlreadySettled);
        }
        if amount.is_zero() {
            return Err(QueueError::CannotRedeemZero);
        }

        // shares priced off the balance before this deposit lands
        let pool_balance = ledger.balance_of(&self.address, now);
        let shares = if self.total_shares.is_zero() {
            amount.scale_up(self.decimals_offset)
        } else {
            amount
                .mul_div(&self.total_shares, &pool_balance)
                .ok_or_else(|| QueueError::CalculationError("Queue balance is zero".into()))?
        };

        ledger.transfer(user, self.address, amount, now)?;

        self.total_shares = self
            .total_shares
            .checked_add(&shares)
            .ok_or_else(|| QueueError::CalculationError("Share overflow".into()))?;
        let entry = self.user_shares.entry(user).or_insert_with(Amount::zero);
        *entry = entry
            .checked_add(&shares)
            .ok_or_else(|| QueueError::CalculationError("Share overflow".into()))?;

        tracing::debug!(
            epoch_id = self.epoch_id,
            user = %user,
            amount = %shares,
            "Queued principal for redemption"
        );
        Ok(shares)
    }

    /// Take queued principal back out before settlement
    pub fn withdraw_redeem(
        &mut self,
        ledger: &mut ShareLedger,
        user: Address,
        amount: Amount,
        now: Timestamp,
    ) -> QueueResult<()> {
        if self.settled {
            return Err(QueueError::AlreadySettled);
        }
        if amount.is_zero() {
            return Err(QueueError::CannotWithdrawZero);
        }

        let balance = self.user_redeeming_balance(ledger, &user, now)?;
        if amount > balance {
            return Err(QueueError::InsufficientRedeemingBalance);
        }

        let pool_balance = ledger.balance_of(&self.address, now);
        let shares = if amount == balance {
            self.shares_of(&user)
        } else {
            amount
                .mul_div(&self.total_shares, &pool_balance)
                .ok_or_else(|| QueueError::CalculationError("Queue balance is zero".into()))?
        };

        self.debit_shares(&user, &shares)?;
        ledger.transfer(self.address, user, amount, now)?;
        Ok(())
    }

    /// Leave the queue: withdraw everything before settlement, or claim
    /// the asset payout after
    pub fn exit(
        &mut self,
        ledger: &mut ShareLedger,
        user: Address,
        redeem_fee: Rate,
        now: Timestamp,
    ) -> QueueResult<ExitOutcome> {
        if self.settled {
            return Ok(ExitOutcome::Claimed(self.claim_asset_token(user, redeem_fee)?));
        }
        let balance = self.user_redeeming_balance(ledger, &user, now)?;
        if balance.is_zero() {
            return Err(QueueError::CannotWithdrawZero);
        }
        self.withdraw_redeem(ledger, user, balance.clone(), now)?;
        Ok(ExitOutcome::Withdrawn(balance))
    }

    /// Settle the queue at epoch end: snapshot the share supply, burn the
    /// queued principal, and record `asset_amount` for pro-rata claims.
    pub fn settle(
        &mut self,
        ledger: &mut ShareLedger,
        asset_amount: Amount,
        now: Timestamp,
    ) -> QueueResult<()> {
        if self.settled {
            return Err(QueueError::AlreadySettled);
        }

        let queued = ledger.balance_of(&self.address, now);
        if !queued.is_zero() {
            ledger.burn(self.address, queued.clone(), now)?;
        }

        self.settled = true;
        self.settled_share_supply = self.total_shares.clone();
        self.settled_asset_amount = asset_amount.clone();
        self.asset_remaining = asset_amount.clone();

        tracing::info!(
            epoch_id = self.epoch_id,
            principal_burned = %queued,
            asset_amount = %asset_amount,
            "Redemption queue settled"
        );
        Ok(())
    }

    /// Pay out the caller's pro-rata asset claim, net of the redemption fee
    pub fn claim_asset_token(&mut self, user: Address, redeem_fee: Rate) -> QueueResult<ClaimOutcome> {
        if !self.settled {
            return Err(QueueError::NotSettled);
        }

        let earned = self.earned_asset_amount(&user)?;
        self.user_shares.remove(&user);
        if earned.is_zero() {
            return Ok(ClaimOutcome {
                net: Amount::zero(),
                fee: Amount::zero(),
            });
        }

        self.asset_remaining = self
            .asset_remaining
            .checked_sub(&earned)
            .ok_or_else(|| QueueError::CalculationError("Claim exceeds remaining asset".into()))?;

        let fee = redeem_fee.apply(&earned);
        let net = earned
            .checked_sub(&fee)
            .ok_or_else(|| QueueError::CalculationError("Fee exceeds payout".into()))?;
        Ok(ClaimOutcome { net, fee })
    }

    /// Gross asset claim for `user` (zero before settlement)
    pub fn earned_asset_amount(&self, user: &Address) -> QueueResult<Amount> {
        if !self.settled || self.settled_share_supply.is_zero() {
            return Ok(Amount::zero());
        }
        self.settled_asset_amount
            .mul_div(&self.shares_of(user), &self.settled_share_supply)
            .ok_or_else(|| QueueError::CalculationError("Share supply is zero".into()))
    }

    /// Principal `user` currently has queued. Errors once settled: the
    /// principal no longer exists, only the asset claim does.
    pub fn user_redeeming_balance(
        &self,
        ledger: &ShareLedger,
        user: &Address,
        now: Timestamp,
    ) -> QueueResult<Amount> {
        if self.settled {
            return Err(QueueError::AlreadySettled);
        }
        if self.total_shares.is_zero() {
            return Ok(Amount::zero());
        }
        ledger
            .balance_of(&self.address, now)
            .mul_div(&self.shares_of(user), &self.total_shares)
            .ok_or_else(|| QueueError::CalculationError("Share supply is zero".into()))
    }

    /// Total principal queued. Errors once settled, like
    /// `user_redeeming_balance`.
    pub fn total_redeeming_balance(
        &self,
        ledger: &ShareLedger,
        now: Timestamp,
    ) -> QueueResult<Amount> {
        if self.settled {
            return Err(QueueError::AlreadySettled);
        }
        Ok(ledger.balance_of(&self.address, now))
    }

    fn shares_of(&self, user: &Address) -> Amount {
        self.user_shares
            .get(user)
            .cloned()
            .unwrap_or_else(Amount::zero)
    }

    fn debit_shares(&mut self, user: &Address, shares: &Amount) -> QueueResult<()> {
        let entry = self
            .user_shares
            .get_mut(user)
            .ok_or(QueueError::InsufficientRedeemingBalance)?;
        *entry = entry
            .checked_sub(shares)
            .ok_or(QueueError::InsufficientRedeemingBalance)?;
        if entry.is_zero() {
            self.user_shares.remove(user);
        }
        self.total_shares = self
            .total_shares
            .checked_sub(shares)
            .ok_or(QueueError::InsufficientRedeemingBalance)?;
        Ok(())
    }
}

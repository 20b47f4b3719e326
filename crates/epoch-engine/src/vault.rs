// epoch-engine/src/vault.rs

//! The vault: deposits, swaps, epoch rollover, redemption, close.
//!
//! Every operation is ordered as validate → compute → fallible
//! collaborator calls → internal ledger commits. Collaborators cannot
//! call back into the vault, so a failed external call leaves every
//! ledger untouched.

use crate::collaborators::{BribesPool, YieldSource};
use crate::epoch::{Epoch, EpochInfo};
use crate::params::{ParamStore, VaultParams};
use crate::pricing::{SwapQuote, SwapState};
use crate::{EngineError, EngineResult};
use redeem_queue::{ExitOutcome, QueueError};
use share_ledger::{LedgerError, ShareLedger};
use vault_core::{Address, Amount, EpochId, Timestamp};

pub struct Vault {
    address: Address,
    owner: Address,
    treasury: Address,
    ledger: ShareLedger,
    epochs: Vec<Epoch>,
    closed: bool,
    /// Fees collected for the treasury, in asset units
    treasury_fees: Amount,
    yield_source: Box<dyn YieldSource>,
    params: Box<dyn ParamStore>,
    staking_bribes: Box<dyn BribesPool>,
    adhoc_bribes: Box<dyn BribesPool>,
}

impl Vault {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        owner: Address,
        treasury: Address,
        decimals_offset: u8,
        yield_source: Box<dyn YieldSource>,
        params: Box<dyn ParamStore>,
        staking_bribes: Box<dyn BribesPool>,
        adhoc_bribes: Box<dyn BribesPool>,
    ) -> EngineResult<Self> {
        params.current().validate()?;
        Ok(Self {
            address,
            owner,
            treasury,
            ledger: ShareLedger::new(decimals_offset),
            epochs: Vec::new(),
            closed: false,
            treasury_fees: Amount::zero(),
            yield_source,
            params,
            staking_bribes,
            adhoc_bribes,
        })
    }

    /// Deposit the underlying asset and mint principal 1:1.
    ///
    /// Starts a new epoch when none is open (or the open one has
    /// elapsed, settling it first); a mid-epoch deposit instead rescales
    /// the pricing curve and mints fresh yield rights to the unclaimed
    /// bucket.
    pub fn deposit(&mut self, user: Address, amount: Amount, now: Timestamp) -> EngineResult<()> {
        if self.closed {
            return Err(EngineError::VaultClosed);
        }
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let params = self.params.current().clone();

        self.settle_ended_epochs(now)?;

        // price the mid-epoch curve update before any state moves, so a
        // pricing failure leaves the ledgers untouched
        let vault_account = self.address;
        let mut rescaled = None;
        if let Some(epoch) = self.epochs.last() {
            if !epoch.has_ended(now) {
                let mut state = epoch.swap_state().clone();
                state.on_deposit(&amount)?;
                rescaled = Some(state);
            }
        }

        self.yield_source
            .stake(&amount)
            .map_err(|e| EngineError::YieldSource(e.to_string()))?;
        self.ledger.mint(user, amount.clone(), now)?;

        if let Some(state) = rescaled {
            if let Some(epoch) = self.epochs.last_mut() {
                *epoch.swap_state_mut() = state;
                epoch.credit_yield_rights(vault_account, amount.clone())?;
                tracing::debug!(
                    epoch_id = epoch.id(),
                    user = %user,
                    amount = %amount,
                    "Mid-epoch deposit"
                );
            }
            return Ok(());
        }
        self.open_epoch(now, &params)
    }

    /// Swap asset for this epoch's yield rights. Returns the rights
    /// granted (the quoted amount, capped at the unclaimed bucket).
    ///
    /// The fee goes to treasury accounting; the net amount is staked and
    /// rebased into principal holders.
    pub fn swap(&mut self, user: Address, amount: Amount, now: Timestamp) -> EngineResult<Amount> {
        if self.closed {
            return Err(EngineError::VaultClosed);
        }
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        if self.ledger.total_shares().is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        let params = self.params.current().clone();

        self.settle_ended_epochs(now)?;
        // settlement can burn the last principal; nothing would back a
        // new epoch then
        if self.ledger.total_shares().is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        if self.epochs.last().map(|e| e.has_ended(now)).unwrap_or(true) {
            self.open_epoch(now, &params)?;
        }

        let vault_account = self.address;
        let epoch = self.epochs.last().ok_or(EngineError::NoEpochsYet)?;
        let epoch_id = epoch.id();
        let quote = epoch.swap_state().quote(
            &amount,
            &params,
            epoch.start_time(),
            epoch.duration(),
            now,
        )?;
        let granted = quote
            .y_token_out
            .min_of(&epoch.yield_rights_of(&vault_account));

        let fee = params.swap_fee.apply(&amount);
        let net = amount
            .checked_sub(&fee)
            .ok_or_else(|| EngineError::Calculation("Fee exceeds swap amount".into()))?;

        if !net.is_zero() {
            self.yield_source
                .stake(&net)
                .map_err(|e| EngineError::YieldSource(e.to_string()))?;
        }
        self.staking_bribes
            .notify_yield_swapped(epoch_id, user, &granted, now)
            .map_err(|e| EngineError::BribesPool(e.to_string()))?;
        self.adhoc_bribes
            .notify_yield_swapped(epoch_id, user, &granted, now)
            .map_err(|e| EngineError::BribesPool(e.to_string()))?;

        self.treasury_fees = self
            .treasury_fees
            .checked_add(&fee)
            .ok_or_else(|| EngineError::Calculation("Fee overflow".into()))?;
        if !net.is_zero() {
            self.ledger.rebase(net.clone())?;
        }
        let epoch = self.epochs.last_mut().ok_or(EngineError::NoEpochsYet)?;
        epoch.move_yield_rights(&vault_account, &user, &granted)?;
        epoch.swap_state_mut().commit(&quote);

        tracing::info!(
            epoch_id,
            user = %user,
            amount = %amount,
            fee = %fee,
            granted = %granted,
            "Swapped asset for yield rights"
        );
        Ok(granted)
    }

    /// Preview a swap without committing. When the open epoch has
    /// elapsed, the quote is against the epoch a swap would open.
    pub fn calc_swap(&self, amount: Amount, now: Timestamp) -> EngineResult<SwapQuote> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        if self.ledger.total_shares().is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        let params = self.params.current().clone();

        if let Some(epoch) = self.epochs.last() {
            if !epoch.has_ended(now) {
                return epoch.swap_state().quote(
                    &amount,
                    &params,
                    epoch.start_time(),
                    epoch.duration(),
                    now,
                );
            }
        }
        let supply = self.post_settlement_supply(now)?;
        if supply.is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        let state = SwapState::initialize(params.pricing, &supply, &params, now);
        state.quote(&amount, &params, now, params.epoch_duration, now)
    }

    /// Yield rights still purchasable at the current price
    pub fn current_y(&self, now: Timestamp) -> EngineResult<Amount> {
        if self.ledger.total_shares().is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        let params = self.params.current().clone();

        if let Some(epoch) = self.epochs.last() {
            if !epoch.has_ended(now) {
                return Ok(epoch.swap_state().current_y(
                    &params,
                    epoch.start_time(),
                    epoch.duration(),
                    now,
                ));
            }
        }
        let supply = self.post_settlement_supply(now)?;
        if supply.is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        let state = SwapState::initialize(params.pricing, &supply, &params, now);
        Ok(state.current_y(&params, now, params.epoch_duration, now))
    }

    /// Direct redemption, only once the vault is closed: burns principal
    /// and pays the asset 1:1 less the redemption fee. Returns the net
    /// amount paid.
    pub fn redeem(&mut self, user: Address, amount: Amount, now: Timestamp) -> EngineResult<Amount> {
        if !self.closed {
            return Err(EngineError::VaultNotClosed);
        }
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        if amount > self.ledger.balance_of(&user, now) {
            return Err(LedgerError::InsufficientBalance.into());
        }
        let params = self.params.current().clone();

        let fee = params.redeem_fee.apply(&amount);
        let net = amount
            .checked_sub(&fee)
            .ok_or_else(|| EngineError::Calculation("Fee exceeds payout".into()))?;

        self.yield_source
            .withdraw(&amount)
            .map_err(|e| EngineError::YieldSource(e.to_string()))?;
        self.ledger.burn(user, amount.clone(), now)?;
        self.treasury_fees = self
            .treasury_fees
            .checked_add(&fee)
            .ok_or_else(|| EngineError::Calculation("Fee overflow".into()))?;

        tracing::info!(user = %user, amount = %amount, net = %net, "Redeemed principal");
        Ok(net)
    }

    /// Close the vault: truncate the open epoch at `now`, settle every
    /// outstanding redemption queue at par, and freeze deposits/swaps.
    /// Owner only.
    pub fn close(&mut self, caller: Address, now: Timestamp) -> EngineResult<()> {
        if caller != self.owner {
            return Err(EngineError::NotOwner);
        }
        if self.closed {
            return Err(EngineError::VaultClosed);
        }

        if let Some(epoch) = self.epochs.last_mut() {
            epoch.truncate(now);
        }
        self.settle_ended_epochs(now)?;
        self.ledger.flush_rebase();
        self.closed = true;

        tracing::info!(vault = %self.address, "Vault closed");
        Ok(())
    }

    /// Settle every elapsed epoch whose queue is still open. Safe to
    /// call repeatedly.
    pub fn settle_ended_epochs(&mut self, now: Timestamp) -> EngineResult<()> {
        for i in 0..self.epochs.len() {
            if !self.epochs[i].has_ended(now) || self.epochs[i].queue().is_settled() {
                continue;
            }
            self.settle_epoch_at(i, now)?;
        }
        Ok(())
    }

    /// Settle one epoch's queue by id. Fails `EpochNotEnded` while the
    /// epoch is still live and `AlreadySettled` on a repeat.
    pub fn settle_epoch(&mut self, epoch_id: EpochId, now: Timestamp) -> EngineResult<()> {
        let idx = self.epoch_index(epoch_id)?;
        if !self.epochs[idx].has_ended(now) {
            return Err(EngineError::EpochNotEnded);
        }
        if self.epochs[idx].queue().is_settled() {
            return Err(QueueError::AlreadySettled.into());
        }
        self.settle_epoch_at(idx, now)
    }

    /// Withdraw the queued principal's asset at par, burn the queued
    /// principal, and notify the bribe pools. Caller checks the epoch
    /// has ended and the queue is open.
    fn settle_epoch_at(&mut self, idx: usize, now: Timestamp) -> EngineResult<()> {
        let epoch_id = self.epochs[idx].id();
        let queued = self
            .ledger
            .balance_of(&self.epochs[idx].queue().address(), now);

        if !queued.is_zero() {
            self.yield_source
                .withdraw(&queued)
                .map_err(|e| EngineError::YieldSource(e.to_string()))?;
        }
        self.staking_bribes
            .on_epoch_ended(epoch_id, now)
            .map_err(|e| EngineError::BribesPool(e.to_string()))?;
        self.adhoc_bribes
            .on_epoch_ended(epoch_id, now)
            .map_err(|e| EngineError::BribesPool(e.to_string()))?;

        self.epochs[idx]
            .queue_mut()
            .settle(&mut self.ledger, queued, now)?;
        Ok(())
    }

    /// Queue principal for redemption at the current epoch's settlement.
    /// Rolls the epoch over first when the open one has elapsed.
    pub fn queue_redeem(
        &mut self,
        user: Address,
        amount: Amount,
        now: Timestamp,
    ) -> EngineResult<()> {
        if self.closed {
            return Err(EngineError::VaultClosed);
        }
        if self.ledger.total_shares().is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        let params = self.params.current().clone();

        self.settle_ended_epochs(now)?;
        if self.ledger.total_shares().is_zero() {
            return Err(EngineError::NoPrincipalMinted);
        }
        if self.epochs.last().map(|e| e.has_ended(now)).unwrap_or(true) {
            self.open_epoch(now, &params)?;
        }

        let idx = self.epochs.len() - 1;
        self.epochs[idx]
            .queue_mut()
            .redeem(&mut self.ledger, user, amount, now)?;
        Ok(())
    }

    /// Take queued principal back out of an epoch's unsettled queue
    pub fn withdraw_queue_redeem(
        &mut self,
        epoch_id: EpochId,
        user: Address,
        amount: Amount,
        now: Timestamp,
    ) -> EngineResult<()> {
        let idx = self.epoch_index(epoch_id)?;
        self.epochs[idx]
            .queue_mut()
            .withdraw_redeem(&mut self.ledger, user, amount, now)?;
        Ok(())
    }

    /// Leave an epoch's queue entirely: withdraw before settlement,
    /// claim after
    pub fn exit_queue(
        &mut self,
        epoch_id: EpochId,
        user: Address,
        now: Timestamp,
    ) -> EngineResult<ExitOutcome> {
        let params = self.params.current().clone();
        let idx = self.epoch_index(epoch_id)?;

        let outcome =
            self.epochs[idx]
                .queue_mut()
                .exit(&mut self.ledger, user, params.redeem_fee, now)?;
        if let ExitOutcome::Claimed(claim) = &outcome {
            self.treasury_fees = self
                .treasury_fees
                .checked_add(&claim.fee)
                .ok_or_else(|| EngineError::Calculation("Fee overflow".into()))?;
        }
        Ok(outcome)
    }

    /// Claim the asset owed from a settled queue. Returns the net payout.
    pub fn claim_queue_asset(&mut self, epoch_id: EpochId, user: Address) -> EngineResult<Amount> {
        let params = self.params.current().clone();
        let idx = self.epoch_index(epoch_id)?;

        let claim = self.epochs[idx]
            .queue_mut()
            .claim_asset_token(user, params.redeem_fee)?;
        self.treasury_fees = self
            .treasury_fees
            .checked_add(&claim.fee)
            .ok_or_else(|| EngineError::Calculation("Fee overflow".into()))?;
        Ok(claim.net)
    }

    pub fn earned_asset_amount(&self, epoch_id: EpochId, user: &Address) -> EngineResult<Amount> {
        let idx = self.epoch_index(epoch_id)?;
        Ok(self.epochs[idx].queue().earned_asset_amount(user)?)
    }

    pub fn user_redeeming_balance(
        &self,
        epoch_id: EpochId,
        user: &Address,
        now: Timestamp,
    ) -> EngineResult<Amount> {
        let idx = self.epoch_index(epoch_id)?;
        Ok(self.epochs[idx]
            .queue()
            .user_redeeming_balance(&self.ledger, user, now)?)
    }

    pub fn total_redeeming_balance(
        &self,
        epoch_id: EpochId,
        now: Timestamp,
    ) -> EngineResult<Amount> {
        let idx = self.epoch_index(epoch_id)?;
        Ok(self.epochs[idx]
            .queue()
            .total_redeeming_balance(&self.ledger, now)?)
    }

    pub fn epoch_id_count(&self) -> usize {
        self.epochs.len()
    }

    pub fn epoch_id_at(&self, index: usize) -> EngineResult<EpochId> {
        if index >= self.epochs.len() {
            return Err(EngineError::OutOfBounds);
        }
        Ok(self.epochs[index].id())
    }

    pub fn current_epoch_id(&self) -> EngineResult<EpochId> {
        self.epochs
            .last()
            .map(|e| e.id())
            .ok_or(EngineError::NoEpochsYet)
    }

    pub fn epoch_info_by_id(&self, epoch_id: EpochId) -> EngineResult<EpochInfo> {
        let idx = self.epoch_index(epoch_id)?;
        Ok(self.epochs[idx].info())
    }

    pub fn y_token_user_balance(
        &self,
        epoch_id: EpochId,
        account: &Address,
    ) -> EngineResult<Amount> {
        let idx = self.epoch_index(epoch_id)?;
        Ok(self.epochs[idx].yield_rights_of(account))
    }

    pub fn y_token_total_supply(&self, epoch_id: EpochId) -> EngineResult<Amount> {
        let idx = self.epoch_index(epoch_id)?;
        Ok(self.epochs[idx].yield_rights_total())
    }

    /// Asset under custody at the yield source
    pub fn asset_balance(&self) -> Amount {
        self.yield_source.staked_balance()
    }

    pub fn treasury_fees(&self) -> Amount {
        self.treasury_fees.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn ledger(&self) -> &ShareLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut ShareLedger {
        &mut self.ledger
    }

    /// Principal supply a rollover at `now` would leave backing the new
    /// epoch: the current supply net of still-queued principal, which
    /// settlement burns first
    fn post_settlement_supply(&self, now: Timestamp) -> EngineResult<Amount> {
        let mut supply = self.ledger.total_supply(now);
        for epoch in &self.epochs {
            if !epoch.queue().is_settled() {
                let queued = self.ledger.balance_of(&epoch.queue().address(), now);
                supply = supply
                    .checked_sub(&queued)
                    .ok_or_else(|| EngineError::Calculation("Queued exceeds supply".into()))?;
            }
        }
        Ok(supply)
    }

    fn epoch_index(&self, epoch_id: EpochId) -> EngineResult<usize> {
        if epoch_id == 0 || epoch_id as usize > self.epochs.len() {
            return Err(EngineError::InvalidEpochId);
        }
        Ok(epoch_id as usize - 1)
    }

    fn open_epoch(&mut self, now: Timestamp, params: &VaultParams) -> EngineResult<()> {
        let id = self.epochs.len() as EpochId + 1;
        let supply = self.ledger.total_supply(now);
        let state = SwapState::initialize(params.pricing, &supply, params, now);
        let mut epoch = Epoch::open(
            id,
            &self.address,
            now,
            params.epoch_duration,
            state,
            self.ledger.decimals_offset(),
        );
        epoch.credit_yield_rights(self.address, supply.clone())?;

        tracing::info!(epoch_id = id, principal = %supply, "Opened epoch");
        self.epochs.push(epoch);
        Ok(())
    }
}

// epoch-engine/src/pricing.rs

//! Yield-rights pricing.
//!
//! Two models share one quote contract: given an asset amount and the
//! current instant, produce the yield rights granted and the state the
//! epoch carries into the next swap.
//!
//! - `Decaying`: a bonding curve `X' = X·k0 / (k0 + X·n·(1 + Δt/dp)²)`
//!   where `Δt` is time since epoch start and `dp` the decay period.
//!   Yield gets cheaper as the epoch ages; `k0` is fixed at epoch open
//!   and only rescaled by mid-epoch deposits.
//! - `FloorCeilingElastic`: an implied APR that starts at the ceiling,
//!   relaxes toward the floor over time since the last swap, and is
//!   pushed back up by swap volume. Rights are the APR applied over the
//!   remaining epoch time.
//!
//! All arithmetic is exact: amounts in raw base units, `k0` at
//! `units² · 1e10`, rates at the 1e10 settings scale.

use crate::{EngineError, EngineResult, VaultParams};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use vault_core::{square, Amount, Timestamp, RATE_SCALE};

/// Seconds in a (non-leap) year, the APR time base
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Which curve an epoch prices yield rights with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingModel {
    Decaying,
    FloorCeilingElastic,
}

/// Result of pricing a swap: what the buyer gets and the state the
/// epoch moves to if the swap commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub x_after: Amount,
    pub y_token_out: Amount,
    pub rate_after_scaled: u128,
    pub timestamp: Timestamp,
}

/// Per-epoch pricing state, resolved to one model at epoch open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapState {
    model: PricingModel,
    /// Principal backing the curve, raw asset units
    next_swap_x: Amount,
    /// Curve invariant at `units² · 1e10` (decaying model only)
    next_swap_k0: Amount,
    last_swap_timestamp: Timestamp,
    /// Implied APR after the last swap, 1e10 scale (elastic model only)
    last_rate_scaled: u128,
}

impl SwapState {
    /// State for a freshly opened epoch backed by `principal`
    pub fn initialize(
        model: PricingModel,
        principal: &Amount,
        params: &VaultParams,
        epoch_start: Timestamp,
    ) -> Self {
        let k0 = match model {
            PricingModel::Decaying => {
                // k0 = X² · APRi · D / year, with APRi at the 1e10 scale
                let x = principal.inner();
                let scaled = square(x) * BigUint::from(params.initial_apr.scaled())
                    * BigUint::from(params.epoch_duration)
                    / BigUint::from(SECONDS_PER_YEAR);
                Amount::new(scaled)
            }
            PricingModel::FloorCeilingElastic => Amount::zero(),
        };
        Self {
            model,
            next_swap_x: principal.clone(),
            next_swap_k0: k0,
            last_swap_timestamp: epoch_start,
            last_rate_scaled: params.apr_ceiling.scaled(),
        }
    }

    pub fn model(&self) -> PricingModel {
        self.model
    }

    pub fn next_swap_x(&self) -> &Amount {
        &self.next_swap_x
    }

    pub fn next_swap_k0(&self) -> &Amount {
        &self.next_swap_k0
    }

    pub fn last_rate_scaled(&self) -> u128 {
        self.last_rate_scaled
    }

    /// Fold a mid-epoch deposit of `amount` into the curve.
    ///
    /// Decaying: `k0' = k0 · (X+a)² / X²` with `X` unchanged, so the
    /// implied rate rises in proportion to the new backing. Elastic: the
    /// backing itself grows.
    pub fn on_deposit(&mut self, amount: &Amount) -> EngineResult<()> {
        match self.model {
            PricingModel::Decaying => {
                let x = self.next_swap_x.inner();
                if x == &BigUint::from(0u64) {
                    return Err(EngineError::Calculation("Curve has no backing".into()));
                }
                let grown = x + amount.inner();
                let k0 = self.next_swap_k0.inner() * square(&grown) / square(x);
                self.next_swap_k0 = Amount::new(k0);
            }
            PricingModel::FloorCeilingElastic => {
                self.next_swap_x = self
                    .next_swap_x
                    .checked_add(amount)
                    .ok_or_else(|| EngineError::Calculation("Backing overflow".into()))?;
            }
        }
        Ok(())
    }

    /// Price a swap of `amount` asset at `now` without committing
    pub fn quote(
        &self,
        amount: &Amount,
        params: &VaultParams,
        epoch_start: Timestamp,
        epoch_duration: u64,
        now: Timestamp,
    ) -> EngineResult<SwapQuote> {
        match self.model {
            PricingModel::Decaying => self.quote_decaying(amount, params, epoch_start, now),
            PricingModel::FloorCeilingElastic => {
                self.quote_elastic(amount, params, epoch_start, epoch_duration, now)
            }
        }
    }

    /// Apply a previously computed quote
    pub fn commit(&mut self, quote: &SwapQuote) {
        match self.model {
            PricingModel::Decaying => {
                self.next_swap_x = quote.x_after.clone();
            }
            PricingModel::FloorCeilingElastic => {
                self.last_rate_scaled = quote.rate_after_scaled;
            }
        }
        self.last_swap_timestamp = quote.timestamp;
    }

    /// Yield rights still purchasable at the current price, for display
    pub fn current_y(
        &self,
        params: &VaultParams,
        epoch_start: Timestamp,
        epoch_duration: u64,
        now: Timestamp,
    ) -> Amount {
        match self.model {
            PricingModel::Decaying => {
                // Y = k0 · dp² / (X · (dp + Δt)² · 1e10)
                let x = self.next_swap_x.inner();
                if x == &BigUint::from(0u64) {
                    return Amount::zero();
                }
                let dp = BigUint::from(params.decay_period() as u128);
                let stretch =
                    BigUint::from((params.decay_period() + now.saturating_sub(epoch_start)) as u128);
                let numer = self.next_swap_k0.inner() * square(&dp);
                let denom = x * square(&stretch) * BigUint::from(RATE_SCALE);
                Amount::new(numer / denom)
            }
            PricingModel::FloorCeilingElastic => {
                let rate = self.relaxed_rate(params, now);
                let remaining = (epoch_start + epoch_duration).saturating_sub(now);
                let numer =
                    self.next_swap_x.inner() * BigUint::from(rate) * BigUint::from(remaining);
                Amount::new(numer / (BigUint::from(SECONDS_PER_YEAR) * BigUint::from(RATE_SCALE)))
            }
        }
    }

    fn quote_decaying(
        &self,
        amount: &Amount,
        params: &VaultParams,
        epoch_start: Timestamp,
        now: Timestamp,
    ) -> EngineResult<SwapQuote> {
        let x = self.next_swap_x.inner();
        let k0 = self.next_swap_k0.inner();
        let dt = now.saturating_sub(epoch_start);
        let dp = BigUint::from(params.decay_period() as u128);
        let stretch = BigUint::from((params.decay_period() + dt) as u128);

        // term = X · n · (dp + Δt)² · 1e10 / dp², same scale as k0
        let term =
            x * amount.inner() * square(&stretch) * BigUint::from(RATE_SCALE) / square(&dp);
        let denom = k0 + &term;
        if denom == BigUint::from(0u64) {
            return Err(EngineError::Calculation("Curve is empty".into()));
        }
        let x_after = x * k0 / &denom;
        let m = x - &x_after;

        Ok(SwapQuote {
            x_after: Amount::new(x_after),
            y_token_out: Amount::new(m),
            rate_after_scaled: self.last_rate_scaled,
            timestamp: now,
        })
    }

    fn quote_elastic(
        &self,
        amount: &Amount,
        params: &VaultParams,
        epoch_start: Timestamp,
        epoch_duration: u64,
        now: Timestamp,
    ) -> EngineResult<SwapQuote> {
        let x = self.next_swap_x.inner();
        if x == &BigUint::from(0u64) {
            return Err(EngineError::Calculation("Curve has no backing".into()));
        }
        let rate = self.relaxed_rate(params, now);

        // m = n · r · remaining / (year · 1e10)
        let remaining = (epoch_start + epoch_duration).saturating_sub(now);
        let m = amount.inner() * BigUint::from(rate) * BigUint::from(remaining)
            / (BigUint::from(SECONDS_PER_YEAR) * BigUint::from(RATE_SCALE));

        // volume pushes the rate up: r' = r · (X·1e10 + e1·n) / (X·1e10),
        // capped at the ceiling
        let scale = BigUint::from(RATE_SCALE);
        let base = x * &scale;
        let bump = &base + BigUint::from(params.rate_elasticity_up.scaled()) * amount.inner();
        let bumped = BigUint::from(rate) * &bump / &base;
        let ceiling = BigUint::from(params.apr_ceiling.scaled());
        let rate_after = if bumped > ceiling { ceiling } else { bumped }
            .to_u128()
            .ok_or_else(|| EngineError::Calculation("Rate out of range".into()))?;

        Ok(SwapQuote {
            x_after: self.next_swap_x.clone(),
            y_token_out: Amount::new(m),
            rate_after_scaled: rate_after,
            timestamp: now,
        })
    }

    /// Implied APR at `now`: the post-swap rate relaxed toward the floor
    /// with elasticity `e2` over time since the last swap
    fn relaxed_rate(&self, params: &VaultParams, now: Timestamp) -> u128 {
        let floor = params.apr_floor.scaled();
        let above = self.last_rate_scaled.saturating_sub(floor);
        if above == 0 {
            return floor;
        }
        let dts = now.saturating_sub(self.last_swap_timestamp) as u128;
        let anchor = params.decay_period() as u128 * RATE_SCALE;
        let denom = anchor + dts * params.rate_elasticity_down.scaled();
        floor + above * anchor / denom
    }
}

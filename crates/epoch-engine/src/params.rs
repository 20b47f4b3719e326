// epoch-engine/src/params.rs

//! Vault parameters and the store they are fetched from.
//!
//! Parameters are read at the start of every vault operation, never
//! cached across an epoch boundary, so a governance update takes effect
//! on the next operation without restarting the engine.

use crate::pricing::PricingModel;
use crate::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use vault_core::Rate;

/// Seconds in a day
const ONE_DAY: u64 = 86_400;

/// Tunable vault parameters, all rates at the 1e10 settings scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    /// Epoch duration in seconds
    pub epoch_duration: u64,
    /// Initial APR anchoring the decaying curve's invariant
    pub initial_apr: Rate,
    /// Fee on swap volume, taken for the treasury
    pub swap_fee: Rate,
    /// Fee on redemption payouts
    pub redeem_fee: Rate,
    /// Pricing model new epochs open with
    pub pricing: PricingModel,
    /// Lowest implied APR (elastic model)
    pub apr_floor: Rate,
    /// Highest implied APR (elastic model)
    pub apr_ceiling: Rate,
    /// Rate bump per unit of swap volume (elastic model)
    pub rate_elasticity_up: Rate,
    /// Rate relaxation speed toward the floor (elastic model)
    pub rate_elasticity_down: Rate,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            epoch_duration: 15 * ONE_DAY,
            initial_apr: Rate::from_percent(200),
            swap_fee: Rate::zero(),
            redeem_fee: Rate::zero(),
            pricing: PricingModel::Decaying,
            apr_floor: Rate::from_percent(10),
            apr_ceiling: Rate::from_percent(300),
            rate_elasticity_up: Rate::from_percent(10),
            rate_elasticity_down: Rate::from_percent(100),
        }
    }
}

impl VaultParams {
    /// Pricing decay period: one thirtieth of the epoch
    pub fn decay_period(&self) -> u64 {
        self.epoch_duration / 30
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.epoch_duration < 30 {
            return Err(EngineError::InvalidParams(
                "Epoch duration must be at least 30 seconds".into(),
            ));
        }
        if self.swap_fee > Rate::one() || self.redeem_fee > Rate::one() {
            return Err(EngineError::InvalidParams(
                "Fees cannot exceed 100%".into(),
            ));
        }
        match self.pricing {
            PricingModel::Decaying => {
                if self.initial_apr.is_zero() {
                    return Err(EngineError::InvalidParams(
                        "Initial APR must be positive".into(),
                    ));
                }
            }
            PricingModel::FloorCeilingElastic => {
                if self.apr_floor > self.apr_ceiling {
                    return Err(EngineError::InvalidParams(
                        "APR floor above ceiling".into(),
                    ));
                }
                if self.apr_ceiling.is_zero() {
                    return Err(EngineError::InvalidParams(
                        "APR ceiling must be positive".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Source of the vault's current parameters
pub trait ParamStore {
    fn current(&self) -> &VaultParams;
}

/// Fixed parameter set, for tests and single-tenant deployments
#[derive(Debug, Clone)]
pub struct StaticParams {
    params: VaultParams,
}

impl StaticParams {
    pub fn new(params: VaultParams) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl ParamStore for StaticParams {
    fn current(&self) -> &VaultParams {
        &self.params
    }
}

// src/fees.rs
use ethers::types::U256;
use tracing::{debug, warn};

use crate::bundler::BundlerApi;
use crate::error::Degradation;
use crate::types::FeeQuote;

/// 1.5 gwei, used for both fee fields when the oracle cannot be reached.
pub const FEE_FLOOR_WEI: u64 = 1_500_000_000;

#[derive(Debug, Clone, Copy)]
pub struct FeeOracle {
    floor: FeeQuote,
}

impl Default for FeeOracle {
    fn default() -> Self {
        Self::new(U256::from(FEE_FLOOR_WEI))
    }
}

impl FeeOracle {
    pub fn new(floor: U256) -> Self {
        Self {
            floor: FeeQuote::uniform(floor),
        }
    }

    pub fn floor(&self) -> FeeQuote {
        self.floor
    }

    /// Best effort: any oracle failure, or a quote with a zero max fee, yields the floor.
    pub async fn quote<B: BundlerApi + ?Sized>(&self, bundler: &B) -> (FeeQuote, Option<Degradation>) {
        match bundler.get_user_operation_gas_price().await {
            Ok(tiers) if !tiers.standard.is_unpriced() => {
                debug!(
                    "Fee oracle standard tier: maxFee {} maxPriorityFee {}",
                    tiers.standard.max_fee_per_gas, tiers.standard.max_priority_fee_per_gas
                );
                (tiers.standard, None)
            }
            Ok(_) => {
                warn!("Fee oracle returned a zero max fee, using floor");
                (
                    self.floor,
                    Some(Degradation::FeeOracleDegraded("zero price quoted".to_string())),
                )
            }
            Err(err) => {
                warn!("Failed to get fee oracle prices, using floor: {}", err);
                (self.floor, Some(Degradation::FeeOracleDegraded(err.to_string())))
            }
        }
    }
}

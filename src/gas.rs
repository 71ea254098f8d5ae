// src/gas.rs
use ethers::types::Address;
use tracing::{debug, warn};

use crate::bundler::BundlerApi;
use crate::error::Degradation;
use crate::operation::{FeePricedOperation, GasEstimatedOperation};

/// Refines the provisional gas limits from the bundler's simulation.
/// A failed simulation keeps the builder's defaults and never aborts the pipeline.
pub async fn estimate_gas<B: BundlerApi + ?Sized>(
    bundler: &B,
    op: FeePricedOperation,
    entry_point: Address,
) -> (GasEstimatedOperation, Option<Degradation>) {
    match bundler.estimate_user_operation_gas(op.user_op(), entry_point).await {
        Ok(estimate) => {
            debug!(
                "Gas estimate: call {:?} verification {:?} preVerification {:?}",
                estimate.call_gas_limit, estimate.verification_gas_limit, estimate.pre_verification_gas
            );
            (op.with_gas(Some(&estimate)), None)
        }
        Err(err) => {
            warn!("Gas estimation failed, using defaults: {}", err);
            (
                op.with_gas(None),
                Some(Degradation::EstimationFailure(err.to_string())),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{dummy_signature, BuiltOperation};
    use crate::testing::{transport_down, FakeBundler};
    use crate::types::{FeeQuote, UserOperation};
    use ethers::types::{Bytes, U256};

    fn priced() -> FeePricedOperation {
        BuiltOperation::new(UserOperation {
            sender: Address::repeat_byte(0x11),
            nonce: U256::zero(),
            init_code: Bytes::from(vec![0xff; 20]),
            call_data: Bytes::new(),
            call_gas_limit: U256::from(300_000),
            verification_gas_limit: U256::from(1_000_000),
            pre_verification_gas: U256::from(500_000),
            max_fee_per_gas: U256::zero(),
            max_priority_fee_per_gas: U256::zero(),
            paymaster_and_data: Bytes::new(),
            signature: dummy_signature(),
        })
        .price(FeeQuote::uniform(U256::one()))
    }

    #[tokio::test]
    async fn simulation_overwrites_limits() {
        let bundler = FakeBundler::default();
        let (op, degraded) = estimate_gas(&bundler, priced(), Address::zero()).await;

        assert!(degraded.is_none());
        assert_eq!(op.user_op().call_gas_limit, U256::from(35_000));
        assert_eq!(op.user_op().verification_gas_limit, U256::from(110_000));
        assert_eq!(op.user_op().pre_verification_gas, U256::from(48_000));

        let simulated = bundler.estimated.lock().unwrap();
        assert_eq!(simulated[0].signature, dummy_signature());
    }

    #[tokio::test]
    async fn failure_keeps_provisional_limits() {
        let bundler = FakeBundler {
            estimate: Err(transport_down()),
            ..Default::default()
        };
        let (op, degraded) = estimate_gas(&bundler, priced(), Address::zero()).await;

        assert!(matches!(degraded, Some(Degradation::EstimationFailure(_))));
        assert_eq!(op.user_op().call_gas_limit, U256::from(300_000));
        assert_eq!(op.user_op().verification_gas_limit, U256::from(1_000_000));
        assert_eq!(op.user_op().pre_verification_gas, U256::from(500_000));
    }
}

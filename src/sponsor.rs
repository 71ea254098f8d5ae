// src/sponsor.rs
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use tracing::{info, warn};

use crate::error::{BundlerError, Degradation};
use crate::operation::{GasEstimatedOperation, SponsoredOperation};
use crate::types::{PaymasterResponse, UserOperation};

/// Paymaster side of `pm_sponsorUserOperation`.
#[async_trait]
pub trait PaymasterApi: Send + Sync {
    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<PaymasterResponse, BundlerError>;
}

#[derive(Clone)]
pub struct PaymasterClient {
    client: HttpClient,
}

impl fmt::Debug for PaymasterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymasterClient").finish_non_exhaustive()
    }
}

impl PaymasterClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BundlerError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(BundlerError::from)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PaymasterApi for PaymasterClient {
    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<PaymasterResponse, BundlerError> {
        let response = self
            .client
            .request("pm_sponsorUserOperation", rpc_params![op, entry_point])
            .await?;
        Ok(response)
    }
}

/// Single attempt at sponsorship. Without a paymaster, or on any failure, the
/// operation goes out unsponsored and the account pays for its own gas.
pub async fn request_sponsorship(
    paymaster: Option<&dyn PaymasterApi>,
    op: GasEstimatedOperation,
    entry_point: Address,
) -> (SponsoredOperation, Option<Degradation>) {
    let Some(paymaster) = paymaster else {
        return (
            op.sponsor(None),
            Some(Degradation::SponsorshipDenied(
                "no paymaster configured".to_string(),
            )),
        );
    };

    match paymaster.sponsor_user_operation(op.user_op(), entry_point).await {
        Ok(response) if !response.paymaster_and_data.is_empty() => {
            info!("Paymaster sponsored operation for {:?}", op.user_op().sender);
            (op.sponsor(Some(response)), None)
        }
        Ok(_) => {
            warn!("Paymaster returned empty paymasterAndData, self-funding gas");
            (
                op.sponsor(None),
                Some(Degradation::SponsorshipDenied(
                    "empty paymasterAndData".to_string(),
                )),
            )
        }
        Err(err) => {
            warn!("Sponsorship request failed, self-funding gas: {}", err);
            (
                op.sponsor(None),
                Some(Degradation::SponsorshipDenied(err.to_string())),
            )
        }
    }
}

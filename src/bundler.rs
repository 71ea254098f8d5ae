// src/bundler.rs
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use tracing::{debug, error, info};

use crate::error::{BundlerError, UserOpError};
use crate::operation::{SignedOperation, SubmittedOperation};
use crate::types::{GasEstimate, GasPriceTiers, UserOperation, UserOperationReceipt};

/// The four bundler procedures the pipeline relies on.
#[async_trait]
pub trait BundlerApi: Send + Sync {
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, BundlerError>;

    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, BundlerError>;

    /// `Ok(None)` while the operation has not been included yet.
    async fn get_user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError>;

    async fn get_user_operation_gas_price(&self) -> Result<GasPriceTiers, BundlerError>;
}

/// JSON-RPC 2.0 over HTTP. Holds no state besides the connection.
#[derive(Clone)]
pub struct BundlerClient {
    client: HttpClient,
    fee_oracle_method: String,
}

impl fmt::Debug for BundlerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundlerClient")
            .field("fee_oracle_method", &self.fee_oracle_method)
            .finish()
    }
}

impl BundlerClient {
    pub fn new(
        url: &str,
        fee_oracle_method: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BundlerError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(BundlerError::from)?;

        Ok(Self {
            client,
            fee_oracle_method: fee_oracle_method.into(),
        })
    }
}

#[async_trait]
impl BundlerApi for BundlerClient {
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, BundlerError> {
        debug!("eth_estimateUserOperationGas for {:?}", op.sender);
        let estimate = self
            .client
            .request("eth_estimateUserOperationGas", rpc_params![op, entry_point])
            .await?;
        Ok(estimate)
    }

    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, BundlerError> {
        debug!("eth_sendUserOperation for {:?} nonce {}", op.sender, op.nonce);
        let hash = self
            .client
            .request("eth_sendUserOperation", rpc_params![op, entry_point])
            .await?;
        Ok(hash)
    }

    async fn get_user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        let raw: Option<serde_json::Value> = self
            .client
            .request("eth_getUserOperationReceipt", rpc_params![user_op_hash])
            .await?;

        match raw {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(value) => UserOperationReceipt::from_raw(value).map(Some),
        }
    }

    async fn get_user_operation_gas_price(&self) -> Result<GasPriceTiers, BundlerError> {
        let tiers = self
            .client
            .request(self.fee_oracle_method.as_str(), rpc_params![])
            .await?;
        Ok(tiers)
    }
}

const PREFUND_MARKERS: [&str; 2] = ["AA21", "didn't pay prefund"];

/// Whether a bundler rejection means the sender cannot cover its gas prefund.
/// Bundlers report this only as text, so this is the single place that matches on it.
pub fn is_prefund_shortfall(err: &BundlerError) -> bool {
    let texts: Vec<&str> = match err {
        BundlerError::Rpc { message, data, .. } => {
            let mut texts = vec![message.as_str()];
            if let Some(data) = data {
                texts.push(data.as_str());
            }
            texts
        }
        BundlerError::Transport(message) | BundlerError::InvalidResponse(message) => {
            vec![message.as_str()]
        }
    };

    texts
        .iter()
        .any(|text| PREFUND_MARKERS.iter().any(|marker| text.contains(marker)))
}

/// Submits a signed operation, turning bundler rejections into caller-facing errors.
pub async fn submit<B: BundlerApi + ?Sized>(
    bundler: &B,
    signed: SignedOperation,
) -> Result<SubmittedOperation, UserOpError> {
    match bundler
        .send_user_operation(signed.user_op(), signed.entry_point())
        .await
    {
        Ok(user_op_hash) => {
            info!(
                "Submitted user operation {:?} from {:?}",
                user_op_hash,
                signed.user_op().sender
            );
            if user_op_hash != signed.hash() {
                debug!(
                    "Bundler hash {:?} differs from local hash {:?}",
                    user_op_hash,
                    signed.hash()
                );
            }
            Ok(signed.submitted(user_op_hash))
        }
        Err(err) if is_prefund_shortfall(&err) => {
            let sender = signed.user_op().sender;
            error!("Smart account {:?} cannot pay prefund: {}", sender, err);
            Err(UserOpError::InsufficientPrefund {
                sender,
                required: signed.user_op().max_gas_cost().unwrap_or_default(),
                message: err.to_string(),
                operation: Box::new(signed),
            })
        }
        Err(err) => {
            error!("Bundler rejected user operation: {}", err);
            Err(UserOpError::SubmissionFailure(err.to_string()))
        }
    }
}

// src/builder.rs
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::account::AccountState;
use crate::contracts::{EntryPoint, Erc20};
use crate::encoding::{init_code, transfer_call_data};
use crate::error::UserOpError;
use crate::network::NetworkProfile;
use crate::operation::{dummy_signature, BuiltOperation};
use crate::types::{Asset, TransferIntent, UserOperation};

pub const DEFAULT_CALL_GAS_LIMIT: u64 = 300_000;
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 300_000;
/// Verification also pays for the account deployment.
pub const DEPLOYMENT_VERIFICATION_GAS_LIMIT: u64 = 1_000_000;
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 500_000;

pub struct OperationBuilder<M> {
    client: Arc<M>,
    factory_data: Bytes,
}

impl<M: Middleware + 'static> OperationBuilder<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self {
            client,
            factory_data: Bytes::new(),
        }
    }

    pub fn with_factory_data(mut self, factory_data: Bytes) -> Self {
        self.factory_data = factory_data;
        self
    }

    /// `EntryPoint.getNonce(sender, 0)`, read fresh for every build.
    pub async fn fetch_nonce(&self, entry_point: Address, sender: Address) -> Result<U256, UserOpError> {
        EntryPoint::new(entry_point, self.client.clone())
            .get_nonce(sender, U256::zero())
            .call()
            .await
            .map_err(|e| UserOpError::ChainReadFailure(format!("getNonce: {e}")))
    }

    pub async fn balance_of(&self, holder: Address, asset: Asset) -> Result<U256, UserOpError> {
        match asset {
            Asset::Native => self
                .client
                .get_balance(holder, None)
                .await
                .map_err(|e| UserOpError::ChainReadFailure(format!("balance: {e}"))),
            Asset::Token(token) => Erc20::new(token, self.client.clone())
                .balance_of(holder)
                .call()
                .await
                .map_err(|e| UserOpError::ChainReadFailure(format!("balanceOf: {e}"))),
        }
    }

    /// Rejects amounts above the account's balance before anything is signed or sent.
    pub async fn ensure_sufficient_balance(
        &self,
        holder: Address,
        intent: &TransferIntent,
    ) -> Result<U256, UserOpError> {
        let available = self.balance_of(holder, intent.asset).await?;
        if intent.amount > available {
            return Err(UserOpError::InsufficientBalance {
                requested: intent.amount,
                available,
            });
        }
        Ok(available)
    }

    /// Assembles an operation with provisional gas and fees and a placeholder signature.
    /// Without an intent the operation only deploys the account.
    pub async fn build(
        &self,
        account: &AccountState,
        intent: Option<&TransferIntent>,
        profile: &NetworkProfile,
    ) -> Result<BuiltOperation, UserOpError> {
        if intent.is_none() && account.deployment.is_deployed() {
            return Err(UserOpError::AlreadyDeployed(account.address));
        }
        if let Some(intent) = intent {
            if intent.amount.is_zero() {
                return Err(UserOpError::InvalidParameters(
                    "transfer amount must be positive".to_string(),
                ));
            }
            self.ensure_sufficient_balance(account.address, intent).await?;
        }
        self.assemble(account, intent, profile).await
    }

    /// Builds without the deployment and balance checks, for callers that have
    /// already read the balance the intent moves.
    pub(crate) async fn assemble(
        &self,
        account: &AccountState,
        intent: Option<&TransferIntent>,
        profile: &NetworkProfile,
    ) -> Result<BuiltOperation, UserOpError> {
        let nonce = self.fetch_nonce(profile.entry_point, account.address).await?;

        let deployed = account.deployment.is_deployed();
        let init_code = if deployed {
            Bytes::new()
        } else {
            info!("Account {:?} not deployed, including initCode", account.address);
            init_code(account.factory, account.owner, &self.factory_data)
        };

        let call_data = intent.map(transfer_call_data).unwrap_or_default();
        let verification_gas_limit = if deployed {
            DEFAULT_VERIFICATION_GAS_LIMIT
        } else {
            DEPLOYMENT_VERIFICATION_GAS_LIMIT
        };

        debug!("Built user operation for {:?} with nonce {}", account.address, nonce);
        Ok(BuiltOperation::new(UserOperation {
            sender: account.address,
            nonce,
            init_code,
            call_data,
            call_gas_limit: U256::from(DEFAULT_CALL_GAS_LIMIT),
            verification_gas_limit: U256::from(verification_gas_limit),
            pre_verification_gas: U256::from(DEFAULT_PRE_VERIFICATION_GAS),
            max_fee_per_gas: U256::zero(),
            max_priority_fee_per_gas: U256::zero(),
            paymaster_and_data: Bytes::new(),
            signature: dummy_signature(),
        }))
    }
}

// src/error.rs
use ethers::types::{Address, U256};
use thiserror::Error;

use crate::operation::SignedOperation;

/// Failures surfaced to the caller of the pipeline.
#[derive(Error, Debug)]
pub enum UserOpError {
    #[error("Account factory {factory:?} is not live on chain {chain_id}")]
    FactoryUnavailable { factory: Address, chain_id: u64 },

    #[error("Chain read failed: {0}")]
    ChainReadFailure(String),

    #[error("Signing failed: {0}")]
    SigningFailure(#[from] SignerError),

    #[error("Smart account {sender:?} didn't pay prefund (needs up to {required} wei): {message}")]
    InsufficientPrefund {
        sender: Address,
        required: U256,
        message: String,
        operation: Box<SignedOperation>,
    },

    #[error("Bundler rejected operation: {0}")]
    SubmissionFailure(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: U256, available: U256 },

    #[error("Smart account {0:?} is already deployed")]
    AlreadyDeployed(Address),

    #[error("Nothing to recover from {0:?}")]
    NothingToRecover(Address),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Bundler(#[from] BundlerError),
}

impl UserOpError {
    /// Whether the caller should prompt for a native-currency top-up and retry.
    pub fn needs_funding(&self) -> bool {
        matches!(self, UserOpError::InsufficientPrefund { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundlerError {
    #[error("Bundler transport error: {0}")]
    Transport(String),

    #[error("Bundler RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<String>,
    },

    #[error("Invalid bundler response: {0}")]
    InvalidResponse(String),
}

impl From<jsonrpsee::core::ClientError> for BundlerError {
    fn from(err: jsonrpsee::core::ClientError) -> Self {
        use jsonrpsee::core::ClientError;

        match err {
            ClientError::Call(obj) => BundlerError::Rpc {
                code: obj.code(),
                message: obj.message().to_string(),
                data: obj.data().map(|raw| raw.get().to_string()),
            },
            ClientError::ParseError(e) => BundlerError::InvalidResponse(e.to_string()),
            other => BundlerError::Transport(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signer refused to sign: {0}")]
    Rejected(String),
}

/// Internal-only failures. Each is absorbed by the component that owns it and
/// only ever reported through logs and the pipeline event channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    #[error("Fee oracle unavailable, using floor price: {0}")]
    FeeOracleDegraded(String),

    #[error("Gas estimation failed, keeping provisional limits: {0}")]
    EstimationFailure(String),

    #[error("Sponsorship denied, paying gas from the account: {0}")]
    SponsorshipDenied(String),
}

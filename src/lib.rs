// src/lib.rs
//! ERC-4337 (EntryPoint v0.6) user operation pipeline for counterfactual smart
//! accounts: resolve, build, price, estimate, sponsor, sign, submit, confirm.

pub mod account;
pub mod builder;
pub mod bundler;
pub mod config;
pub mod contracts;
pub mod encoding;
pub mod error;
pub mod events;
pub mod fees;
pub mod gas;
pub mod hash;
pub mod network;
pub mod operation;
pub mod pipeline;
pub mod poller;
pub mod signer;
pub mod sponsor;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use account::{AccountRegistry, AccountResolver, AccountState, DeploymentState};
pub use bundler::{is_prefund_shortfall, BundlerApi, BundlerClient};
pub use config::PipelineConfig;
pub use error::{BundlerError, Degradation, SignerError, UserOpError};
pub use events::PipelineEvent;
pub use network::{NetworkKey, NetworkProfile, NetworkRegistry};
pub use operation::{Outcome, SignedOperation};
pub use pipeline::Pipeline;
pub use signer::{DelegatedSigner, LocalKeySigner, OperationSigner};
pub use sponsor::{PaymasterApi, PaymasterClient};
pub use types::{Asset, TransferIntent, UserOperation, UserOperationReceipt};

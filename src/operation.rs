// src/operation.rs
//! Operation lifecycle as a chain of owned states:
//! `Built -> FeePriced -> GasEstimated -> Sponsored -> Signed -> Submitted`.
//! Each transition consumes the previous state, so a field can only be read
//! once the stage that populates it has run, and nothing can change after signing.

use ethers::types::{Address, Bytes, H256, U256};
use tracing::debug;

use crate::error::SignerError;
use crate::hash::user_operation_hash;
use crate::signer::OperationSigner;
use crate::types::{FeeQuote, GasEstimate, PaymasterResponse, UserOperation, UserOperationReceipt};

/// Fixed-length placeholder so the bundler can size verification gas before a
/// real signature exists.
pub const DUMMY_SIGNATURE: &str = "0xfffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c";

pub fn dummy_signature() -> Bytes {
    // 65 bytes of valid hex; decoding cannot fail.
    Bytes::from(hex::decode(&DUMMY_SIGNATURE[2..]).unwrap_or_else(|_| vec![0u8; 65]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltOperation {
    op: UserOperation,
}

impl BuiltOperation {
    pub(crate) fn new(op: UserOperation) -> Self {
        Self { op }
    }

    pub fn user_op(&self) -> &UserOperation {
        &self.op
    }

    pub fn deploys_account(&self) -> bool {
        !self.op.init_code.is_empty()
    }

    pub fn price(mut self, fees: FeeQuote) -> FeePricedOperation {
        self.op.max_fee_per_gas = fees.max_fee_per_gas;
        self.op.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
        FeePricedOperation { op: self.op }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeePricedOperation {
    op: UserOperation,
}

impl FeePricedOperation {
    pub fn user_op(&self) -> &UserOperation {
        &self.op
    }

    /// Applies the simulator's numbers; every field it omits keeps its provisional value.
    pub fn with_gas(mut self, estimate: Option<&GasEstimate>) -> GasEstimatedOperation {
        if let Some(estimate) = estimate {
            apply_gas_limits(
                &mut self.op,
                estimate.call_gas_limit,
                estimate.verification_gas_limit,
                estimate.pre_verification_gas,
            );
        }
        GasEstimatedOperation { op: self.op }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimatedOperation {
    op: UserOperation,
}

impl GasEstimatedOperation {
    pub fn user_op(&self) -> &UserOperation {
        &self.op
    }

    /// `None` means the account pays its own gas.
    pub fn sponsor(mut self, sponsorship: Option<PaymasterResponse>) -> SponsoredOperation {
        if let Some(response) = sponsorship {
            apply_gas_limits(
                &mut self.op,
                response.call_gas_limit,
                response.verification_gas_limit,
                response.pre_verification_gas,
            );
            self.op.paymaster_and_data = response.paymaster_and_data;
        }
        SponsoredOperation { op: self.op }
    }
}

fn apply_gas_limits(
    op: &mut UserOperation,
    call: Option<U256>,
    verification: Option<U256>,
    pre_verification: Option<U256>,
) {
    if let Some(value) = call {
        op.call_gas_limit = value;
    }
    if let Some(value) = verification {
        op.verification_gas_limit = value;
    }
    if let Some(value) = pre_verification {
        op.pre_verification_gas = value;
    }
}

/// Every hashed field is final from here on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsoredOperation {
    op: UserOperation,
}

impl SponsoredOperation {
    pub fn user_op(&self) -> &UserOperation {
        &self.op
    }

    pub fn is_sponsored(&self) -> bool {
        !self.op.paymaster_and_data.is_empty()
    }

    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        user_operation_hash(&self.op, entry_point, chain_id)
    }

    /// Hashes the frozen fields and replaces the placeholder with a real signature.
    pub async fn sign(
        mut self,
        signer: &dyn OperationSigner,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<SignedOperation, SignerError> {
        let hash = self.hash(entry_point, chain_id);
        debug!("Signing user operation {:?} for {:?}", hash, self.op.sender);

        self.op.signature = signer.sign_hash(hash).await?;
        Ok(SignedOperation {
            op: self.op,
            hash,
            entry_point,
            chain_id,
        })
    }
}

/// Immutable once produced; resubmitting after a funding top-up reuses it as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOperation {
    op: UserOperation,
    hash: H256,
    entry_point: Address,
    chain_id: u64,
}

impl SignedOperation {
    pub fn user_op(&self) -> &UserOperation {
        &self.op
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn deploys_account(&self) -> bool {
        !self.op.init_code.is_empty()
    }

    pub fn submitted(self, user_op_hash: H256) -> SubmittedOperation {
        SubmittedOperation {
            signed: self,
            user_op_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedOperation {
    signed: SignedOperation,
    user_op_hash: H256,
}

impl SubmittedOperation {
    pub fn signed(&self) -> &SignedOperation {
        &self.signed
    }

    /// Hash reported by the bundler.
    pub fn user_op_hash(&self) -> H256 {
        self.user_op_hash
    }
}

/// Where an operation ended up once polling stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Confirmed(UserOperationReceipt),
    Failed(UserOperationReceipt),
    /// No receipt within the polling window. Not an error: look it up later by hash.
    Pending { user_op_hash: H256 },
}

impl Outcome {
    pub fn from_receipt(receipt: UserOperationReceipt) -> Self {
        if receipt.success {
            Outcome::Confirmed(receipt)
        } else {
            Outcome::Failed(receipt)
        }
    }

    pub fn user_op_hash(&self) -> H256 {
        match self {
            Outcome::Confirmed(receipt) | Outcome::Failed(receipt) => receipt.user_op_hash,
            Outcome::Pending { user_op_hash } => *user_op_hash,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed(_))
    }
}

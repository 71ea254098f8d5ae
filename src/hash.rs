// src/hash.rs
use ethers::abi::{encode, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

use crate::types::UserOperation;

/// ABI-encodes the ten hashed fields in canonical order. Dynamic byte fields are
/// replaced by their keccak256 digest; the signature is never part of it.
pub fn pack_user_operation(op: &UserOperation) -> Vec<u8> {
    encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::FixedBytes(keccak256(&op.init_code).to_vec()),
        Token::FixedBytes(keccak256(&op.call_data).to_vec()),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        Token::FixedBytes(keccak256(&op.paymaster_and_data).to_vec()),
    ])
}

/// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`, the digest
/// the account's owner signs and the EntryPoint recomputes.
pub fn user_operation_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let inner = keccak256(pack_user_operation(op));

    let outer = encode(&[
        Token::FixedBytes(inner.to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ]);

    H256::from(keccak256(outer))
}

// src/encoding.rs
use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, U256};

use crate::contracts::{CreateAccountCall, ExecuteCall, TransferCall};
use crate::types::{Asset, TransferIntent};

/// Deployment payload (`initCode`): the factory address followed by the encoded
/// `createAccount(owner, data)` call. Pure and deterministic. `data` must match
/// what was passed to `getAddress` or the deployed address differs.
pub fn init_code(factory: Address, owner: Address, data: &Bytes) -> Bytes {
    let create = CreateAccountCall {
        admin: owner,
        data: data.clone(),
    }
    .encode();

    let mut payload = Vec::with_capacity(20 + create.len());
    payload.extend_from_slice(factory.as_bytes());
    payload.extend_from_slice(&create);
    Bytes::from(payload)
}

/// `execute(dest, value, func)` on the smart account.
pub fn execute_call(dest: Address, value: U256, func: Bytes) -> Bytes {
    Bytes::from(ExecuteCall { dest, value, func }.encode())
}

/// Call payload moving `intent.amount` of `intent.asset` to `intent.recipient`.
///
/// Native transfers call the recipient directly with the amount as value and no
/// inner data; token transfers call the token with an ERC-20 `transfer`.
pub fn transfer_call_data(intent: &TransferIntent) -> Bytes {
    match intent.asset {
        Asset::Native => execute_call(intent.recipient, intent.amount, Bytes::new()),
        Asset::Token(token) => {
            let transfer = TransferCall {
                to: intent.recipient,
                amount: intent.amount,
            }
            .encode();
            execute_call(token, U256::zero(), Bytes::from(transfer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::AbiDecode;

    const CREATE_ACCOUNT_SELECTOR: [u8; 4] = [0xd8, 0xfd, 0x8f, 0x44];
    const EXECUTE_SELECTOR: [u8; 4] = [0xb6, 0x1d, 0x27, 0xf6];
    const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

    #[test]
    fn init_code_starts_with_factory() {
        let factory = Address::repeat_byte(0xff);
        let owner = Address::repeat_byte(0xaa);
        let code = init_code(factory, owner, &Bytes::new());

        assert_eq!(&code[..20], factory.as_bytes());
        assert_eq!(&code[20..24], &CREATE_ACCOUNT_SELECTOR);

        let decoded = CreateAccountCall::decode(&code[20..]).unwrap();
        assert_eq!(decoded.admin, owner);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn init_code_is_deterministic() {
        let factory = Address::repeat_byte(0xff);
        let owner = Address::repeat_byte(0xaa);
        let data = Bytes::new();
        assert_eq!(init_code(factory, owner, &data), init_code(factory, owner, &data));
        assert_ne!(
            init_code(factory, owner, &data),
            init_code(factory, Address::repeat_byte(0xab), &data)
        );
        assert_ne!(
            init_code(factory, owner, &data),
            init_code(factory, owner, &Bytes::from(vec![0x01]))
        );
    }

    #[test]
    fn native_transfer_targets_recipient_directly() {
        let recipient = Address::repeat_byte(0x22);
        let intent = TransferIntent {
            asset: Asset::Native,
            recipient,
            amount: U256::exp10(18),
        };

        let data = transfer_call_data(&intent);
        assert_eq!(&data[..4], &EXECUTE_SELECTOR);

        let call = ExecuteCall::decode(&data).unwrap();
        assert_eq!(call.dest, recipient);
        assert_eq!(call.value, U256::exp10(18));
        assert!(call.func.is_empty());
    }

    #[test]
    fn token_transfer_wraps_erc20_transfer() {
        let token = Address::repeat_byte(0x75);
        let recipient = Address::repeat_byte(0x22);
        let intent = TransferIntent {
            asset: Asset::Token(token),
            recipient,
            amount: U256::from(1_250_000u64),
        };

        let call = ExecuteCall::decode(transfer_call_data(&intent)).unwrap();
        assert_eq!(call.dest, token);
        assert!(call.value.is_zero());
        assert_eq!(&call.func[..4], &TRANSFER_SELECTOR);

        let inner = TransferCall::decode(&call.func).unwrap();
        assert_eq!(inner.to, recipient);
        assert_eq!(inner.amount, U256::from(1_250_000u64));
    }
}

// src/contracts.rs
//! Minimal bindings for the contracts the pipeline reads from or encodes calls for.

use ethers::prelude::abigen;

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256)
    ]"#
);

abigen!(
    AccountFactory,
    r#"[
        function getAddress(address admin, bytes data) external view returns (address)
        function createAccount(address admin, bytes data) external returns (address)
    ]"#
);

abigen!(
    SmartAccount,
    r#"[
        function execute(address dest, uint256 value, bytes func) external
    ]"#
);

abigen!(
    Erc20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

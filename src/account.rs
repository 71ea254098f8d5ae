// src/account.rs
use std::sync::Arc;

use dashmap::DashMap;
use ethers::contract::ContractError;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes};
use tracing::{debug, info, warn};

use crate::contracts::AccountFactory;
use crate::error::UserOpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentState {
    Deployed,
    NotDeployed,
    /// The bytecode check failed; treat as not deployed.
    Unknown,
}

impl DeploymentState {
    pub fn is_deployed(&self) -> bool {
        matches!(self, DeploymentState::Deployed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub owner: Address,
    pub factory: Address,
    pub chain_id: u64,
    pub address: Address,
    pub deployment: DeploymentState,
}

impl AccountState {
    /// Folds a fresh bytecode observation in. `Deployed` is terminal.
    pub fn observe(&mut self, observed: DeploymentState) {
        if !self.deployment.is_deployed() {
            self.deployment = observed;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub owner: Address,
    pub factory: Address,
    pub chain_id: u64,
}

/// Session cache of resolved accounts. Readers may share it freely; only the
/// resolver and the pipeline's confirmation step write to it.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: DashMap<AccountKey, AccountState>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AccountKey) -> Option<AccountState> {
        self.accounts.get(key).map(|entry| entry.value().clone())
    }

    fn upsert(&self, state: AccountState) -> AccountState {
        let key = AccountKey {
            owner: state.owner,
            factory: state.factory,
            chain_id: state.chain_id,
        };
        let mut entry = self.accounts.entry(key).or_insert_with(|| state.clone());
        entry.observe(state.deployment);
        entry.value().clone()
    }

    /// Records a confirmed deployment. Returns true only on the transition.
    pub fn mark_deployed(&self, key: &AccountKey) -> bool {
        match self.accounts.get_mut(key) {
            Some(mut entry) if !entry.deployment.is_deployed() => {
                entry.deployment = DeploymentState::Deployed;
                true
            }
            _ => false,
        }
    }
}

pub struct AccountResolver<M> {
    client: Arc<M>,
    registry: Arc<AccountRegistry>,
}

impl<M: Middleware + 'static> AccountResolver<M> {
    pub fn new(client: Arc<M>, registry: Arc<AccountRegistry>) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    /// Counterfactual address from the factory's `getAddress(owner, data)`.
    pub async fn derive_address(
        &self,
        owner: Address,
        factory: Address,
        factory_data: &Bytes,
        chain_id: u64,
    ) -> Result<Address, UserOpError> {
        let unavailable = || UserOpError::FactoryUnavailable { factory, chain_id };

        let code = self
            .client
            .get_code(factory, None)
            .await
            .map_err(|e| UserOpError::ChainReadFailure(format!("factory code: {e}")))?;
        if code.is_empty() {
            warn!("No factory code at {:?} on chain {}", factory, chain_id);
            return Err(unavailable());
        }

        let contract = AccountFactory::new(factory, self.client.clone());
        let address = contract
            .get_address(owner, factory_data.clone())
            .call()
            .await
            .map_err(|e| match e {
                ContractError::MiddlewareError { .. } | ContractError::ProviderError { .. } => {
                    UserOpError::ChainReadFailure(format!("getAddress: {e}"))
                }
                _ => unavailable(),
            })?;

        if address.is_zero() {
            warn!("Factory {:?} returned the zero address", factory);
            return Err(unavailable());
        }

        debug!("Derived smart account {:?} for owner {:?}", address, owner);
        Ok(address)
    }

    /// Read errors degrade to `Unknown`, never to `Deployed`.
    pub async fn deployment_state(&self, address: Address) -> DeploymentState {
        match self.client.get_code(address, None).await {
            Ok(code) if code.is_empty() => DeploymentState::NotDeployed,
            Ok(_) => DeploymentState::Deployed,
            Err(e) => {
                warn!("Could not read code at {:?}: {}", address, e);
                DeploymentState::Unknown
            }
        }
    }

    /// Derives the address once per session, then refreshes the deployment flag
    /// until it is observed as deployed.
    pub async fn resolve(
        &self,
        owner: Address,
        factory: Address,
        factory_data: &Bytes,
        chain_id: u64,
    ) -> Result<AccountState, UserOpError> {
        let key = AccountKey {
            owner,
            factory,
            chain_id,
        };

        let address = match self.registry.get(&key) {
            Some(cached) if cached.deployment.is_deployed() => return Ok(cached),
            Some(cached) => cached.address,
            None => {
                self.derive_address(owner, factory, factory_data, chain_id)
                    .await?
            }
        };

        let deployment = self.deployment_state(address).await;
        let state = self.registry.upsert(AccountState {
            owner,
            factory,
            chain_id,
            address,
            deployment,
        });

        info!(
            "Smart account {:?} on chain {}: {:?}",
            state.address, chain_id, state.deployment
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::providers::{MockProvider, Provider};

    fn resolver() -> (AccountResolver<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        (
            AccountResolver::new(Arc::new(provider), Arc::new(AccountRegistry::new())),
            mock,
        )
    }

    fn address_word(address: Address) -> Bytes {
        Bytes::from(encode(&[Token::Address(address)]))
    }

    fn contract_code() -> Bytes {
        Bytes::from(vec![0x60, 0x80, 0x60, 0x40])
    }

    // MockProvider answers the most recently pushed response first.
    fn push_derivation(mock: &MockProvider, account: Address, account_code: Bytes) {
        mock.push::<Bytes, _>(account_code).unwrap();
        mock.push::<Bytes, _>(address_word(account)).unwrap();
        mock.push::<Bytes, _>(contract_code()).unwrap();
    }

    #[tokio::test]
    async fn resolves_undeployed_account() {
        let (resolver, mock) = resolver();
        let owner = Address::repeat_byte(0xaa);
        let factory = Address::repeat_byte(0xff);
        let account = Address::repeat_byte(0xbb);
        push_derivation(&mock, account, Bytes::new());

        let state = resolver.resolve(owner, factory, &Bytes::new(), 7).await.unwrap();
        assert_eq!(state.address, account);
        assert_eq!(state.deployment, DeploymentState::NotDeployed);
    }

    #[tokio::test]
    async fn derivation_is_idempotent() {
        let (resolver, mock) = resolver();
        let owner = Address::repeat_byte(0xaa);
        let factory = Address::repeat_byte(0xff);
        let account = Address::repeat_byte(0xbb);

        mock.push::<Bytes, _>(address_word(account)).unwrap();
        mock.push::<Bytes, _>(contract_code()).unwrap();
        mock.push::<Bytes, _>(address_word(account)).unwrap();
        mock.push::<Bytes, _>(contract_code()).unwrap();

        let first = resolver.derive_address(owner, factory, &Bytes::new(), 7).await.unwrap();
        let second = resolver.derive_address(owner, factory, &Bytes::new(), 7).await.unwrap();
        assert_eq!(first, account);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn factory_without_code_is_unavailable() {
        let (resolver, mock) = resolver();
        mock.push::<Bytes, _>(Bytes::new()).unwrap();

        let err = resolver
            .derive_address(Address::repeat_byte(0xaa), Address::repeat_byte(0xff), &Bytes::new(), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, UserOpError::FactoryUnavailable { chain_id: 7, .. }));
    }

    #[tokio::test]
    async fn zero_address_means_factory_not_live() {
        let (resolver, mock) = resolver();
        mock.push::<Bytes, _>(address_word(Address::zero())).unwrap();
        mock.push::<Bytes, _>(contract_code()).unwrap();

        let err = resolver
            .derive_address(Address::repeat_byte(0xaa), Address::repeat_byte(0xff), &Bytes::new(), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, UserOpError::FactoryUnavailable { .. }));
    }

    #[tokio::test]
    async fn unreachable_node_is_a_chain_read_failure() {
        let (resolver, _mock) = resolver();

        let err = resolver
            .derive_address(Address::repeat_byte(0xaa), Address::repeat_byte(0xff), &Bytes::new(), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, UserOpError::ChainReadFailure(_)));
    }

    #[tokio::test]
    async fn failed_code_read_is_unknown_not_deployed() {
        let (resolver, _mock) = resolver();
        let state = resolver.deployment_state(Address::repeat_byte(0xbb)).await;
        assert_eq!(state, DeploymentState::Unknown);
        assert!(!state.is_deployed());
    }

    #[tokio::test]
    async fn deployed_flag_is_irreversible() {
        let (resolver, mock) = resolver();
        let owner = Address::repeat_byte(0xaa);
        let factory = Address::repeat_byte(0xff);
        let account = Address::repeat_byte(0xbb);
        push_derivation(&mock, account, contract_code());

        let state = resolver.resolve(owner, factory, &Bytes::new(), 7).await.unwrap();
        assert!(state.deployment.is_deployed());

        // Served from the cache without touching the node.
        let again = resolver.resolve(owner, factory, &Bytes::new(), 7).await.unwrap();
        assert_eq!(again, state);

        let mut observed = state.clone();
        observed.observe(DeploymentState::NotDeployed);
        assert!(observed.deployment.is_deployed());
    }

    #[tokio::test]
    async fn mark_deployed_transitions_once() {
        let (resolver, mock) = resolver();
        let owner = Address::repeat_byte(0xaa);
        let factory = Address::repeat_byte(0xff);
        push_derivation(&mock, Address::repeat_byte(0xbb), Bytes::new());
        resolver.resolve(owner, factory, &Bytes::new(), 7).await.unwrap();

        let key = AccountKey {
            owner,
            factory,
            chain_id: 7,
        };
        assert!(resolver.registry().mark_deployed(&key));
        assert!(!resolver.registry().mark_deployed(&key));
        assert!(resolver.registry().get(&key).unwrap().deployment.is_deployed());
    }
}

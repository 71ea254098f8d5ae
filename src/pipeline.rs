// src/pipeline.rs
//! One sequential run per user action:
//! resolve -> build -> price -> estimate -> sponsor -> sign -> submit -> poll.
//!
//! Callers must keep at most one operation in flight per account; the nonce is
//! read fresh for every build and two concurrent runs would collide on it.

use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::{Address, H256, U256};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::account::{AccountKey, AccountRegistry, AccountResolver, AccountState};
use crate::builder::OperationBuilder;
use crate::bundler::{submit, BundlerApi};
use crate::config::PipelineConfig;
use crate::error::{Degradation, UserOpError};
use crate::events::{EventBus, PipelineEvent};
use crate::fees::FeeOracle;
use crate::gas::estimate_gas;
use crate::network::NetworkProfile;
use crate::operation::{BuiltOperation, Outcome, SignedOperation};
use crate::poller::ConfirmationPoller;
use crate::signer::OperationSigner;
use crate::sponsor::{request_sponsorship, PaymasterApi};
use crate::types::{Asset, TransferIntent, UserOperationReceipt};

pub struct Pipeline<M, B: ?Sized> {
    profile: NetworkProfile,
    config: PipelineConfig,
    resolver: AccountResolver<M>,
    builder: OperationBuilder<M>,
    fee_oracle: FeeOracle,
    poller: ConfirmationPoller,
    bundler: Arc<B>,
    paymaster: Option<Arc<dyn PaymasterApi>>,
    signer: Arc<dyn OperationSigner>,
    events: EventBus,
}

impl<M, B> Pipeline<M, B>
where
    M: Middleware + 'static,
    B: BundlerApi + ?Sized,
{
    pub fn new(
        profile: NetworkProfile,
        client: Arc<M>,
        bundler: Arc<B>,
        signer: Arc<dyn OperationSigner>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_registry(
            profile,
            client,
            bundler,
            signer,
            config,
            Arc::new(AccountRegistry::new()),
        )
    }

    /// Shares an account cache across pipelines of the same session.
    pub fn with_registry(
        profile: NetworkProfile,
        client: Arc<M>,
        bundler: Arc<B>,
        signer: Arc<dyn OperationSigner>,
        config: PipelineConfig,
        registry: Arc<AccountRegistry>,
    ) -> Self {
        Self {
            resolver: AccountResolver::new(client.clone(), registry),
            builder: OperationBuilder::new(client).with_factory_data(config.factory_data.clone()),
            fee_oracle: FeeOracle::new(config.fee_floor),
            poller: ConfirmationPoller::new(config.poll_interval, config.max_poll_attempts),
            profile,
            config,
            bundler,
            paymaster: None,
            signer,
            events: EventBus::new(),
        }
    }

    pub fn with_paymaster(mut self, paymaster: Arc<dyn PaymasterApi>) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn owner(&self) -> Address {
        self.signer.address()
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        self.resolver.registry()
    }

    /// Receives every event emitted after this call.
    pub fn subscribe(&self) -> UnboundedReceiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub async fn resolve_account(&self) -> Result<AccountState, UserOpError> {
        let account = self
            .resolver
            .resolve(
                self.owner(),
                self.profile.factory,
                &self.config.factory_data,
                self.profile.chain_id,
            )
            .await?;

        self.events.emit(PipelineEvent::AccountResolved {
            address: account.address,
            deployed: account.deployment.is_deployed(),
        });
        Ok(account)
    }

    /// Deploys the smart account with an operation that carries no call.
    pub async fn deploy(&self) -> Result<Outcome, UserOpError> {
        let account = self.resolve_account().await?;
        let built = self.builder.build(&account, None, &self.profile).await?;
        self.run(built).await
    }

    pub async fn transfer(&self, intent: TransferIntent) -> Result<Outcome, UserOpError> {
        ensure_recipient(intent.recipient)?;
        let account = self.resolve_account().await?;
        let built = self
            .builder
            .build(&account, Some(&intent), &self.profile)
            .await?;
        self.run(built).await
    }

    /// Moves the account's whole balance of the network's recoverable token to `recipient`.
    pub async fn recover(&self, recipient: Address) -> Result<Outcome, UserOpError> {
        ensure_recipient(recipient)?;
        let account = self.resolve_account().await?;
        let asset = Asset::Token(self.profile.recoverable_asset.address);
        let balance = self.builder.balance_of(account.address, asset).await?;
        if balance.is_zero() {
            return Err(UserOpError::NothingToRecover(account.address));
        }

        info!(
            "Recovering {} {} (raw units) from {:?}",
            balance, self.profile.recoverable_asset.symbol, account.address
        );
        let intent = TransferIntent {
            asset,
            recipient,
            amount: balance,
        };
        let built = self
            .builder
            .assemble(&account, Some(&intent), &self.profile)
            .await?;
        self.run(built).await
    }

    /// Sends an already-signed operation again, typically after the account was
    /// funded following an `InsufficientPrefund`.
    pub async fn resubmit(&self, signed: SignedOperation) -> Result<Outcome, UserOpError> {
        if signed.chain_id() != self.profile.chain_id {
            return Err(UserOpError::InvalidParameters(format!(
                "operation was signed for chain {}, pipeline runs on {}",
                signed.chain_id(),
                self.profile.chain_id
            )));
        }
        self.dispatch(signed).await
    }

    pub async fn balance(&self, holder: Address, asset: Asset) -> Result<U256, UserOpError> {
        self.builder.balance_of(holder, asset).await
    }

    /// Single receipt lookup, for operations that were left pending.
    pub async fn receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>, UserOpError> {
        Ok(self.bundler.get_user_operation_receipt(user_op_hash).await?)
    }

    async fn run(&self, built: BuiltOperation) -> Result<Outcome, UserOpError> {
        let signed = self.prepare(built).await?;
        self.dispatch(signed).await
    }

    async fn prepare(&self, built: BuiltOperation) -> Result<SignedOperation, UserOpError> {
        let entry_point = self.profile.entry_point;

        let (fees, degraded) = self.fee_oracle.quote(self.bundler.as_ref()).await;
        self.report(degraded);
        let priced = built.price(fees);

        let (estimated, degraded) = estimate_gas(self.bundler.as_ref(), priced, entry_point).await;
        self.report(degraded);

        let (sponsored, degraded) =
            request_sponsorship(self.paymaster.as_deref(), estimated, entry_point).await;
        self.report(degraded);

        let signed = sponsored
            .sign(self.signer.as_ref(), entry_point, self.profile.chain_id)
            .await?;
        self.events.emit(PipelineEvent::Signed {
            hash: signed.hash(),
        });
        Ok(signed)
    }

    async fn dispatch(&self, signed: SignedOperation) -> Result<Outcome, UserOpError> {
        let deploys = signed.deploys_account();
        let sender = signed.user_op().sender;

        let submitted = match submit(self.bundler.as_ref(), signed).await {
            Ok(submitted) => submitted,
            Err(err) => {
                if let UserOpError::InsufficientPrefund {
                    sender, required, ..
                } = &err
                {
                    self.events.emit(PipelineEvent::FundingNeeded {
                        address: *sender,
                        required: *required,
                    });
                }
                return Err(err);
            }
        };

        let user_op_hash = submitted.user_op_hash();
        self.events.emit(PipelineEvent::Submitted { user_op_hash });

        let outcome = self
            .poller
            .poll_with(self.bundler.as_ref(), user_op_hash, |attempt| {
                self.events.emit(PipelineEvent::PollAttempt {
                    user_op_hash,
                    attempt,
                })
            })
            .await;

        match &outcome {
            Outcome::Confirmed(receipt) => {
                if deploys {
                    self.record_deployment(sender);
                }
                self.events.emit(PipelineEvent::Confirmed(receipt.clone()));
            }
            Outcome::Failed(receipt) => {
                self.events.emit(PipelineEvent::Failed(receipt.clone()));
            }
            Outcome::Pending { user_op_hash } => {
                self.events.emit(PipelineEvent::Pending {
                    user_op_hash: *user_op_hash,
                });
            }
        }
        Ok(outcome)
    }

    fn record_deployment(&self, address: Address) {
        let key = AccountKey {
            owner: self.owner(),
            factory: self.profile.factory,
            chain_id: self.profile.chain_id,
        };
        if self.registry().mark_deployed(&key) {
            info!("Smart account {:?} is now deployed", address);
            self.events.emit(PipelineEvent::AccountDeployed { address });
        } else {
            debug!("Deployment of {:?} was already recorded", address);
        }
    }

    fn report(&self, degraded: Option<Degradation>) {
        if let Some(degradation) = degraded {
            debug!("Continuing degraded: {}", degradation);
            self.events.emit(PipelineEvent::Degraded(degradation));
        }
    }
}

fn ensure_recipient(recipient: Address) -> Result<(), UserOpError> {
    if recipient.is_zero() {
        return Err(UserOpError::InvalidParameters(
            "recipient must not be the zero address".to_string(),
        ));
    }
    Ok(())
}

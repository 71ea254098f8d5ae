// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, H256, U256};
use ethers::utils::{format_units, parse_units};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use arka_userop::{
    Asset, BundlerClient, DelegatedSigner, LocalKeySigner, NetworkKey, NetworkProfile,
    NetworkRegistry, OperationSigner, Outcome, PaymasterClient, Pipeline, PipelineConfig,
    PipelineEvent, TransferIntent, UserOpError,
};

type CliPipeline = Pipeline<Provider<Http>, BundlerClient>;

const FUNDING_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const FUNDING_CHECKS: u32 = 60;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, value_enum, default_value_t = NetworkKey::Monad)]
    network: NetworkKey,

    /// Overrides the network's default node endpoint.
    #[clap(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Overrides the network's default bundler endpoint.
    #[clap(long, env = "BUNDLER_URL")]
    bundler_url: Option<String>,

    #[clap(long, env = "BUNDLER_API_KEY", hide_env_values = true)]
    bundler_api_key: Option<String>,

    /// Sponsorship endpoint; without it the account pays its own gas.
    #[clap(long, env = "PAYMASTER_URL")]
    paymaster_url: Option<String>,

    #[clap(long, env = "OWNER_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Sign through the node's `eth_sign` as this account. Takes precedence
    /// over `OWNER_PRIVATE_KEY`.
    #[clap(long)]
    admin: Option<Address>,

    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the smart account address, deployment state and balances.
    Account,
    /// Deploy the smart account.
    Deploy {
        #[clap(long)]
        wait_for_funding: bool,
    },
    /// Send tokens or native currency out of the smart account.
    Transfer {
        #[clap(long)]
        to: Address,
        /// Decimal amount, e.g. 12.5
        #[clap(long)]
        amount: String,
        #[clap(long, conflicts_with = "token")]
        native: bool,
        /// ERC-20 to send; defaults to the network's USDC.
        #[clap(long)]
        token: Option<Address>,
        /// Required with a custom --token.
        #[clap(long)]
        decimals: Option<u8>,
        #[clap(long)]
        wait_for_funding: bool,
    },
    /// Move the whole USDC balance out of the smart account.
    Recover {
        #[clap(long)]
        to: Address,
        #[clap(long)]
        wait_for_funding: bool,
    },
    /// Look up the receipt of a previously submitted operation.
    Receipt { hash: H256 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = NetworkRegistry::builtin(args.bundler_api_key.as_deref())?;
    let mut profile = registry
        .get(args.network)
        .cloned()
        .ok_or_else(|| anyhow!("network {} is not configured", args.network))?;
    if let Some(url) = &args.rpc_url {
        profile.rpc_url = url.clone();
    }
    if let Some(url) = &args.bundler_url {
        profile.bundler_url = url.clone();
    }

    let config = PipelineConfig::default();
    let client = Arc::new(Provider::<Http>::try_from(profile.rpc_url.as_str())?);

    let signer = select_signer(client.clone(), args.admin, args.private_key.as_deref())?;

    let bundler = Arc::new(BundlerClient::new(
        &profile.bundler_url,
        profile.fee_oracle_method.clone(),
        config.rpc_timeout,
    )?);

    let paymaster = match &args.paymaster_url {
        Some(url) => Some(PaymasterClient::new(url, config.rpc_timeout)?),
        None => None,
    };

    info!(
        "Using {} (chain {}) as owner {:?}",
        profile.name,
        profile.chain_id,
        signer.address()
    );

    let mut pipeline = Pipeline::new(profile.clone(), client, bundler, signer, config);
    if let Some(paymaster) = paymaster {
        pipeline = pipeline.with_paymaster(Arc::new(paymaster));
    }
    spawn_event_logger(&pipeline);

    match args.command {
        Command::Account => show_account(&pipeline).await,
        Command::Deploy { wait_for_funding } => {
            let result = pipeline.deploy().await;
            finish(&pipeline, result, wait_for_funding).await
        }
        Command::Transfer {
            to,
            amount,
            native,
            token,
            decimals,
            wait_for_funding,
        } => {
            let (asset, decimals) = select_asset(&profile, native, token, decimals)?;
            let intent = TransferIntent {
                asset,
                recipient: to,
                amount: parse_amount(&amount, decimals)?,
            };
            let result = pipeline.transfer(intent).await;
            finish(&pipeline, result, wait_for_funding).await
        }
        Command::Recover {
            to,
            wait_for_funding,
        } => {
            let result = pipeline.recover(to).await;
            finish(&pipeline, result, wait_for_funding).await
        }
        Command::Receipt { hash } => match pipeline.receipt(hash).await? {
            Some(receipt) => {
                report(&profile, &Outcome::from_receipt(receipt));
                Ok(())
            }
            None => {
                println!("No receipt yet for {:#x}", hash);
                Ok(())
            }
        },
    }
}

fn spawn_event_logger(pipeline: &CliPipeline) {
    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::PollAttempt { attempt, .. } => {
                    debug!("Waiting for receipt (attempt {})", attempt)
                }
                PipelineEvent::Degraded(degradation) => debug!("Degraded: {}", degradation),
                PipelineEvent::AccountDeployed { address } => {
                    info!("Smart account {:?} deployed", address)
                }
                other => debug!("{:?}", other),
            }
        }
    });
}

fn select_signer(
    client: Arc<Provider<Http>>,
    admin: Option<Address>,
    private_key: Option<&str>,
) -> anyhow::Result<Arc<dyn OperationSigner>> {
    match (admin, private_key) {
        (Some(admin), _) => Ok(Arc::new(DelegatedSigner::new(client, admin))),
        (None, Some(key)) => Ok(Arc::new(LocalKeySigner::from_private_key(key)?)),
        (None, None) => bail!("set OWNER_PRIVATE_KEY or pass --admin"),
    }
}

fn select_asset(
    profile: &NetworkProfile,
    native: bool,
    token: Option<Address>,
    decimals: Option<u8>,
) -> anyhow::Result<(Asset, u8)> {
    if native {
        return Ok((Asset::Native, profile.native_currency.decimals));
    }
    match token.map(Asset::from_address) {
        None => Ok((
            Asset::Token(profile.recoverable_asset.address),
            profile.recoverable_asset.decimals,
        )),
        Some(Asset::Native) => Ok((Asset::Native, profile.native_currency.decimals)),
        Some(Asset::Token(address)) if address == profile.recoverable_asset.address => {
            Ok((Asset::Token(address), profile.recoverable_asset.decimals))
        }
        Some(Asset::Token(address)) => {
            let decimals = decimals.ok_or_else(|| anyhow!("--decimals is required for {:?}", address))?;
            Ok((Asset::Token(address), decimals))
        }
    }
}

fn parse_amount(amount: &str, decimals: u8) -> anyhow::Result<U256> {
    let value: U256 = parse_units(amount.trim(), u32::from(decimals))
        .map_err(|e| anyhow!("invalid amount {amount}: {e}"))?
        .into();
    if value.is_zero() {
        bail!("amount must be greater than zero");
    }
    Ok(value)
}

async fn show_account(pipeline: &CliPipeline) -> anyhow::Result<()> {
    let profile = pipeline.profile();
    let account = pipeline.resolve_account().await?;

    let native = pipeline.balance(account.address, Asset::Native).await?;
    let usdc = pipeline
        .balance(account.address, Asset::Token(profile.recoverable_asset.address))
        .await?;

    println!("Owner:          {:?}", account.owner);
    println!("Smart account:  {:?}", account.address);
    println!("Deployment:     {:?}", account.deployment);
    println!(
        "{:<15} {}",
        format!("{}:", profile.native_currency.symbol),
        format_units(native, u32::from(profile.native_currency.decimals))?
    );
    println!(
        "{:<15} {}",
        format!("{}:", profile.recoverable_asset.symbol),
        format_units(usdc, u32::from(profile.recoverable_asset.decimals))?
    );
    Ok(())
}

async fn finish(
    pipeline: &CliPipeline,
    result: Result<Outcome, UserOpError>,
    wait_for_funding: bool,
) -> anyhow::Result<()> {
    let profile = pipeline.profile();
    match result {
        Ok(outcome) => {
            report(profile, &outcome);
            Ok(())
        }
        Err(UserOpError::InsufficientPrefund {
            sender,
            required,
            operation,
            ..
        }) => {
            let symbol = &profile.native_currency.symbol;
            let decimals = u32::from(profile.native_currency.decimals);
            println!("The smart account cannot pay for gas.");
            println!(
                "Send at least {} {} to {:?} on {}.",
                format_units(required, decimals)?,
                symbol,
                sender,
                profile.name
            );
            if !wait_for_funding {
                bail!("smart account {:?} needs funding", sender);
            }

            await_funding(pipeline, sender, required).await?;
            let outcome = pipeline.resubmit(*operation).await?;
            report(profile, &outcome);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn await_funding(pipeline: &CliPipeline, sender: Address, required: U256) -> anyhow::Result<()> {
    for _ in 0..FUNDING_CHECKS {
        tokio::time::sleep(FUNDING_CHECK_INTERVAL).await;
        match pipeline.balance(sender, Asset::Native).await {
            Ok(balance) if balance >= required => {
                info!("Smart account {:?} funded, resubmitting", sender);
                return Ok(());
            }
            Ok(balance) => debug!("Balance {} below {}", balance, required),
            Err(err) => warn!("Balance check failed: {}", err),
        }
    }
    bail!("smart account {:?} was not funded in time", sender)
}

fn report(profile: &NetworkProfile, outcome: &Outcome) {
    match outcome {
        Outcome::Confirmed(receipt) => {
            println!("Confirmed: {:#x}", receipt.user_op_hash);
            if let Some(tx) = receipt.transaction_hash {
                println!("Transaction: {}", profile.explorer_tx_url(tx));
            }
        }
        Outcome::Failed(receipt) => {
            println!(
                "Operation {:#x} reverted: {}",
                receipt.user_op_hash,
                receipt.reason.as_deref().unwrap_or("no reason given")
            );
        }
        Outcome::Pending { user_op_hash } => {
            println!("Still pending: {:#x}", user_op_hash);
            println!("Check later with: arka-userop receipt {:#x}", user_op_hash);
        }
    }
}

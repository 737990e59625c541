//! web3-state CLI - Wallet provider sessions from the terminal.
//!
//! Drives the per-family provider state against the on-disk store, so the
//! selected wallet and account survive between invocations.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use web3_state::config::CONFIG_ENV;
use web3_state::error::{ConfigError, Error, Result};
use web3_state::prelude::*;

/// web3-state - Multi-chain wallet provider state
#[derive(Parser)]
#[command(name = "web3-state")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init(InitArgs),

    /// Connect a wallet and make it the active provider
    Connect(ConnectArgs),

    /// Disconnect a wallet
    Disconnect(ProviderArgs),

    /// Move a wallet session to another chain
    SwitchChain(SwitchChainArgs),

    /// Show the active provider, chain and account
    Status(StatusArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Family {
    Evm,
    Flow,
    Solana,
}

/// Arguments for the init command
#[derive(Args)]
struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

/// Arguments naming one provider of one family
#[derive(Args)]
struct ProviderArgs {
    /// Chain family
    #[arg(value_enum)]
    family: Family,

    /// Provider type (e.g. MetaMask, Phantom, Blocto)
    provider: String,
}

/// Arguments for the connect command
#[derive(Args)]
struct ConnectArgs {
    #[command(flatten)]
    target: ProviderArgs,

    /// Chain id, decimal or 0x-hex (defaults to the family default)
    #[arg(long)]
    chain: Option<String>,

    /// Account address to connect
    #[arg(short, long)]
    address: Option<String>,

    /// Do not prompt the wallet user
    #[arg(short, long)]
    silent: bool,
}

/// Arguments for the switch-chain command
#[derive(Args)]
struct SwitchChainArgs {
    #[command(flatten)]
    target: ProviderArgs,

    /// Target chain id, decimal or 0x-hex
    chain: String,
}

/// Arguments for the status command
#[derive(Args)]
struct StatusArgs {
    /// Only show this family
    #[arg(value_enum)]
    family: Option<Family>,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

/// What to do with one family's provider state.
enum Action {
    Connect {
        provider: String,
        chain: Option<String>,
        address: Option<String>,
        silent: bool,
    },
    Disconnect {
        provider: String,
    },
    SwitchChain {
        provider: String,
        chain: String,
    },
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "web3_state={level},web3_state_cli={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.unwrap_or_else(config_path);

    match cli.command {
        Commands::Init(args) => cmd_init(&config_file, args).await,
        Commands::Config(args) => cmd_config(&config_file, args).await,
        Commands::Connect(args) => {
            let action = Action::Connect {
                provider: args.target.provider,
                chain: args.chain,
                address: args.address,
                silent: args.silent,
            };
            cmd_family(&config_file, args.target.family, action).await
        }
        Commands::Disconnect(args) => {
            let action = Action::Disconnect {
                provider: args.provider,
            };
            cmd_family(&config_file, args.family, action).await
        }
        Commands::SwitchChain(args) => {
            let action = Action::SwitchChain {
                provider: args.target.provider,
                chain: args.chain,
            };
            cmd_family(&config_file, args.target.family, action).await
        }
        Commands::Status(args) => {
            let families = match args.family {
                Some(family) => vec![family],
                None => vec![Family::Evm, Family::Flow, Family::Solana],
            };
            for family in families {
                cmd_family(&config_file, family, Action::Status).await?;
            }
            Ok(())
        }
    }
}

/// Initialize configuration.
async fn cmd_init(config_file: &Path, args: InitArgs) -> Result<()> {
    if config_file.exists() && !args.force {
        println!("Configuration already exists at: {}", config_file.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    let config = init_config(config_file, args.force).await?;

    println!("Configuration created: {}", config_file.display());
    println!();
    println!("Next steps:");
    println!(
        "  1. export {}=<mnemonic> to use the in-app wallet",
        config.local_wallet.mnemonic_env
    );
    println!("  2. web3-state connect evm MaskWallet");
    println!("  3. web3-state status");

    Ok(())
}

/// Manage configuration.
async fn cmd_config(config_file: &Path, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            let config = load_config(config_file).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Validate => {
            let config = load_config(config_file).await?;
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration is valid");
            }
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|issue| issue.level == IssueLevel::Error) {
                return Err(ConfigError::invalid("configuration has errors").into());
            }
        }
    }

    Ok(())
}

/// Build one family's provider state and run `action` on it.
async fn cmd_family(config_file: &Path, family: Family, action: Action) -> Result<()> {
    let config = load_config(config_file).await?;
    let store: Arc<dyn KvStore> = Arc::new(FileStore::new(&config.storage_dir));

    match family {
        Family::Evm => {
            let capabilities = config.evm.apply(evm::capabilities());
            let mut registry = watch_registry(&capabilities);
            if let Some(local) = config.local_wallet.connector()? {
                registry.register(evm::ProviderType::MaskWallet, local);
            }
            run_action(capabilities, registry, store, action).await
        }
        Family::Flow => {
            let capabilities = config.flow.apply(flow::capabilities());
            let registry = watch_registry(&capabilities);
            run_action(capabilities, registry, store, action).await
        }
        Family::Solana => {
            let capabilities = config.solana.apply(solana::capabilities());
            let registry = watch_registry(&capabilities);
            run_action(capabilities, registry, store, action).await
        }
    }
}

/// A host-driven connector for every provider type of the family.
fn watch_registry<F: ChainFamily>(
    capabilities: &Capabilities<F>,
) -> ProviderRegistry<F::ProviderType> {
    let mut registry = ProviderRegistry::new();
    for &provider_type in F::PROVIDER_TYPES {
        registry.register(
            provider_type,
            WatchConnector::new(provider_type.to_string(), capabilities.is_valid_address),
        );
    }
    registry
}

async fn run_action<F: ChainFamily>(
    capabilities: Capabilities<F>,
    registry: ProviderRegistry<F::ProviderType>,
    store: Arc<dyn KvStore>,
    action: Action,
) -> Result<()> {
    let state = ProviderState::init(capabilities, registry, store).await?;

    match action {
        Action::Connect {
            provider,
            chain,
            address,
            silent,
        } => {
            let provider: F::ProviderType = provider.parse()?;
            resume_previous(&state, provider).await;
            let chain_id = match chain {
                Some(chain) => chain.parse::<ChainId>()?,
                None => state.capabilities().default_chain_id,
            };
            let account = state
                .connect(provider, chain_id, address.as_deref(), None, silent)
                .await?;
            println!(
                "Connected {provider} on chain {} as {}",
                account.chain_id, account.address
            );
        }
        Action::Disconnect { provider } => {
            let provider: F::ProviderType = provider.parse()?;
            if state.provider_type().get() == provider {
                state.restore().await?;
            }
            state.disconnect(provider).await?;
            println!("Disconnected {provider}");
        }
        Action::SwitchChain { provider, chain } => {
            let provider: F::ProviderType = provider.parse()?;
            let chain_id: ChainId = chain.parse()?;
            if state.provider_type().get() != provider {
                return Err(Error::internal(format!(
                    "{provider} is not the active {} provider",
                    F::NAME
                )));
            }
            state.restore().await?;
            state.switch_chain(provider, chain_id).await?;
            println!("{provider} switched to chain {chain_id}");
        }
        Action::Status => {
            println!("{}", serde_json::to_string_pretty(&state.snapshot())?);
        }
    }

    Ok(())
}

/// Re-attach the persisted session of the provider being switched away
/// from, so that `connect` can close it before opening `next`.
async fn resume_previous<F: ChainFamily>(state: &ProviderState<F>, next: F::ProviderType) {
    let previous = state.provider_type().get();
    if previous == next {
        return;
    }
    if let Err(error) = state.restore().await {
        tracing::warn!(
            family = F::NAME,
            provider = %previous,
            %error,
            "could not resume previous session",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000b0";

    struct Run {
        metamask: Arc<WatchConnector>,
        coin98: Arc<WatchConnector>,
    }

    impl Run {
        fn new() -> Self {
            Self {
                metamask: Arc::new(WatchConnector::new("MetaMask", evm::is_valid_address)),
                coin98: Arc::new(WatchConnector::new("Coin98", evm::is_valid_address)),
            }
        }

        async fn state(&self, store: &Arc<dyn KvStore>) -> ProviderState<Evm> {
            let mut registry = ProviderRegistry::new();
            registry.register_shared(evm::ProviderType::MetaMask, self.metamask.clone());
            registry.register_shared(evm::ProviderType::Coin98, self.coin98.clone());
            ProviderState::init(evm::capabilities(), registry, Arc::clone(store))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_connect_closes_session_from_previous_run() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        {
            let state = Run::new().state(&store).await;
            state
                .connect(evm::ProviderType::MetaMask, evm::chain::MAINNET, Some(ADDRESS), None, false)
                .await
                .unwrap();
        }

        // Every invocation starts with fresh connectors.
        let run = Run::new();
        let state = run.state(&store).await;
        resume_previous(&state, evm::ProviderType::Coin98).await;
        assert!(run.metamask.connected());

        state
            .connect(evm::ProviderType::Coin98, evm::chain::MAINNET, Some(ADDRESS), None, false)
            .await
            .unwrap();
        assert!(!run.metamask.connected());
        assert!(run.coin98.connected());
    }

    #[tokio::test]
    async fn test_resume_skips_same_provider() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        {
            let state = Run::new().state(&store).await;
            state
                .connect(evm::ProviderType::MetaMask, evm::chain::MAINNET, Some(ADDRESS), None, false)
                .await
                .unwrap();
        }

        let run = Run::new();
        let state = run.state(&store).await;
        resume_previous(&state, evm::ProviderType::MetaMask).await;
        assert!(!run.metamask.connected());
    }
}

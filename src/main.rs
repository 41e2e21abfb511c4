//! Multisig engine CLI application
//!
//! A command-line interface for deploying and operating multisig wallets.

use clap::{Parser, Subcommand};
use multisig_engine::api::{create_router, ApiState};
use multisig_engine::cli::{self, AppState};
use multisig_engine::crypto::Address;
use multisig_engine::multisig::TxId;
use multisig_engine::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "multisig")]
#[command(version)]
#[command(about = "Multi-signature wallet engine", long_about = None)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ledger
    Init {
        /// Overwrite an existing ledger
        #[arg(long)]
        force: bool,
    },

    /// Account operations
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Factory operations
    Factory {
        #[command(subcommand)]
        action: FactoryCommands,
    },

    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// REST API server
    Api {
        #[command(subcommand)]
        action: ApiCommands,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Generate a new random account address
    New,

    /// Credit native value to an account
    Fund {
        #[arg(short, long)]
        address: Address,

        #[arg(short = 'n', long)]
        amount: u128,
    },

    /// Show an account's balance
    Balance {
        #[arg(short, long)]
        address: Address,
    },
}

#[derive(Subcommand)]
enum FactoryCommands {
    /// Deploy a new factory
    Deploy {
        /// Deploying account (becomes the factory owner)
        #[arg(long)]
        deployer: Address,
    },

    /// Create a wallet through a factory
    Create {
        /// Factory address
        #[arg(short, long)]
        factory: Address,

        /// Owners (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        owners: Vec<Address>,

        /// Required confirmations
        #[arg(short, long)]
        quorum: u32,
    },

    /// Show factory details
    Info {
        #[arg(short, long)]
        factory: Address,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Deploy a wallet directly
    Deploy {
        #[arg(long)]
        deployer: Address,

        /// Owners (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        owners: Vec<Address>,

        /// Required confirmations
        #[arg(short, long)]
        quorum: u32,
    },

    /// List all wallets
    List,

    /// Show wallet details
    Info {
        #[arg(short, long)]
        wallet: Address,
    },

    /// Propose a transaction
    Propose {
        #[arg(short, long)]
        wallet: Address,

        /// Proposing owner
        #[arg(short, long)]
        caller: Address,

        #[arg(short, long)]
        target: Address,

        #[arg(short = 'n', long, default_value = "0")]
        value: u128,

        /// Hex-encoded payload
        #[arg(short, long)]
        payload: Option<String>,
    },

    /// Propose adding or removing an owner
    ProposeOwnerUpdate {
        #[arg(short, long)]
        wallet: Address,

        /// Proposing owner
        #[arg(short, long)]
        caller: Address,

        /// Owner to add or remove
        #[arg(short, long)]
        owner: Address,

        /// Remove instead of add
        #[arg(long)]
        remove: bool,
    },

    /// Confirm a transaction
    Confirm {
        #[arg(short, long)]
        wallet: Address,

        #[arg(short, long)]
        caller: Address,

        #[arg(short, long)]
        id: TxId,
    },

    /// Execute a transaction
    Execute {
        #[arg(short, long)]
        wallet: Address,

        #[arg(short, long)]
        id: TxId,
    },

    /// Show a transaction
    Tx {
        #[arg(short, long)]
        wallet: Address,

        #[arg(short, long)]
        id: TxId,
    },

    /// Show the wallet's event log
    Events {
        #[arg(short, long)]
        wallet: Address,

        /// First sequence number to show
        #[arg(short, long, default_value = "0")]
        since: usize,
    },
}

#[derive(Subcommand)]
enum ApiCommands {
    /// Start the REST API server
    Start {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Commands that don't need the loaded ledger
    match &cli.command {
        Commands::Init { force } => return cli::cmd_init(&cli.data_dir, *force),
        Commands::Account {
            action: AccountCommands::New,
        } => return cli::cmd_account_new(),
        Commands::Api { action } => return run_api_command(action, &cli.data_dir),
        _ => {}
    }

    // Initialize application state
    let mut state = AppState::new(cli.data_dir.clone())?;

    // Process commands
    match cli.command {
        Commands::Init { .. } | Commands::Api { .. } => unreachable!(),
        Commands::Account { action } => match action {
            AccountCommands::New => unreachable!(),
            AccountCommands::Fund { address, amount } => {
                cli::cmd_account_fund(&mut state, &address, amount)?;
            }
            AccountCommands::Balance { address } => {
                cli::cmd_account_balance(&state, &address)?;
            }
        },
        Commands::Factory { action } => match action {
            FactoryCommands::Deploy { deployer } => {
                cli::cmd_factory_deploy(&mut state, &deployer)?;
            }
            FactoryCommands::Create {
                factory,
                owners,
                quorum,
            } => {
                cli::cmd_factory_create(&mut state, &factory, owners, quorum)?;
            }
            FactoryCommands::Info { factory } => {
                cli::cmd_factory_info(&state, &factory)?;
            }
        },
        Commands::Wallet { action } => match action {
            WalletCommands::Deploy {
                deployer,
                owners,
                quorum,
            } => {
                cli::cmd_wallet_deploy(&mut state, &deployer, owners, quorum)?;
            }
            WalletCommands::List => {
                cli::cmd_wallet_list(&state)?;
            }
            WalletCommands::Info { wallet } => {
                cli::cmd_wallet_info(&state, &wallet)?;
            }
            WalletCommands::Propose {
                wallet,
                caller,
                target,
                value,
                payload,
            } => {
                cli::cmd_wallet_propose(
                    &mut state,
                    &wallet,
                    &caller,
                    &target,
                    value,
                    payload.as_deref(),
                )?;
            }
            WalletCommands::ProposeOwnerUpdate {
                wallet,
                caller,
                owner,
                remove,
            } => {
                cli::cmd_wallet_propose_owner_update(&mut state, &wallet, &caller, &owner, remove)?;
            }
            WalletCommands::Confirm { wallet, caller, id } => {
                cli::cmd_wallet_confirm(&mut state, &wallet, &caller, id)?;
            }
            WalletCommands::Execute { wallet, id } => {
                cli::cmd_wallet_execute(&mut state, &wallet, id)?;
            }
            WalletCommands::Tx { wallet, id } => {
                cli::cmd_wallet_tx(&state, &wallet, id)?;
            }
            WalletCommands::Events { wallet, since } => {
                cli::cmd_wallet_events(&state, &wallet, since)?;
            }
        },
    }

    Ok(())
}

fn run_api_command(action: &ApiCommands, data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            ApiCommands::Start { port } => {
                // Initialize storage
                let storage = Arc::new(Storage::new(StorageConfig::in_dir(data_dir))?);

                // Load or create ledger
                let ledger = Arc::new(storage.load_or_default()?);
                println!(
                    "📂 Ledger loaded: {} wallet(s), {} factory(ies)",
                    ledger.wallets().len(),
                    ledger.factories().len()
                );

                let state = ApiState::new(ledger, storage);

                // Save on Ctrl+C
                let shutdown_state = state.clone();
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    println!("\n📴 Shutting down, saving ledger...");

                    match shutdown_state.storage.save(&shutdown_state.ledger) {
                        Ok(()) => println!("✅ Data saved successfully!"),
                        Err(e) => log::error!("Failed to save ledger: {}", e),
                    }
                    std::process::exit(0);
                });

                let app = create_router(state);

                let addr = format!("0.0.0.0:{}", port);
                println!("🚀 REST API server starting on http://localhost:{}", port);
                println!("   WebSocket events at ws://localhost:{}/ws", port);

                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}

//! CLI commands for the multisig engine
//!
//! Implements all command handlers for the CLI interface. Each command loads
//! the ledger from the data directory and saves it back after mutating it.

use crate::crypto::Address;
use crate::dispatch::Ledger;
use crate::multisig::{
    ExecutionOutcome, MultisigFactory, MultisigWallet, TxId, TxStatus, WalletCall, WalletEvent,
};
use crate::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub ledger: Ledger,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize application state
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let storage = Storage::new(StorageConfig::in_dir(&data_dir))?;

        // Load or create ledger
        let ledger = if storage.exists() {
            log::debug!("Loading ledger from {:?}", storage.ledger_path());
            storage.load()?
        } else {
            println!("🆕 Creating new ledger...");
            let ledger = Ledger::new();
            storage.save(&ledger)?;
            ledger
        };

        Ok(Self {
            ledger,
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.ledger)?;
        Ok(())
    }

    fn wallet(&self, address: &Address) -> CliResult<Arc<MultisigWallet>> {
        Ok(self
            .ledger
            .wallet(address)
            .ok_or_else(|| format!("Wallet not found: {}", address))?)
    }

    fn factory(&self, address: &Address) -> CliResult<Arc<MultisigFactory>> {
        Ok(self
            .ledger
            .factory(address)
            .ok_or_else(|| format!("Factory not found: {}", address))?)
    }
}

/// Initialize a new ledger
pub fn cmd_init(data_dir: &Path, force: bool) -> CliResult<()> {
    let storage = Storage::new(StorageConfig::in_dir(data_dir))?;

    if storage.exists() && !force {
        println!("⚠️  Ledger already exists at {:?}", data_dir);
        println!("   Use --force to reinitialize (this will delete existing data)");
        return Ok(());
    }

    storage.delete()?;
    storage.save(&Ledger::new())?;

    println!("✅ Ledger initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    Ok(())
}

// ============================================================================
// Accounts
// ============================================================================

/// Generate a fresh account address
pub fn cmd_account_new() -> CliResult<()> {
    let address = Address::random();
    println!("🔐 New account: {}", address);
    Ok(())
}

/// Credit native value to an account
pub fn cmd_account_fund(state: &mut AppState, address: &Address, amount: u128) -> CliResult<()> {
    let balance = state.ledger.fund(address, amount)?;
    state.save()?;

    println!("💰 Funded {} with {}", address, amount);
    println!("   New balance: {}", balance);
    Ok(())
}

/// Show an account's native balance
pub fn cmd_account_balance(state: &AppState, address: &Address) -> CliResult<()> {
    println!("💰 Balance of {}: {}", address, state.ledger.balance_of(address));
    Ok(())
}

// ============================================================================
// Factories
// ============================================================================

/// Deploy a factory
pub fn cmd_factory_deploy(state: &mut AppState, deployer: &Address) -> CliResult<()> {
    let factory = state.ledger.deploy_factory(deployer);
    state.save()?;

    println!("🏭 Factory deployed!");
    println!("   📍 Address: {}", factory.address());
    println!("   👤 Owner: {}", factory.owner());
    Ok(())
}

/// Create a wallet through a factory
pub fn cmd_factory_create(
    state: &mut AppState,
    factory: &Address,
    owners: Vec<Address>,
    quorum: u32,
) -> CliResult<()> {
    let factory = state.factory(factory)?;
    let address = factory.create(&state.ledger, owners, quorum)?;
    state.save()?;

    println!("🔐 Wallet created by factory {}", factory.address());
    print_wallet(&*state.wallet(&address)?, &state.ledger);
    Ok(())
}

/// Show factory details
pub fn cmd_factory_info(state: &AppState, factory: &Address) -> CliResult<()> {
    let factory = state.factory(factory)?;

    println!("🏭 Factory {}", factory.address());
    println!("   👤 Owner: {}", factory.owner());
    println!("   🕐 Created: {}", factory.created_at().to_rfc3339());

    let wallets = factory.wallets_created();
    println!("   Wallets created: {}", wallets.len());
    for wallet in wallets {
        println!("   ├─ {}", wallet);
    }
    Ok(())
}

// ============================================================================
// Wallets
// ============================================================================

fn print_wallet(wallet: &MultisigWallet, ledger: &Ledger) {
    println!("   📍 Address: {}", wallet.address());
    println!("   🔢 Policy: {}", wallet.description());
    println!("   💰 Balance: {}", ledger.balance_of(&wallet.address()));
    println!("   📝 Transactions: {}", wallet.transaction_count());
    println!("   👥 Owners:");
    for (i, owner) in wallet.owners().iter().enumerate() {
        println!("      {}. {}", i, owner);
    }
}

/// Deploy a wallet directly, without a factory
pub fn cmd_wallet_deploy(
    state: &mut AppState,
    deployer: &Address,
    owners: Vec<Address>,
    quorum: u32,
) -> CliResult<()> {
    let wallet = state.ledger.deploy_wallet(deployer, owners, quorum)?;
    state.save()?;

    println!("🔐 Wallet deployed!");
    print_wallet(&wallet, &state.ledger);
    Ok(())
}

/// List all wallets
pub fn cmd_wallet_list(state: &AppState) -> CliResult<()> {
    let wallets = state.ledger.wallets();

    if wallets.is_empty() {
        println!("📭 No wallets found. Create one with 'wallet deploy' or 'factory create'");
        return Ok(());
    }

    println!("🔐 Wallets ({}):", wallets.len());
    for wallet in wallets {
        println!(
            "   {} [{}] balance {}",
            wallet.address(),
            wallet.description(),
            state.ledger.balance_of(&wallet.address())
        );
    }
    Ok(())
}

/// Show wallet details
pub fn cmd_wallet_info(state: &AppState, wallet: &Address) -> CliResult<()> {
    let wallet = state.wallet(wallet)?;
    println!("🔐 Wallet");
    print_wallet(&wallet, &state.ledger);

    let pending: Vec<_> = wallet
        .transactions()
        .into_iter()
        .filter(|tx| !tx.executed())
        .collect();
    if !pending.is_empty() {
        println!("   ⏳ Pending:");
        for tx in pending {
            println!(
                "      #{} → {} value {} ({}/{} confirmations)",
                tx.id,
                tx.target,
                tx.value,
                wallet.confirmation_count(tx.id),
                wallet.required_approvals()
            );
        }
    }
    Ok(())
}

/// Propose a transaction
pub fn cmd_wallet_propose(
    state: &mut AppState,
    wallet: &Address,
    caller: &Address,
    target: &Address,
    value: u128,
    payload: Option<&str>,
) -> CliResult<()> {
    let payload = match payload {
        Some(text) => hex::decode(text.trim_start_matches("0x"))?,
        None => Vec::new(),
    };

    let wallet = state.wallet(wallet)?;
    let id = wallet.propose(caller, *target, value, payload)?;
    state.save()?;

    println!("📝 Transaction #{} proposed", id);
    println!("   ├─ Target: {}", target);
    println!("   └─ Value: {}", value);
    Ok(())
}

/// Propose adding or removing an owner
pub fn cmd_wallet_propose_owner_update(
    state: &mut AppState,
    wallet: &Address,
    caller: &Address,
    owner: &Address,
    remove: bool,
) -> CliResult<()> {
    let wallet = state.wallet(wallet)?;
    let payload = WalletCall::UpdateOwner {
        owner: *owner,
        is_owner: !remove,
    }
    .encode();

    let id = wallet.propose(caller, wallet.address(), 0, payload)?;
    state.save()?;

    let action = if remove { "remove" } else { "add" };
    println!("📝 Transaction #{} proposed: {} owner {}", id, action, owner);
    println!(
        "   Needs {} confirmations before execution",
        wallet.required_approvals()
    );
    Ok(())
}

/// Confirm a transaction
pub fn cmd_wallet_confirm(
    state: &mut AppState,
    wallet: &Address,
    caller: &Address,
    id: TxId,
) -> CliResult<()> {
    let wallet = state.wallet(wallet)?;
    wallet.confirm(caller, id)?;
    state.save()?;

    println!(
        "✍️  {} confirmed #{} ({}/{})",
        caller,
        id,
        wallet.confirmation_count(id),
        wallet.required_approvals()
    );
    Ok(())
}

/// Execute a transaction
pub fn cmd_wallet_execute(state: &mut AppState, wallet: &Address, id: TxId) -> CliResult<()> {
    let wallet = state.wallet(wallet)?;
    let outcome = wallet.execute(id, &state.ledger)?;
    state.save()?;

    match outcome {
        ExecutionOutcome::Succeeded { return_data } => {
            println!("✅ Transaction #{} executed", id);
            if !return_data.is_empty() {
                println!("   Returned: 0x{}", hex::encode(return_data));
            }
        }
        ExecutionOutcome::Failed { reason } => {
            println!("❌ Transaction #{} failed: {}", id, reason);
            println!("   It remains pending and can be executed again");
        }
    }
    Ok(())
}

/// Show a transaction
pub fn cmd_wallet_tx(state: &AppState, wallet: &Address, id: TxId) -> CliResult<()> {
    let wallet = state.wallet(wallet)?;
    let tx = wallet
        .transaction(id)
        .ok_or_else(|| format!("Transaction not found: {}", id))?;

    let status = match tx.status {
        TxStatus::Pending => "pending",
        TxStatus::InProgress => "in progress",
        TxStatus::Executed => "executed",
    };

    println!("📝 Transaction #{}", tx.id);
    println!("   ├─ Target: {}", tx.target);
    println!("   ├─ Value: {}", tx.value);
    println!("   ├─ Payload: 0x{}", hex::encode(&tx.payload));
    if let Ok(call) = WalletCall::decode(&tx.payload) {
        println!("   ├─ Decoded: {:?}", call);
    }
    println!("   ├─ Proposer: {}", tx.proposer);
    println!("   ├─ Status: {}", status);
    println!("   ├─ Failed attempts: {}", tx.failed_attempts);
    println!(
        "   └─ Confirmations: {}/{}",
        wallet.confirmation_count(id),
        wallet.required_approvals()
    );
    for confirmer in wallet.confirmers(id) {
        let note = if wallet.is_owner(&confirmer) {
            ""
        } else {
            " (no longer an owner)"
        };
        println!("      ✍️  {}{}", confirmer, note);
    }
    Ok(())
}

/// Print the wallet's event log
pub fn cmd_wallet_events(state: &AppState, wallet: &Address, since: usize) -> CliResult<()> {
    let wallet = state.wallet(wallet)?;
    let records = wallet.events_since(since);

    if records.is_empty() {
        println!("📭 No events");
        return Ok(());
    }

    for record in records {
        let line = match &record.event {
            WalletEvent::Proposed {
                target, value, id, ..
            } => format!("Proposed #{} → {} value {}", id, target, value),
            WalletEvent::Confirmed { owner, id } => format!("Confirmed #{} by {}", id, owner),
            WalletEvent::ExecutionSucceeded { id } => format!("ExecutionSucceeded #{}", id),
            WalletEvent::ExecutionFailed { id } => format!("ExecutionFailed #{}", id),
            WalletEvent::OwnerAdded { owner } => format!("OwnerAdded {}", owner),
            WalletEvent::OwnerRemoved { owner } => format!("OwnerRemoved {}", owner),
        };
        println!(
            "   [{}] {} {}",
            record.sequence,
            record.emitted_at.format("%Y-%m-%d %H:%M:%S"),
            line
        );
    }
    Ok(())
}

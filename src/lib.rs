//! Multisig engine: M-of-N wallets governed by their own owners
//!
//! This crate provides:
//! - Multi-signature wallets with a propose / confirm / execute flow
//! - Self-governance: owners change only through wallet-approved
//!   `updateOwner` calls
//! - A factory that validates owner sets and deploys wallets
//! - An in-process ledger that holds balances and dispatches approved actions
//! - JSON persistence with rotating backups
//! - A CLI and a REST/WebSocket API
//!
//! # Example
//!
//! ```rust
//! use multisig_engine::crypto::Address;
//! use multisig_engine::dispatch::Ledger;
//!
//! let ledger = Ledger::new();
//! let (o1, o2, o3) = (Address::random(), Address::random(), Address::random());
//!
//! // Deploy a factory and create a 2-of-3 wallet
//! let factory = ledger.deploy_factory(&o1);
//! let address = factory.create(&ledger, vec![o1, o2, o3], 2).unwrap();
//! let wallet = ledger.wallet(&address).unwrap();
//! ledger.fund(&address, 1_000).unwrap();
//!
//! // Propose a transfer and collect confirmations
//! let recipient = Address::random();
//! let id = wallet.propose(&o1, recipient, 400, vec![]).unwrap();
//! wallet.confirm(&o1, id).unwrap();
//! wallet.confirm(&o2, id).unwrap();
//!
//! // Anyone can execute once quorum is reached
//! let outcome = wallet.execute(id, &ledger).unwrap();
//! assert!(outcome.is_success());
//! assert_eq!(ledger.balance_of(&recipient), 400);
//! ```

pub mod api;
pub mod cli;
pub mod crypto;
pub mod dispatch;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use crypto::Address;
pub use dispatch::{DispatchError, Dispatcher, Ledger};
pub use multisig::{
    ExecutionOutcome, MultisigConfig, MultisigError, MultisigFactory, MultisigWallet, WalletCall,
    WalletEvent,
};
pub use storage::Storage;

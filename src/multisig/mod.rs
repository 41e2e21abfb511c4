//! Multi-signature wallets
//!
//! An M-of-N wallet executes an action only after M of its N owners have
//! confirmed it. Owners change through the same flow: a transaction that
//! targets the wallet itself with an `updateOwner` call.
//!
//! # Example
//!
//! ```ignore
//! use multisig_engine::dispatch::Ledger;
//!
//! let ledger = Ledger::new();
//! let factory = ledger.deploy_factory(&deployer);
//!
//! // Create a 2-of-3 wallet
//! let address = factory.create(&ledger, vec![o1, o2, o3], 2)?;
//! let wallet = ledger.wallet(&address).unwrap();
//!
//! // Propose, collect confirmations, execute
//! let id = wallet.propose(&o1, recipient, 1_000, vec![])?;
//! wallet.confirm(&o1, id)?;
//! wallet.confirm(&o2, id)?;
//! wallet.execute(id, &ledger)?;
//! ```

pub mod amount;
pub mod call;
pub mod events;
pub mod factory;
pub mod transaction;
pub mod wallet;

pub use call::{DecodeError, WalletCall};
pub use events::{EventLog, EventRecord, FactoryEvent, WalletEvent};
pub use factory::{FactorySnapshot, MultisigFactory};
pub use transaction::{Confirmations, Transaction, TxId, TxStatus};
pub use wallet::{
    Capability, ExecutionOutcome, MultisigConfig, MultisigError, MultisigWallet, WalletSnapshot,
};

//! Action dispatch
//!
//! A wallet never performs its approved actions itself. It hands
//! `(sender, target, value, payload)` to a [`Dispatcher`], which either
//! accepts the action (returning opaque result bytes) or rejects it.
//!
//! [`Ledger`] is the in-process dispatcher: it tracks native balances,
//! hosts deployed wallets and factories, and routes payloads addressed to
//! a wallet back into that wallet's call interface.

pub mod ledger;

use crate::crypto::Address;
use crate::multisig::call::DecodeError;
use crate::multisig::MultisigError;
use thiserror::Error;

pub use ledger::{Ledger, LedgerSnapshot};

/// Reasons a dispatched action fails
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },
    #[error("Balance overflow for {0}")]
    BalanceOverflow(Address),
    #[error("Malformed call: {0}")]
    Decode(#[from] DecodeError),
    #[error("Call reverted: {0}")]
    Reverted(#[from] MultisigError),
    #[error("Call rejected: {0}")]
    Rejected(String),
}

/// Delivers an approved action to its target
pub trait Dispatcher {
    /// Deliver `value` and `payload` from `sender` to `target`
    ///
    /// `Err` means the action failed as a whole; any value transfer it
    /// started must be undone before returning.
    fn invoke(
        &self,
        sender: &Address,
        target: &Address,
        value: u128,
        payload: &[u8],
    ) -> Result<Vec<u8>, DispatchError>;
}

//! Multi-signature wallet implementation
//!
//! A wallet holds an owner set and a quorum. Owners propose actions,
//! confirm them, and once `quorum` current owners have confirmed, anyone
//! may execute the action through a [`Dispatcher`].
//!
//! The owner set itself can only change through `update_owner`, which
//! accepts calls from the wallet's own address. The only way to produce
//! such a call is a transaction that targets the wallet with an encoded
//! [`WalletCall::UpdateOwner`] payload, so owner changes go through the
//! same approval flow as everything else.

use crate::crypto::Address;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::multisig::call::WalletCall;
use crate::multisig::events::{EventLog, EventRecord, WalletEvent};
use crate::multisig::transaction::{Confirmations, Transaction, TxId, TxStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Capability a caller lacked
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Membership in the owner set
    Owner,
    /// Being the wallet's own address
    WalletSelf,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Owner => write!(f, "an owner"),
            Capability::WalletSelf => write!(f, "the wallet itself"),
        }
    }
}

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Unauthorized: {caller} is not {required}")]
    Unauthorized {
        caller: Address,
        required: Capability,
    },
    #[error("Transaction not found: {0}")]
    NotFound(TxId),
    #[error("Transaction already executed: {0}")]
    AlreadyExecuted(TxId),
    #[error("Transaction {0} is already being executed")]
    ExecutionInProgress(TxId),
    #[error("Insufficient approvals for transaction {id}: have {have}, need {need}")]
    InsufficientApprovals { id: TxId, have: usize, need: u32 },
    #[error("Duplicate owner: {0}")]
    DuplicateOwner(Address),
}

/// Validated owner set and quorum
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultisigConfig {
    /// Authorized owners, in order
    pub owners: Vec<Address>,
    /// Confirmations required to execute
    pub quorum: u32,
}

impl MultisigConfig {
    /// Create a new configuration
    ///
    /// # Errors
    /// `InvalidConfiguration` if `owners` is empty, contains the null
    /// address or a duplicate, or `quorum` is outside `1..=owners.len()`.
    pub fn new(owners: Vec<Address>, quorum: u32) -> Result<Self, MultisigError> {
        if owners.is_empty() {
            return Err(MultisigError::InvalidConfiguration(
                "owners required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(owners.len());
        for owner in &owners {
            if owner.is_zero() {
                return Err(MultisigError::InvalidConfiguration(
                    "invalid owner: null address".to_string(),
                ));
            }
            if !seen.insert(*owner) {
                return Err(MultisigError::InvalidConfiguration(format!(
                    "owner is not unique: {}",
                    owner
                )));
            }
        }

        if quorum == 0 || quorum as usize > owners.len() {
            return Err(MultisigError::InvalidConfiguration(format!(
                "invalid number of required approvals: {} (owners: {})",
                quorum,
                owners.len()
            )));
        }

        Ok(Self { owners, quorum })
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.quorum, self.owners.len())
    }
}

/// Result of an `execute` call that passed validation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The dispatcher accepted the action; the transaction is now executed
    Succeeded {
        #[serde(with = "hex::serde")]
        return_data: Vec<u8>,
    },
    /// The dispatcher rejected the action; the transaction stays pending
    Failed { reason: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded { .. })
    }
}

/// Mutable wallet state, guarded by the wallet's mutex
#[derive(Debug)]
struct WalletState {
    owners: Vec<Address>,
    quorum: u32,
    tx_count: u64,
    transactions: BTreeMap<TxId, Transaction>,
    confirmations: Confirmations,
    events: EventLog<WalletEvent>,
}

impl WalletState {
    fn is_owner(&self, account: &Address) -> bool {
        self.owners.contains(account)
    }

    fn require_owner(&self, caller: &Address) -> Result<(), MultisigError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(MultisigError::Unauthorized {
                caller: *caller,
                required: Capability::Owner,
            })
        }
    }

    fn confirmation_count(&self, id: TxId) -> usize {
        self.confirmations.count_among(id, &self.owners)
    }
}

/// Serializable copy of a wallet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub address: Address,
    pub created_at: DateTime<Utc>,
    pub owners: Vec<Address>,
    pub quorum: u32,
    pub tx_count: u64,
    pub transactions: BTreeMap<TxId, Transaction>,
    pub confirmations: Confirmations,
    pub events: EventLog<WalletEvent>,
}

/// A multi-signature wallet
///
/// All operations take `&self`. The state lock is released while the
/// dispatcher runs, so the dispatched action may call back into the
/// wallet; the transaction being executed stays `InProgress` until the
/// dispatcher returns.
#[derive(Debug)]
pub struct MultisigWallet {
    address: Address,
    created_at: DateTime<Utc>,
    state: Mutex<WalletState>,
}

impl MultisigWallet {
    /// Construct a wallet at `address`
    pub fn new(address: Address, owners: Vec<Address>, quorum: u32) -> Result<Self, MultisigError> {
        let config = MultisigConfig::new(owners, quorum)?;
        Ok(Self::from_config(address, config))
    }

    /// Construct a wallet from an already validated configuration
    pub fn from_config(address: Address, config: MultisigConfig) -> Self {
        Self {
            address,
            created_at: Utc::now(),
            state: Mutex::new(WalletState {
                owners: config.owners,
                quorum: config.quorum,
                tx_count: 0,
                transactions: BTreeMap::new(),
                confirmations: Confirmations::new(),
                events: EventLog::new(),
            }),
        }
    }

    /// Restore a wallet from a snapshot
    ///
    /// Transactions recorded as in progress are reset to pending; a
    /// snapshot taken mid-dispatch has no dispatcher left to finish them.
    pub fn from_snapshot(snapshot: WalletSnapshot) -> Self {
        let mut transactions = snapshot.transactions;
        for tx in transactions.values_mut() {
            if tx.status == TxStatus::InProgress {
                log::warn!(
                    "Wallet {}: transaction {} restored as pending",
                    snapshot.address,
                    tx.id
                );
                tx.status = TxStatus::Pending;
            }
        }

        Self {
            address: snapshot.address,
            created_at: snapshot.created_at,
            state: Mutex::new(WalletState {
                owners: snapshot.owners,
                quorum: snapshot.quorum,
                tx_count: snapshot.tx_count,
                transactions,
                confirmations: snapshot.confirmations,
                events: snapshot.events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Propose an action; returns the new transaction id
    pub fn propose(
        &self,
        caller: &Address,
        target: Address,
        value: u128,
        payload: Vec<u8>,
    ) -> Result<TxId, MultisigError> {
        let mut state = self.state();
        state.require_owner(caller)?;

        state.tx_count += 1;
        let id = state.tx_count;

        state.transactions.insert(
            id,
            Transaction::new(id, target, value, payload.clone(), *caller),
        );
        state.events.emit(WalletEvent::Proposed {
            target,
            value,
            payload,
            id,
        });

        log::info!(
            "Wallet {}: {} proposed transaction {} to {} (value {})",
            self.address,
            caller,
            id,
            target,
            value
        );
        Ok(id)
    }

    /// Record the caller's confirmation of `id`
    ///
    /// Confirming twice is not an error and does not count twice.
    pub fn confirm(&self, caller: &Address, id: TxId) -> Result<(), MultisigError> {
        let mut state = self.state();
        state.require_owner(caller)?;

        let tx = state
            .transactions
            .get(&id)
            .ok_or(MultisigError::NotFound(id))?;
        if tx.executed() {
            return Err(MultisigError::AlreadyExecuted(id));
        }

        if !state.confirmations.insert(id, *caller) {
            log::debug!("Wallet {}: {} re-confirmed {}", self.address, caller, id);
        }
        state.events.emit(WalletEvent::Confirmed { owner: *caller, id });

        log::debug!(
            "Wallet {}: transaction {} confirmed by {} ({}/{})",
            self.address,
            id,
            caller,
            state.confirmation_count(id),
            state.quorum
        );
        Ok(())
    }

    /// Whether `owner` has a recorded confirmation for `id`
    pub fn confirmed(&self, id: TxId, owner: &Address) -> bool {
        self.state().confirmations.contains(id, owner)
    }

    /// Execute `id` through `dispatcher`
    ///
    /// Validation errors are returned as `Err` with no state change. Once
    /// validation passes the call always returns `Ok`: a dispatcher failure
    /// is reported as [`ExecutionOutcome::Failed`] plus an
    /// `ExecutionFailed` event, and the transaction stays pending.
    pub fn execute(
        &self,
        id: TxId,
        dispatcher: &dyn Dispatcher,
    ) -> Result<ExecutionOutcome, MultisigError> {
        let (target, value, payload) = {
            let mut state = self.state();
            let have = state.confirmation_count(id);
            let need = state.quorum;

            let tx = state
                .transactions
                .get_mut(&id)
                .ok_or(MultisigError::NotFound(id))?;
            match tx.status {
                TxStatus::Executed => return Err(MultisigError::AlreadyExecuted(id)),
                TxStatus::InProgress => return Err(MultisigError::ExecutionInProgress(id)),
                TxStatus::Pending => {}
            }
            if have < need as usize {
                return Err(MultisigError::InsufficientApprovals { id, have, need });
            }

            tx.begin_execution();
            (tx.target, tx.value, tx.payload.clone())
        };

        log::debug!(
            "Wallet {}: dispatching transaction {} to {}",
            self.address,
            id,
            target
        );
        let result = dispatcher.invoke(&self.address, &target, value, &payload);

        let mut state = self.state();
        let outcome = match result {
            Ok(return_data) => {
                if let Some(tx) = state.transactions.get_mut(&id) {
                    tx.mark_executed();
                }
                state.events.emit(WalletEvent::ExecutionSucceeded { id });
                log::info!("Wallet {}: transaction {} executed", self.address, id);
                ExecutionOutcome::Succeeded { return_data }
            }
            Err(e) => {
                if let Some(tx) = state.transactions.get_mut(&id) {
                    tx.mark_failed();
                }
                state.events.emit(WalletEvent::ExecutionFailed { id });
                log::warn!(
                    "Wallet {}: transaction {} failed: {}",
                    self.address,
                    id,
                    e
                );
                ExecutionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        Ok(outcome)
    }

    /// Add or remove an owner
    ///
    /// Only the wallet itself may call this. Removing an absent owner is a
    /// no-op. The quorum is left untouched, even if it no longer fits.
    pub fn update_owner(
        &self,
        caller: &Address,
        owner: Address,
        is_owner: bool,
    ) -> Result<(), MultisigError> {
        if *caller != self.address {
            return Err(MultisigError::Unauthorized {
                caller: *caller,
                required: Capability::WalletSelf,
            });
        }

        let mut state = self.state();
        if is_owner {
            if owner.is_zero() {
                return Err(MultisigError::InvalidConfiguration(
                    "invalid owner: null address".to_string(),
                ));
            }
            if state.is_owner(&owner) {
                return Err(MultisigError::DuplicateOwner(owner));
            }
            state.owners.push(owner);
            state.events.emit(WalletEvent::OwnerAdded { owner });
            log::info!("Wallet {}: owner {} added", self.address, owner);
        } else if state.is_owner(&owner) {
            state.owners.retain(|o| *o != owner);
            state.events.emit(WalletEvent::OwnerRemoved { owner });
            log::info!("Wallet {}: owner {} removed", self.address, owner);

            if state.quorum as usize > state.owners.len() {
                log::warn!(
                    "Wallet {}: quorum {} exceeds owner count {}; no transaction can reach quorum",
                    self.address,
                    state.quorum,
                    state.owners.len()
                );
            }
        }

        Ok(())
    }

    /// Handle a dispatched call that targets this wallet
    ///
    /// An empty payload is a plain value deposit. Anything else must decode
    /// to a [`WalletCall`], which runs with `sender` as the caller.
    pub fn handle_call(
        &self,
        sender: &Address,
        payload: &[u8],
        dispatcher: &dyn Dispatcher,
    ) -> Result<Vec<u8>, DispatchError> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }

        let call = WalletCall::decode(payload)?;
        log::debug!(
            "Wallet {}: call {} from {}",
            self.address,
            call.signature(),
            sender
        );

        match call {
            WalletCall::Propose {
                target,
                value,
                payload,
            } => {
                let id = self.propose(sender, target, value, payload)?;
                Ok(id.to_be_bytes().to_vec())
            }
            WalletCall::Confirm { id } => {
                self.confirm(sender, id)?;
                Ok(Vec::new())
            }
            WalletCall::Execute { id } => {
                self.execute(id, dispatcher)?;
                Ok(Vec::new())
            }
            WalletCall::UpdateOwner { owner, is_owner } => {
                self.update_owner(sender, owner, is_owner)?;
                Ok(Vec::new())
            }
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// The wallet's own identity
    pub fn address(&self) -> Address {
        self.address
    }

    /// Creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Owner at `index`
    pub fn owner_at(&self, index: usize) -> Option<Address> {
        self.state().owners.get(index).copied()
    }

    /// Current owner set, in order
    pub fn owners(&self) -> Vec<Address> {
        self.state().owners.clone()
    }

    /// Check if an address is a current owner
    pub fn is_owner(&self, account: &Address) -> bool {
        self.state().is_owner(account)
    }

    /// Quorum
    pub fn required_approvals(&self) -> u32 {
        self.state().quorum
    }

    /// Current configuration
    pub fn config(&self) -> MultisigConfig {
        let state = self.state();
        MultisigConfig {
            owners: state.owners.clone(),
            quorum: state.quorum,
        }
    }

    /// Get human-readable description like "2-of-3"
    pub fn description(&self) -> String {
        self.config().description()
    }

    /// A transaction by id
    pub fn transaction(&self, id: TxId) -> Option<Transaction> {
        self.state().transactions.get(&id).cloned()
    }

    /// All transactions, ordered by id
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state().transactions.values().cloned().collect()
    }

    /// Number of transactions proposed so far
    pub fn transaction_count(&self) -> u64 {
        self.state().tx_count
    }

    /// Confirmations for `id` from current owners
    pub fn confirmation_count(&self, id: TxId) -> usize {
        self.state().confirmation_count(id)
    }

    /// Every address that ever confirmed `id`
    pub fn confirmers(&self, id: TxId) -> Vec<Address> {
        self.state().confirmations.confirmers(id)
    }

    /// Emitted events
    pub fn events(&self) -> Vec<EventRecord<WalletEvent>> {
        self.state().events.records().to_vec()
    }

    /// Events with sequence number `>= from`
    pub fn events_since(&self, from: usize) -> Vec<EventRecord<WalletEvent>> {
        self.state().events.since(from)
    }

    pub fn event_count(&self) -> usize {
        self.state().events.len()
    }

    /// Serializable copy of the wallet
    pub fn snapshot(&self) -> WalletSnapshot {
        let state = self.state();
        WalletSnapshot {
            address: self.address,
            created_at: self.created_at,
            owners: state.owners.clone(),
            quorum: state.quorum,
            tx_count: state.tx_count,
            transactions: state.transactions.clone(),
            confirmations: state.confirmations.clone(),
            events: state.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ADDRESS_LEN;
    use std::cell::RefCell;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; ADDRESS_LEN])
    }

    fn wallet_address() -> Address {
        addr(0xaa)
    }

    fn owners() -> Vec<Address> {
        vec![addr(1), addr(2), addr(3)]
    }

    fn two_of_three() -> MultisigWallet {
        MultisigWallet::new(wallet_address(), owners(), 2).unwrap()
    }

    /// Records every dispatched call and answers with a fixed result
    struct Recorder {
        calls: RefCell<Vec<(Address, Address, u128, Vec<u8>)>>,
        fail: bool,
    }

    impl Recorder {
        fn ok() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl Dispatcher for Recorder {
        fn invoke(
            &self,
            sender: &Address,
            target: &Address,
            value: u128,
            payload: &[u8],
        ) -> Result<Vec<u8>, DispatchError> {
            self.calls
                .borrow_mut()
                .push((*sender, *target, value, payload.to_vec()));
            if self.fail {
                Err(DispatchError::Rejected("target refused".to_string()))
            } else {
                Ok(vec![0x01])
            }
        }
    }

    /// Delivers self-targeted payloads back into the wallet
    struct Loopback<'a> {
        wallet: &'a MultisigWallet,
    }

    impl Dispatcher for Loopback<'_> {
        fn invoke(
            &self,
            sender: &Address,
            target: &Address,
            _value: u128,
            payload: &[u8],
        ) -> Result<Vec<u8>, DispatchError> {
            if *target == self.wallet.address() {
                self.wallet.handle_call(sender, payload, self)
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn approve(wallet: &MultisigWallet, id: TxId, by: &[Address]) {
        for owner in by {
            wallet.confirm(owner, id).unwrap();
        }
    }

    #[test]
    fn test_config_creation() {
        let config = MultisigConfig::new(owners(), 2).unwrap();
        assert_eq!(config.quorum, 2);
        assert_eq!(config.owners.len(), 3);
        assert_eq!(config.description(), "2-of-3");
    }

    #[test]
    fn test_config_validation() {
        // Zero quorum
        assert!(MultisigConfig::new(owners(), 0).is_err());

        // Quorum > owners
        assert!(matches!(
            MultisigConfig::new(owners(), 4),
            Err(MultisigError::InvalidConfiguration(_))
        ));

        // No owners
        assert!(MultisigConfig::new(vec![], 1).is_err());

        // Null owner
        assert!(MultisigConfig::new(vec![addr(1), Address::ZERO], 1).is_err());

        // Duplicate owners
        assert!(MultisigConfig::new(vec![addr(1), addr(1)], 1).is_err());

        // Single owner, quorum 1
        assert!(MultisigConfig::new(vec![addr(1)], 1).is_ok());
    }

    #[test]
    fn test_initial_state() {
        let wallet = two_of_three();

        assert_eq!(wallet.required_approvals(), 2);
        for (i, owner) in owners().iter().enumerate() {
            assert_eq!(wallet.owner_at(i), Some(*owner));
            assert!(wallet.is_owner(owner));
        }
        assert_eq!(wallet.owner_at(3), None);
        assert_eq!(wallet.transaction_count(), 0);
        assert!(wallet.events().is_empty());
    }

    #[test]
    fn test_propose() {
        let wallet = two_of_three();
        let payload = vec![0xca, 0xfe];

        let id = wallet.propose(&addr(1), addr(2), 100, payload.clone()).unwrap();
        assert_eq!(id, 1);

        let tx = wallet.transaction(1).unwrap();
        assert_eq!(tx.target, addr(2));
        assert_eq!(tx.value, 100);
        assert_eq!(tx.payload, payload);
        assert_eq!(tx.proposer, addr(1));
        assert!(!tx.executed());
        assert_eq!(wallet.confirmation_count(1), 0);

        assert_eq!(
            wallet.events()[0].event,
            WalletEvent::Proposed {
                target: addr(2),
                value: 100,
                payload,
                id: 1,
            }
        );

        // Ids are sequential
        assert_eq!(wallet.propose(&addr(2), addr(3), 0, vec![]).unwrap(), 2);
        assert_eq!(wallet.transaction_count(), 2);
    }

    #[test]
    fn test_non_owner_rejected() {
        let wallet = two_of_three();
        let outsider = addr(9);

        assert_eq!(
            wallet.propose(&outsider, addr(2), 1, vec![]),
            Err(MultisigError::Unauthorized {
                caller: outsider,
                required: Capability::Owner,
            })
        );

        wallet.propose(&addr(1), addr(2), 1, vec![]).unwrap();
        assert!(matches!(
            wallet.confirm(&outsider, 1),
            Err(MultisigError::Unauthorized { .. })
        ));
        assert!(matches!(
            wallet.update_owner(&outsider, outsider, true),
            Err(MultisigError::Unauthorized {
                required: Capability::WalletSelf,
                ..
            })
        ));

        // An owner is not the wallet either
        assert!(matches!(
            wallet.update_owner(&addr(1), addr(9), true),
            Err(MultisigError::Unauthorized { .. })
        ));

        // Failed calls emit nothing
        assert_eq!(wallet.event_count(), 1);
    }

    #[test]
    fn test_confirm_unknown_transaction() {
        let wallet = two_of_three();
        wallet.propose(&addr(1), addr(2), 1, vec![]).unwrap();

        assert_eq!(wallet.confirm(&addr(1), 2), Err(MultisigError::NotFound(2)));
        assert_eq!(
            wallet.execute(2, &Recorder::ok()),
            Err(MultisigError::NotFound(2))
        );
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let wallet = two_of_three();
        wallet.propose(&addr(1), addr(2), 1, vec![]).unwrap();

        assert!(!wallet.confirmed(1, &addr(1)));
        wallet.confirm(&addr(1), 1).unwrap();
        wallet.confirm(&addr(1), 1).unwrap();

        assert!(wallet.confirmed(1, &addr(1)));
        assert_eq!(wallet.confirmation_count(1), 1);
        assert_eq!(
            wallet.execute(1, &Recorder::ok()),
            Err(MultisigError::InsufficientApprovals {
                id: 1,
                have: 1,
                need: 2
            })
        );
    }

    #[test]
    fn test_execute_after_quorum() {
        let wallet = two_of_three();
        let dispatcher = Recorder::ok();
        wallet.propose(&addr(1), addr(7), 50, vec![0x42]).unwrap();

        wallet.confirm(&addr(1), 1).unwrap();
        assert!(matches!(
            wallet.execute(1, &dispatcher),
            Err(MultisigError::InsufficientApprovals { .. })
        ));
        assert!(dispatcher.calls.borrow().is_empty());

        wallet.confirm(&addr(2), 1).unwrap();
        let outcome = wallet.execute(1, &dispatcher).unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Succeeded {
                return_data: vec![0x01]
            }
        );
        assert_eq!(
            dispatcher.calls.borrow()[0],
            (wallet_address(), addr(7), 50, vec![0x42])
        );
        assert!(wallet.transaction(1).unwrap().executed());
        assert_eq!(
            wallet.events().last().unwrap().event,
            WalletEvent::ExecutionSucceeded { id: 1 }
        );
    }

    #[test]
    fn test_executed_is_terminal() {
        let wallet = two_of_three();
        wallet.propose(&addr(1), addr(7), 0, vec![]).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);
        wallet.execute(1, &Recorder::ok()).unwrap();

        assert_eq!(
            wallet.execute(1, &Recorder::ok()),
            Err(MultisigError::AlreadyExecuted(1))
        );
        assert_eq!(
            wallet.confirm(&addr(3), 1),
            Err(MultisigError::AlreadyExecuted(1))
        );

        // Confirmations survive execution
        assert!(wallet.confirmed(1, &addr(1)));
        assert!(wallet.confirmed(1, &addr(2)));
    }

    #[test]
    fn test_failed_dispatch_keeps_transaction_pending() {
        let wallet = two_of_three();
        wallet.propose(&addr(1), addr(7), 0, vec![]).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);

        let outcome = wallet.execute(1, &Recorder::failing()).unwrap();
        assert!(!outcome.is_success());

        let tx = wallet.transaction(1).unwrap();
        assert!(!tx.executed());
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.failed_attempts, 1);
        assert_eq!(
            wallet.events().last().unwrap().event,
            WalletEvent::ExecutionFailed { id: 1 }
        );

        // Retry succeeds
        assert!(wallet.execute(1, &Recorder::ok()).unwrap().is_success());
        assert!(wallet.transaction(1).unwrap().executed());
    }

    #[test]
    fn test_self_update_adds_owner() {
        let wallet = two_of_three();
        let newcomer = addr(4);
        let payload = WalletCall::UpdateOwner {
            owner: newcomer,
            is_owner: true,
        }
        .encode();

        wallet.propose(&addr(1), wallet_address(), 0, payload).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);
        let outcome = wallet.execute(1, &Loopback { wallet: &wallet }).unwrap();

        assert!(outcome.is_success());
        assert!(wallet.is_owner(&newcomer));
        assert_eq!(wallet.owner_at(3), Some(newcomer));

        let events: Vec<WalletEvent> = wallet.events().into_iter().map(|r| r.event).collect();
        assert!(events.contains(&WalletEvent::OwnerAdded { owner: newcomer }));
    }

    #[test]
    fn test_self_update_removes_owner() {
        let wallet = two_of_three();
        let payload = WalletCall::UpdateOwner {
            owner: addr(3),
            is_owner: false,
        }
        .encode();

        wallet.propose(&addr(1), wallet_address(), 0, payload).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);
        wallet.execute(1, &Loopback { wallet: &wallet }).unwrap();

        assert!(!wallet.is_owner(&addr(3)));
        assert_eq!(wallet.owners(), vec![addr(1), addr(2)]);
        assert_eq!(wallet.required_approvals(), 2);
    }

    #[test]
    fn test_self_update_duplicate_owner_fails_execution() {
        let wallet = two_of_three();
        let payload = WalletCall::UpdateOwner {
            owner: addr(2),
            is_owner: true,
        }
        .encode();

        wallet.propose(&addr(1), wallet_address(), 0, payload).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);
        let outcome = wallet.execute(1, &Loopback { wallet: &wallet }).unwrap();

        match outcome {
            ExecutionOutcome::Failed { reason } => assert!(reason.contains("Duplicate owner")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(wallet.owners(), owners());
        assert!(!wallet.transaction(1).unwrap().executed());
    }

    #[test]
    fn test_malformed_self_call_fails_execution() {
        let wallet = two_of_three();
        let mut payload = crate::crypto::selector("updateOwner(address)").to_vec();
        payload.extend_from_slice(addr(5).as_bytes());

        wallet.propose(&addr(1), wallet_address(), 0, payload).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);

        let loopback = Loopback { wallet: &wallet };
        assert!(!wallet.execute(1, &loopback).unwrap().is_success());
        assert!(!wallet.execute(1, &loopback).unwrap().is_success());

        let tx = wallet.transaction(1).unwrap();
        assert!(!tx.executed());
        assert_eq!(tx.failed_attempts, 2);
        assert!(!wallet.is_owner(&addr(5)));
    }

    #[test]
    fn test_removed_owner_no_longer_counts() {
        let wallet = two_of_three();

        // Transaction 1: ordinary transfer confirmed by owners 1 and 3
        wallet.propose(&addr(1), addr(7), 0, vec![]).unwrap();
        approve(&wallet, 1, &[addr(1), addr(3)]);
        assert_eq!(wallet.confirmation_count(1), 2);

        // Transaction 2: remove owner 3
        let removal = WalletCall::UpdateOwner {
            owner: addr(3),
            is_owner: false,
        }
        .encode();
        wallet.propose(&addr(1), wallet_address(), 0, removal).unwrap();
        approve(&wallet, 2, &[addr(1), addr(2)]);
        wallet.execute(2, &Loopback { wallet: &wallet }).unwrap();

        assert_eq!(wallet.confirmation_count(1), 1);
        assert!(wallet.confirmed(1, &addr(3)));
        assert!(matches!(
            wallet.execute(1, &Recorder::ok()),
            Err(MultisigError::InsufficientApprovals { have: 1, .. })
        ));
    }

    #[test]
    fn test_removal_does_not_revalidate_quorum() {
        let wallet = MultisigWallet::new(wallet_address(), vec![addr(1), addr(2)], 2).unwrap();
        let removal = WalletCall::UpdateOwner {
            owner: addr(2),
            is_owner: false,
        }
        .encode();

        wallet.propose(&addr(1), wallet_address(), 0, removal).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);
        assert!(wallet.execute(1, &Loopback { wallet: &wallet }).unwrap().is_success());

        assert_eq!(wallet.owners(), vec![addr(1)]);
        assert_eq!(wallet.required_approvals(), 2);
    }

    #[test]
    fn test_update_owner_direct_from_self() {
        let wallet = two_of_three();
        let me = wallet_address();

        wallet.update_owner(&me, addr(4), true).unwrap();
        assert_eq!(
            wallet.update_owner(&me, addr(4), true),
            Err(MultisigError::DuplicateOwner(addr(4)))
        );
        assert!(wallet.update_owner(&me, Address::ZERO, true).is_err());

        // Removing an absent owner is a no-op
        let before = wallet.event_count();
        wallet.update_owner(&me, addr(8), false).unwrap();
        assert_eq!(wallet.event_count(), before);
    }

    #[test]
    fn test_reentrant_execute_is_blocked() {
        let wallet = two_of_three();

        // Transaction 1 asks the wallet to execute transaction 1 again
        let payload = WalletCall::Execute { id: 1 }.encode();
        wallet.propose(&addr(1), wallet_address(), 0, payload).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);

        let outcome = wallet.execute(1, &Loopback { wallet: &wallet }).unwrap();
        match outcome {
            ExecutionOutcome::Failed { reason } => assert!(reason.contains("already being executed")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(wallet.transaction(1).unwrap().status, TxStatus::Pending);
    }

    /// Calls back into the wallet while transaction `id` is in flight
    struct Reenter<'a> {
        wallet: &'a MultisigWallet,
        id: TxId,
        seen: RefCell<Vec<Result<(), MultisigError>>>,
    }

    impl Dispatcher for Reenter<'_> {
        fn invoke(
            &self,
            _sender: &Address,
            _target: &Address,
            _value: u128,
            _payload: &[u8],
        ) -> Result<Vec<u8>, DispatchError> {
            let mut seen = self.seen.borrow_mut();
            seen.push(self.wallet.execute(self.id, self).map(|_| ()));
            seen.push(self.wallet.confirm(&addr(3), self.id));
            seen.push(self.wallet.propose(&addr(3), addr(7), 0, vec![]).map(|_| ()));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_other_operations_stay_available_during_dispatch() {
        let wallet = two_of_three();
        wallet.propose(&addr(1), addr(7), 0, vec![]).unwrap();
        approve(&wallet, 1, &[addr(1), addr(2)]);

        let attacker = Reenter {
            wallet: &wallet,
            id: 1,
            seen: RefCell::new(Vec::new()),
        };
        assert!(wallet.execute(1, &attacker).unwrap().is_success());

        let seen = attacker.seen.borrow();
        assert_eq!(seen[0], Err(MultisigError::ExecutionInProgress(1)));
        assert_eq!(seen[1], Ok(()));
        assert_eq!(seen[2], Ok(()));

        assert!(wallet.transaction(1).unwrap().executed());
        assert_eq!(wallet.confirmation_count(1), 3);
        assert_eq!(wallet.transaction_count(), 2);
    }

    #[test]
    fn test_handle_call_returns_proposal_id() {
        let wallet = two_of_three();
        let payload = WalletCall::Propose {
            target: addr(7),
            value: 5,
            payload: vec![],
        }
        .encode();

        let ret = wallet.handle_call(&addr(2), &payload, &Recorder::ok()).unwrap();
        assert_eq!(ret, 1u64.to_be_bytes().to_vec());
        assert_eq!(wallet.transaction(1).unwrap().proposer, addr(2));

        // Empty payload is a plain deposit
        assert!(wallet.handle_call(&addr(9), &[], &Recorder::ok()).unwrap().is_empty());
        assert_eq!(wallet.transaction_count(), 1);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let wallet = two_of_three();
        let dispatcher = Recorder::ok();
        let (o1, o2) = (addr(1), addr(2));

        assert_eq!(wallet.propose(&o1, o2, 1_000, vec![]).unwrap(), 1);
        wallet.confirm(&o1, 1).unwrap();
        assert!(matches!(
            wallet.execute(1, &dispatcher),
            Err(MultisigError::InsufficientApprovals { .. })
        ));
        wallet.confirm(&o2, 1).unwrap();
        assert!(wallet.execute(1, &dispatcher).unwrap().is_success());

        let events: Vec<WalletEvent> = wallet.events().into_iter().map(|r| r.event).collect();
        assert_eq!(
            events,
            vec![
                WalletEvent::Proposed {
                    target: o2,
                    value: 1_000,
                    payload: vec![],
                    id: 1
                },
                WalletEvent::Confirmed { owner: o1, id: 1 },
                WalletEvent::Confirmed { owner: o2, id: 1 },
                WalletEvent::ExecutionSucceeded { id: 1 },
            ]
        );
    }

    #[test]
    fn test_snapshot_restore() {
        let wallet = two_of_three();
        wallet.propose(&addr(1), addr(7), 3, vec![1, 2, 3]).unwrap();
        wallet.confirm(&addr(1), 1).unwrap();

        let mut snapshot = wallet.snapshot();
        snapshot.transactions.get_mut(&1).unwrap().status = TxStatus::InProgress;

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = MultisigWallet::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.address(), wallet_address());
        assert_eq!(restored.owners(), owners());
        assert_eq!(restored.transaction_count(), 1);
        assert!(restored.confirmed(1, &addr(1)));
        assert_eq!(restored.transaction(1).unwrap().status, TxStatus::Pending);
        assert_eq!(restored.event_count(), 2);

        // Counter continues from where it left off
        assert_eq!(restored.propose(&addr(2), addr(7), 0, vec![]).unwrap(), 2);
    }
}

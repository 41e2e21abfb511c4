//! Proposed wallet transactions
//!
//! A transaction is created by `propose`, collects confirmations, and is
//! forwarded to the dispatcher by `execute` once quorum is met.

use crate::crypto::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Transaction sequence number, starting at 1
pub type TxId = u64;

/// Execution status of a transaction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Awaiting confirmations or a (re)tried execution
    Pending,
    /// Handed to the dispatcher; blocks a nested execute of the same id
    InProgress,
    /// Dispatched successfully (terminal)
    Executed,
}

/// A proposed action
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Sequence id
    pub id: TxId,
    /// Account the action is delivered to
    pub target: Address,
    /// Native value sent along
    #[serde(with = "crate::multisig::amount")]
    pub value: u128,
    /// Opaque action payload
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
    /// Owner that proposed it
    pub proposer: Address,
    /// Current status
    pub status: TxStatus,
    /// Dispatch attempts that failed
    pub failed_attempts: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When dispatch succeeded
    pub executed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a new pending transaction
    pub fn new(id: TxId, target: Address, value: u128, payload: Vec<u8>, proposer: Address) -> Self {
        Self {
            id,
            target,
            value,
            payload,
            proposer,
            status: TxStatus::Pending,
            failed_attempts: 0,
            created_at: Utc::now(),
            executed_at: None,
        }
    }

    /// Whether dispatch has succeeded
    pub fn executed(&self) -> bool {
        self.status == TxStatus::Executed
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == TxStatus::InProgress
    }

    pub(crate) fn begin_execution(&mut self) {
        self.status = TxStatus::InProgress;
    }

    pub(crate) fn mark_executed(&mut self) {
        self.status = TxStatus::Executed;
        self.executed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self) {
        self.status = TxStatus::Pending;
        self.failed_attempts += 1;
    }
}

/// Recorded (transaction, owner) approvals
///
/// Entries are never removed, even after execution or owner removal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Confirmations {
    by_tx: BTreeMap<TxId, BTreeSet<Address>>,
}

impl Confirmations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an approval; returns false if it was already present
    pub fn insert(&mut self, id: TxId, owner: Address) -> bool {
        self.by_tx.entry(id).or_default().insert(owner)
    }

    /// Whether `owner` has confirmed `id`
    pub fn contains(&self, id: TxId, owner: &Address) -> bool {
        self.by_tx
            .get(&id)
            .map(|owners| owners.contains(owner))
            .unwrap_or(false)
    }

    /// Every address that confirmed `id`, current owner or not
    pub fn confirmers(&self, id: TxId) -> Vec<Address> {
        self.by_tx
            .get(&id)
            .map(|owners| owners.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of confirmations for `id` from members of `owners`
    pub fn count_among(&self, id: TxId, owners: &[Address]) -> usize {
        match self.by_tx.get(&id) {
            Some(confirmed) => owners.iter().filter(|o| confirmed.contains(o)).count(),
            None => 0,
        }
    }
}

//! Emitted events
//!
//! Each wallet and factory keeps an append-only, ordered log of the events
//! it emitted. Observers read it through `events()` / `events_since()`.

use crate::crypto::Address;
use crate::multisig::transaction::TxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by a wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    Proposed {
        target: Address,
        #[serde(with = "crate::multisig::amount")]
        value: u128,
        #[serde(with = "hex::serde")]
        payload: Vec<u8>,
        id: TxId,
    },
    Confirmed {
        owner: Address,
        id: TxId,
    },
    ExecutionSucceeded {
        id: TxId,
    },
    ExecutionFailed {
        id: TxId,
    },
    OwnerAdded {
        owner: Address,
    },
    OwnerRemoved {
        owner: Address,
    },
}

/// Events emitted by a factory
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FactoryEvent {
    WalletCreated { wallet: Address },
}

/// A logged event with its position and time
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord<E> {
    /// Position in the emitter's log, starting at 0
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: E,
}

/// Append-only event log
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLog<E> {
    records: Vec<EventRecord<E>>,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<E: Clone> EventLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn emit(&mut self, event: E) {
        let sequence = self.records.len() as u64;
        self.records.push(EventRecord {
            sequence,
            emitted_at: Utc::now(),
            event,
        });
    }

    /// Number of events emitted so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records
    pub fn records(&self) -> &[EventRecord<E>] {
        &self.records
    }

    /// Records with `sequence >= from`
    pub fn since(&self, from: usize) -> Vec<EventRecord<E>> {
        self.records.iter().skip(from).cloned().collect()
    }

    /// Event payloads without metadata
    pub fn events(&self) -> Vec<E> {
        self.records.iter().map(|r| r.event.clone()).collect()
    }

    pub fn last(&self) -> Option<&E> {
        self.records.last().map(|r| &r.event)
    }
}

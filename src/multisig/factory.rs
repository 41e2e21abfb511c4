//! Wallet factory
//!
//! Deploys independent wallet instances onto a [`Ledger`] and announces
//! each one with a `WalletCreated` event.

use crate::crypto::Address;
use crate::dispatch::Ledger;
use crate::multisig::events::{EventLog, EventRecord, FactoryEvent};
use crate::multisig::wallet::MultisigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct FactoryState {
    wallets: Vec<Address>,
    events: EventLog<FactoryEvent>,
}

/// Serializable copy of a factory
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactorySnapshot {
    pub address: Address,
    pub owner: Address,
    pub created_at: DateTime<Utc>,
    pub wallets: Vec<Address>,
    pub events: EventLog<FactoryEvent>,
}

/// Creates multisig wallets
#[derive(Debug)]
pub struct MultisigFactory {
    address: Address,
    owner: Address,
    created_at: DateTime<Utc>,
    state: Mutex<FactoryState>,
}

impl MultisigFactory {
    /// Create a factory at `address`, deployed by `owner`
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            owner,
            created_at: Utc::now(),
            state: Mutex::new(FactoryState::default()),
        }
    }

    pub fn from_snapshot(snapshot: FactorySnapshot) -> Self {
        Self {
            address: snapshot.address,
            owner: snapshot.owner,
            created_at: snapshot.created_at,
            state: Mutex::new(FactoryState {
                wallets: snapshot.wallets,
                events: snapshot.events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deploy a new wallet with `owners` and `quorum`
    ///
    /// Owners are screened for null and repeated entries before the wallet
    /// runs its own configuration checks. The new wallet's address is
    /// derived from the factory's address.
    pub fn create(
        &self,
        ledger: &Ledger,
        owners: Vec<Address>,
        quorum: u32,
    ) -> Result<Address, MultisigError> {
        let mut seen = HashSet::with_capacity(owners.len());
        for owner in &owners {
            if owner.is_zero() {
                return Err(MultisigError::InvalidConfiguration(
                    "invalid address".to_string(),
                ));
            }
            if !seen.insert(*owner) {
                return Err(MultisigError::InvalidConfiguration(
                    "owners must be unique".to_string(),
                ));
            }
        }

        let wallet = ledger.deploy_wallet(&self.address, owners, quorum)?;
        let address = wallet.address();

        let mut state = self.state();
        state.wallets.push(address);
        state.events.emit(FactoryEvent::WalletCreated { wallet: address });

        log::info!(
            "Factory {} created {} wallet {}",
            self.address,
            wallet.description(),
            address
        );
        Ok(address)
    }

    /// Factory's own address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Account that deployed the factory
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wallets created so far, in creation order
    pub fn wallets_created(&self) -> Vec<Address> {
        self.state().wallets.clone()
    }

    pub fn events(&self) -> Vec<EventRecord<FactoryEvent>> {
        self.state().events.records().to_vec()
    }

    pub fn events_since(&self, from: usize) -> Vec<EventRecord<FactoryEvent>> {
        self.state().events.since(from)
    }

    pub fn snapshot(&self) -> FactorySnapshot {
        let state = self.state();
        FactorySnapshot {
            address: self.address,
            owner: self.owner,
            created_at: self.created_at,
            wallets: state.wallets.clone(),
            events: state.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ADDRESS_LEN;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; ADDRESS_LEN])
    }

    #[test]
    fn test_owner_is_deployer() {
        let ledger = Ledger::new();
        let factory = ledger.deploy_factory(&addr(1));
        assert_eq!(factory.owner(), addr(1));
        assert_ne!(factory.address(), addr(1));
    }

    #[test]
    fn test_create_wallet() {
        let ledger = Ledger::new();
        let factory = ledger.deploy_factory(&addr(1));

        let address = factory
            .create(&ledger, vec![addr(2), addr(3), addr(4)], 2)
            .unwrap();

        let wallet = ledger.wallet(&address).unwrap();
        assert_eq!(wallet.owners(), vec![addr(2), addr(3), addr(4)]);
        assert_eq!(wallet.required_approvals(), 2);
        assert_eq!(factory.wallets_created(), vec![address]);
        assert_eq!(
            factory.events()[0].event,
            FactoryEvent::WalletCreated { wallet: address }
        );

        // Each creation gets a fresh address
        let second = factory.create(&ledger, vec![addr(2)], 1).unwrap();
        assert_ne!(second, address);
        assert_eq!(factory.events().len(), 2);
    }

    #[test]
    fn test_create_rejects_null_owner() {
        let ledger = Ledger::new();
        let factory = ledger.deploy_factory(&addr(1));

        assert_eq!(
            factory.create(&ledger, vec![addr(2), Address::ZERO], 1),
            Err(MultisigError::InvalidConfiguration(
                "invalid address".to_string()
            ))
        );
        assert!(factory.events().is_empty());
        assert!(ledger.wallets().is_empty());
    }

    #[test]
    fn test_create_rejects_duplicate_owners() {
        let ledger = Ledger::new();
        let factory = ledger.deploy_factory(&addr(1));

        assert_eq!(
            factory.create(&ledger, vec![addr(2), addr(2)], 1),
            Err(MultisigError::InvalidConfiguration(
                "owners must be unique".to_string()
            ))
        );
        assert!(factory.wallets_created().is_empty());
    }

    #[test]
    fn test_create_rejects_bad_quorum() {
        let ledger = Ledger::new();
        let factory = ledger.deploy_factory(&addr(1));

        assert!(matches!(
            factory.create(&ledger, vec![addr(2), addr(3)], 3),
            Err(MultisigError::InvalidConfiguration(_))
        ));
        assert!(factory.events().is_empty());
    }
}

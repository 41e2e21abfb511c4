//! In-process ledger
//!
//! Tracks native balances, hosts deployed wallets and factories, and acts as
//! the [`Dispatcher`] wallets execute through. Deployed addresses are
//! derived from the deployer's address and a per-deployer nonce.

use crate::crypto::Address;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::multisig::factory::{FactorySnapshot, MultisigFactory};
use crate::multisig::wallet::{MultisigConfig, MultisigError, MultisigWallet, WalletSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Serializable copy of a ledger
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Native balances, as decimal strings
    pub balances: BTreeMap<Address, String>,
    pub nonces: BTreeMap<Address, u64>,
    pub wallets: Vec<WalletSnapshot>,
    pub factories: Vec<FactorySnapshot>,
}

/// Balances plus deployed contracts
#[derive(Debug, Default)]
pub struct Ledger {
    balances: Mutex<HashMap<Address, u128>>,
    nonces: Mutex<HashMap<Address, u64>>,
    wallets: RwLock<HashMap<Address, Arc<MultisigWallet>>>,
    factories: RwLock<HashMap<Address, Arc<MultisigFactory>>>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn balances(&self) -> MutexGuard<'_, HashMap<Address, u128>> {
        self.balances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Credit `amount` to `account`; returns the new balance
    pub fn fund(&self, account: &Address, amount: u128) -> Result<u128, DispatchError> {
        let mut balances = self.balances();
        let balance = balances.entry(*account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(DispatchError::BalanceOverflow(*account))?;

        log::debug!("Funded {} with {} (balance {})", account, amount, balance);
        Ok(*balance)
    }

    /// Native balance of `account`
    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances().get(account).copied().unwrap_or(0)
    }

    fn transfer(&self, from: &Address, to: &Address, value: u128) -> Result<(), DispatchError> {
        if value == 0 {
            return Ok(());
        }

        let mut balances = self.balances();
        let have = balances.get(from).copied().unwrap_or(0);
        if have < value {
            return Err(DispatchError::InsufficientBalance { have, need: value });
        }

        if from == to {
            return Ok(());
        }

        let credited = balances
            .get(to)
            .copied()
            .unwrap_or(0)
            .checked_add(value)
            .ok_or(DispatchError::BalanceOverflow(*to))?;

        balances.insert(*from, have - value);
        balances.insert(*to, credited);
        Ok(())
    }

    // =========================================================================
    // Deployment
    // =========================================================================

    /// Next address for something deployed by `deployer`
    fn next_address(&self, deployer: &Address) -> Address {
        let mut nonces = self.nonces.lock().unwrap_or_else(PoisonError::into_inner);
        let nonce = nonces.entry(*deployer).or_insert(0);
        let address = Address::derive(deployer, *nonce);
        *nonce += 1;
        address
    }

    /// Deploy a wallet on behalf of `deployer`
    pub fn deploy_wallet(
        &self,
        deployer: &Address,
        owners: Vec<Address>,
        quorum: u32,
    ) -> Result<Arc<MultisigWallet>, MultisigError> {
        let config = MultisigConfig::new(owners, quorum)?;
        let address = self.next_address(deployer);
        let wallet = Arc::new(MultisigWallet::from_config(address, config));

        self.wallets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, Arc::clone(&wallet));

        log::info!(
            "Deployed {} wallet at {} (deployer {})",
            wallet.description(),
            address,
            deployer
        );
        Ok(wallet)
    }

    /// Deploy a factory owned by `deployer`
    pub fn deploy_factory(&self, deployer: &Address) -> Arc<MultisigFactory> {
        let address = self.next_address(deployer);
        let factory = Arc::new(MultisigFactory::new(address, *deployer));

        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, Arc::clone(&factory));

        log::info!("Deployed factory at {} (owner {})", address, deployer);
        factory
    }

    /// Look up a deployed wallet
    pub fn wallet(&self, address: &Address) -> Option<Arc<MultisigWallet>> {
        self.wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    /// Look up a deployed factory
    pub fn factory(&self, address: &Address) -> Option<Arc<MultisigFactory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    /// All wallets, ordered by address
    pub fn wallets(&self) -> Vec<Arc<MultisigWallet>> {
        let mut wallets: Vec<_> = self
            .wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        wallets.sort_by_key(|w| w.address());
        wallets
    }

    /// All factories, ordered by address
    pub fn factories(&self) -> Vec<Arc<MultisigFactory>> {
        let mut factories: Vec<_> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        factories.sort_by_key(|f| f.address());
        factories
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Serializable copy of the whole ledger
    pub fn snapshot(&self) -> LedgerSnapshot {
        let balances = self
            .balances()
            .iter()
            .map(|(account, balance)| (*account, balance.to_string()))
            .collect();
        let nonces = self
            .nonces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(deployer, nonce)| (*deployer, *nonce))
            .collect();

        LedgerSnapshot {
            balances,
            nonces,
            wallets: self.wallets().iter().map(|w| w.snapshot()).collect(),
            factories: self.factories().iter().map(|f| f.snapshot()).collect(),
        }
    }

    /// Rebuild a ledger from a snapshot
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, DispatchError> {
        let mut balances = HashMap::with_capacity(snapshot.balances.len());
        for (account, balance) in snapshot.balances {
            let amount = balance.parse::<u128>().map_err(|e| {
                DispatchError::Rejected(format!("invalid balance for {}: {}", account, e))
            })?;
            balances.insert(account, amount);
        }

        let wallets = snapshot
            .wallets
            .into_iter()
            .map(|s| {
                let wallet = MultisigWallet::from_snapshot(s);
                (wallet.address(), Arc::new(wallet))
            })
            .collect();
        let factories = snapshot
            .factories
            .into_iter()
            .map(|s| {
                let factory = MultisigFactory::from_snapshot(s);
                (factory.address(), Arc::new(factory))
            })
            .collect();

        Ok(Self {
            balances: Mutex::new(balances),
            nonces: Mutex::new(snapshot.nonces.into_iter().collect()),
            wallets: RwLock::new(wallets),
            factories: RwLock::new(factories),
        })
    }
}

impl Dispatcher for Ledger {
    fn invoke(
        &self,
        sender: &Address,
        target: &Address,
        value: u128,
        payload: &[u8],
    ) -> Result<Vec<u8>, DispatchError> {
        self.transfer(sender, target, value)?;

        // The map guard is dropped before the wallet runs; it may deploy or
        // dispatch further.
        let Some(wallet) = self.wallet(target) else {
            return Ok(Vec::new());
        };

        match wallet.handle_call(sender, payload, self) {
            Ok(data) => Ok(data),
            Err(e) => {
                if let Err(undo) = self.transfer(target, sender, value) {
                    log::error!(
                        "Could not return {} from {} to {}: {}",
                        value,
                        target,
                        sender,
                        undo
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ADDRESS_LEN;
    use crate::multisig::call::WalletCall;
    use crate::multisig::events::WalletEvent;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; ADDRESS_LEN])
    }

    fn owners() -> Vec<Address> {
        vec![addr(1), addr(2), addr(3)]
    }

    #[test]
    fn test_fund_and_transfer() {
        let ledger = Ledger::new();
        assert_eq!(ledger.fund(&addr(1), 100).unwrap(), 100);
        assert_eq!(ledger.fund(&addr(1), 50).unwrap(), 150);

        ledger.invoke(&addr(1), &addr(2), 40, &[]).unwrap();
        assert_eq!(ledger.balance_of(&addr(1)), 110);
        assert_eq!(ledger.balance_of(&addr(2)), 40);

        assert_eq!(
            ledger.invoke(&addr(2), &addr(1), 41, &[]),
            Err(DispatchError::InsufficientBalance { have: 40, need: 41 })
        );
        assert_eq!(ledger.balance_of(&addr(2)), 40);

        // Self transfer leaves the balance unchanged
        ledger.invoke(&addr(2), &addr(2), 40, &[]).unwrap();
        assert_eq!(ledger.balance_of(&addr(2)), 40);
    }

    #[test]
    fn test_fund_overflow() {
        let ledger = Ledger::new();
        ledger.fund(&addr(1), u128::MAX).unwrap();
        assert_eq!(
            ledger.fund(&addr(1), 1),
            Err(DispatchError::BalanceOverflow(addr(1)))
        );
        assert_eq!(ledger.balance_of(&addr(1)), u128::MAX);
    }

    #[test]
    fn test_deployed_addresses_are_unique() {
        let ledger = Ledger::new();
        let a = ledger.deploy_wallet(&addr(9), owners(), 2).unwrap();
        let b = ledger.deploy_wallet(&addr(9), owners(), 2).unwrap();
        let c = ledger.deploy_factory(&addr(9));

        assert_ne!(a.address(), b.address());
        assert_ne!(b.address(), c.address());
        assert_eq!(ledger.wallets().len(), 2);
        assert_eq!(ledger.factories().len(), 1);
        assert!(ledger.wallet(&c.address()).is_none());
    }

    #[test]
    fn test_wallet_sends_value() {
        let ledger = Ledger::new();
        let wallet = ledger.deploy_wallet(&addr(9), owners(), 2).unwrap();
        ledger.fund(&wallet.address(), 1_000).unwrap();

        wallet.propose(&addr(1), addr(7), 600, vec![]).unwrap();
        wallet.confirm(&addr(1), 1).unwrap();
        wallet.confirm(&addr(2), 1).unwrap();
        assert!(wallet.execute(1, &ledger).unwrap().is_success());

        assert_eq!(ledger.balance_of(&wallet.address()), 400);
        assert_eq!(ledger.balance_of(&addr(7)), 600);

        // Second transfer exceeds the remaining balance
        wallet.propose(&addr(1), addr(7), 600, vec![]).unwrap();
        wallet.confirm(&addr(1), 2).unwrap();
        wallet.confirm(&addr(2), 2).unwrap();
        assert!(!wallet.execute(2, &ledger).unwrap().is_success());
        assert_eq!(ledger.balance_of(&wallet.address()), 400);

        // Top up and retry
        ledger.fund(&wallet.address(), 200).unwrap();
        assert!(wallet.execute(2, &ledger).unwrap().is_success());
        assert_eq!(ledger.balance_of(&addr(7)), 1_200);
    }

    #[test]
    fn test_deposit_into_wallet() {
        let ledger = Ledger::new();
        let wallet = ledger.deploy_wallet(&addr(9), owners(), 2).unwrap();
        ledger.fund(&addr(5), 10).unwrap();

        ledger.invoke(&addr(5), &wallet.address(), 10, &[]).unwrap();
        assert_eq!(ledger.balance_of(&wallet.address()), 10);
        assert_eq!(wallet.transaction_count(), 0);
    }

    #[test]
    fn test_failed_call_returns_value() {
        let ledger = Ledger::new();
        let wallet = ledger.deploy_wallet(&addr(9), owners(), 2).unwrap();
        ledger.fund(&addr(5), 10).unwrap();

        // addr(5) is not an owner, so the proposal reverts
        let payload = WalletCall::Propose {
            target: addr(5),
            value: 0,
            payload: vec![],
        }
        .encode();
        let err = ledger
            .invoke(&addr(5), &wallet.address(), 10, &payload)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Reverted(MultisigError::Unauthorized { .. })));
        assert_eq!(ledger.balance_of(&addr(5)), 10);
        assert_eq!(ledger.balance_of(&wallet.address()), 0);

        // Garbage payload
        assert!(matches!(
            ledger.invoke(&addr(5), &wallet.address(), 10, &[1, 2, 3, 4]),
            Err(DispatchError::Decode(_))
        ));
        assert_eq!(ledger.balance_of(&addr(5)), 10);
    }

    #[test]
    fn test_owner_calls_through_ledger() {
        let ledger = Ledger::new();
        let wallet = ledger.deploy_wallet(&addr(9), owners(), 2).unwrap();
        let target = wallet.address();

        let propose = WalletCall::Propose {
            target: addr(7),
            value: 0,
            payload: vec![],
        }
        .encode();
        let ret = ledger.invoke(&addr(1), &target, 0, &propose).unwrap();
        assert_eq!(ret, 1u64.to_be_bytes().to_vec());

        let confirm = WalletCall::Confirm { id: 1 }.encode();
        ledger.invoke(&addr(1), &target, 0, &confirm).unwrap();
        ledger.invoke(&addr(2), &target, 0, &confirm).unwrap();

        let execute = WalletCall::Execute { id: 1 }.encode();
        ledger.invoke(&addr(8), &target, 0, &execute).unwrap();
        assert!(wallet.transaction(1).unwrap().executed());
    }

    #[test]
    fn test_self_governance_through_ledger() {
        let ledger = Ledger::new();
        let wallet = ledger.deploy_wallet(&addr(9), owners(), 2).unwrap();

        let add = WalletCall::UpdateOwner {
            owner: addr(4),
            is_owner: true,
        }
        .encode();
        wallet.propose(&addr(1), wallet.address(), 0, add).unwrap();
        wallet.confirm(&addr(1), 1).unwrap();
        wallet.confirm(&addr(3), 1).unwrap();
        assert!(wallet.execute(1, &ledger).unwrap().is_success());
        assert_eq!(wallet.owner_at(3), Some(addr(4)));

        let remove = WalletCall::UpdateOwner {
            owner: addr(1),
            is_owner: false,
        }
        .encode();
        wallet.propose(&addr(4), wallet.address(), 0, remove).unwrap();
        wallet.confirm(&addr(4), 2).unwrap();
        wallet.confirm(&addr(2), 2).unwrap();
        assert!(wallet.execute(2, &ledger).unwrap().is_success());

        assert_eq!(wallet.owners(), vec![addr(2), addr(3), addr(4)]);
        assert!(matches!(
            wallet.propose(&addr(1), addr(7), 0, vec![]),
            Err(MultisigError::Unauthorized { .. })
        ));

        let events: Vec<WalletEvent> = wallet.events().into_iter().map(|r| r.event).collect();
        assert!(events.contains(&WalletEvent::OwnerAdded { owner: addr(4) }));
        assert!(events.contains(&WalletEvent::OwnerRemoved { owner: addr(1) }));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let ledger = Ledger::new();
        let factory = ledger.deploy_factory(&addr(9));
        let address = factory.create(&ledger, owners(), 2).unwrap();
        ledger.fund(&address, u128::MAX / 2).unwrap();

        let wallet = ledger.wallet(&address).unwrap();
        wallet.propose(&addr(1), addr(7), 5, vec![0xab]).unwrap();
        wallet.confirm(&addr(2), 1).unwrap();

        let json = serde_json::to_string(&ledger.snapshot()).unwrap();
        let restored = Ledger::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.balance_of(&address), u128::MAX / 2);
        let wallet = restored.wallet(&address).unwrap();
        assert!(wallet.confirmed(1, &addr(2)));
        assert_eq!(wallet.transaction(1).unwrap().payload, vec![0xab]);

        let factory = restored.factory(&factory.address()).unwrap();
        assert_eq!(factory.owner(), addr(9));
        assert_eq!(factory.wallets_created(), vec![address]);

        // Nonces survive, so new deployments do not collide
        let next = factory.create(&restored, owners(), 1).unwrap();
        assert_ne!(next, address);
    }
}

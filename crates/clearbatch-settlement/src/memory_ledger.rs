//! In-memory ledger state.
//!
//! Holds per-(account, asset) balances, constant-product pools and the
//! native fee pool. Implements [`LedgerState`], so a batch can clear
//! against it without a real ledger. Rollback is snapshot/restore: take a
//! snapshot before the round and restore it if the round fails.

use std::collections::BTreeMap;

use clearbatch_types::{AccountId, Asset, ClearbatchError, LedgerState, PoolEntry, PoolId, Result};

/// Ledger state backed by ordered maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryLedger {
    /// Per-(account, asset) balances.
    balances: BTreeMap<(AccountId, Asset), i64>,
    /// Pools keyed by canonical asset pair.
    pools: BTreeMap<(Asset, Asset), PoolEntry>,
    fee_pool: i64,
}

/// Frozen copy of an [`InMemoryLedger`], restorable after a failed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot(InMemoryLedger);

fn pool_key(a: &Asset, b: &Asset) -> (Asset, Asset) {
    if a < b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

fn check_reserves(entry: &PoolEntry) -> Result<()> {
    if entry.reserve_a < 0 || entry.reserve_b < 0 {
        return Err(ClearbatchError::InvalidPool {
            reason: format!("negative reserves in pool {}", entry.pool_id),
        });
    }
    Ok(())
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account. Deposits are never negative.
    pub fn deposit(&mut self, account: AccountId, asset: &Asset, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(ClearbatchError::InvalidAmount {
                reason: format!("negative deposit {amount}"),
            });
        }
        self.add_balance(&account, asset, amount)
    }

    #[must_use]
    pub fn balance(&self, account: &AccountId, asset: &Asset) -> i64 {
        self.balances
            .get(&(*account, asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn fee_pool(&self) -> i64 {
        self.fee_pool
    }

    /// Create (or replace) the pool between two assets.
    pub fn create_pool(
        &mut self,
        asset_x: Asset,
        asset_y: Asset,
        reserve_x: i64,
        reserve_y: i64,
        fee: u32,
    ) -> Result<PoolId> {
        if asset_x == asset_y {
            return Err(ClearbatchError::InvalidPool {
                reason: format!("pool trades {asset_x} against itself"),
            });
        }
        let entry = PoolEntry::new(asset_x, asset_y, reserve_x, reserve_y, fee);
        check_reserves(&entry)?;
        let pool_id = entry.pool_id;
        self.pools
            .insert((entry.asset_a.clone(), entry.asset_b.clone()), entry);
        Ok(pool_id)
    }

    #[must_use]
    pub fn pool(&self, a: &Asset, b: &Asset) -> Option<&PoolEntry> {
        self.pools.get(&pool_key(a, b))
    }

    /// Everything of `asset` the ledger holds: balances, pool reserves and,
    /// for the native asset, the fee pool.
    ///
    /// An issuer's own (possibly negative) balance counts, so the total is
    /// conserved by any sequence of transfers.
    #[must_use]
    pub fn total_supply(&self, asset: &Asset) -> i128 {
        let held: i128 = self
            .balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, amount)| i128::from(*amount))
            .sum();
        let pooled: i128 = self
            .pools
            .values()
            .map(|entry| {
                if &entry.asset_a == asset {
                    i128::from(entry.reserve_a)
                } else if &entry.asset_b == asset {
                    i128::from(entry.reserve_b)
                } else {
                    0
                }
            })
            .sum();
        let fees = if asset.is_native() { i128::from(self.fee_pool) } else { 0 };
        held + pooled + fees
    }

    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot(self.clone())
    }

    /// Discard every change made since `snapshot` was taken.
    pub fn restore(&mut self, snapshot: LedgerSnapshot) {
        *self = snapshot.0;
    }
}

impl LedgerState for InMemoryLedger {
    fn add_balance(&mut self, account: &AccountId, asset: &Asset, delta: i64) -> Result<()> {
        let available = self.balance(account, asset);
        let updated = available
            .checked_add(delta)
            .ok_or_else(|| ClearbatchError::BalanceOverflow { asset: asset.clone() })?;
        // Issuers create their own asset on demand.
        if updated < 0 && asset.issuer() != Some(account) {
            return Err(ClearbatchError::InsufficientBalance {
                account: account.to_string(),
                asset: asset.clone(),
                needed: delta.saturating_neg(),
                available,
            });
        }
        self.balances.insert((*account, asset.clone()), updated);
        Ok(())
    }

    fn add_to_fee_pool(&mut self, amount: i64) -> Result<()> {
        self.fee_pool = self
            .fee_pool
            .checked_add(amount)
            .ok_or(ClearbatchError::BalanceOverflow { asset: Asset::Native })?;
        Ok(())
    }

    fn load_pool(&self, a: &Asset, b: &Asset) -> Option<PoolEntry> {
        self.pool(a, b).cloned()
    }

    /// Pools are created with [`InMemoryLedger::create_pool`]; a batch may
    /// only overwrite one that exists.
    fn store_pool(&mut self, entry: PoolEntry) -> Result<()> {
        check_reserves(&entry)?;
        let Some(stored) = self.pools.get_mut(&(entry.asset_a.clone(), entry.asset_b.clone())) else {
            return Err(ClearbatchError::PoolNotFound(entry.pool_id.to_string()));
        };
        *stored = entry;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Asset {
        Asset::test_issued("USD")
    }

    #[test]
    fn deposit_and_spend() {
        let mut ledger = InMemoryLedger::new();
        let user = AccountId::test_account(1);
        ledger.deposit(user, &usd(), 1_000).unwrap();
        assert_eq!(ledger.balance(&user, &usd()), 1_000);

        ledger.add_balance(&user, &usd(), -400).unwrap();
        assert_eq!(ledger.balance(&user, &usd()), 600);
        assert!(ledger.deposit(user, &usd(), -1).is_err());
    }

    #[test]
    fn overdraft_is_rejected() {
        let mut ledger = InMemoryLedger::new();
        let user = AccountId::test_account(1);
        ledger.deposit(user, &Asset::Native, 10).unwrap();

        let err = ledger.add_balance(&user, &Asset::Native, -11).unwrap_err();
        assert!(matches!(
            err,
            ClearbatchError::InsufficientBalance {
                needed: 11,
                available: 10,
                ..
            }
        ));
        assert_eq!(ledger.balance(&user, &Asset::Native), 10);
    }

    #[test]
    fn issuer_can_go_negative_in_own_asset() {
        let mut ledger = InMemoryLedger::new();
        let issuer = *usd().issuer().unwrap();
        ledger.add_balance(&issuer, &usd(), -500).unwrap();
        assert_eq!(ledger.balance(&issuer, &usd()), -500);
        assert!(ledger.add_balance(&issuer, &Asset::Native, -1).is_err());
    }

    #[test]
    fn overflow_is_rejected() {
        let mut ledger = InMemoryLedger::new();
        let user = AccountId::test_account(1);
        ledger.deposit(user, &usd(), i64::MAX).unwrap();
        assert!(matches!(
            ledger.add_balance(&user, &usd(), 1),
            Err(ClearbatchError::BalanceOverflow { .. })
        ));
    }

    #[test]
    fn pools_are_canonical() {
        let mut ledger = InMemoryLedger::new();
        let id = ledger.create_pool(usd(), Asset::Native, 100, 200, 30).unwrap();
        let entry = ledger.load_pool(&usd(), &Asset::Native).unwrap();
        assert_eq!(entry.pool_id, id);
        assert_eq!(entry.asset_a, Asset::Native);
        assert_eq!(entry.reserve_a, 200);
        assert_eq!(ledger.load_pool(&Asset::Native, &usd()), Some(entry));
        assert!(ledger.create_pool(usd(), usd(), 1, 1, 30).is_err());
    }

    #[test]
    fn store_only_overwrites_existing_pools() {
        let mut ledger = InMemoryLedger::new();
        let stray = PoolEntry::new(usd(), Asset::Native, 10, 10, 30);
        assert!(matches!(
            ledger.store_pool(stray),
            Err(ClearbatchError::PoolNotFound(_))
        ));
        assert!(ledger.pool(&usd(), &Asset::Native).is_none());

        ledger.create_pool(usd(), Asset::Native, 100, 200, 30).unwrap();
        ledger
            .store_pool(PoolEntry::new(usd(), Asset::Native, 90, 230, 30))
            .unwrap();
        let entry = ledger.pool(&Asset::Native, &usd()).unwrap();
        assert_eq!((entry.reserve_a, entry.reserve_b), (230, 90));

        let mut negative = entry.clone();
        negative.reserve_a = -1;
        assert!(matches!(
            ledger.store_pool(negative),
            Err(ClearbatchError::InvalidPool { .. })
        ));
    }

    #[test]
    fn total_supply_counts_pools_and_fees() {
        let mut ledger = InMemoryLedger::new();
        let user = AccountId::test_account(1);
        ledger.deposit(user, &Asset::Native, 50).unwrap();
        ledger.create_pool(usd(), Asset::Native, 100, 200, 30).unwrap();
        ledger.add_to_fee_pool(7).unwrap();
        assert_eq!(ledger.total_supply(&Asset::Native), 257);
        assert_eq!(ledger.total_supply(&usd()), 100);
    }

    #[test]
    fn snapshot_restores_everything() {
        let mut ledger = InMemoryLedger::new();
        let user = AccountId::test_account(1);
        ledger.deposit(user, &usd(), 100).unwrap();
        let snapshot = ledger.snapshot();

        ledger.add_balance(&user, &usd(), -100).unwrap();
        ledger.add_to_fee_pool(3).unwrap();
        ledger.create_pool(usd(), Asset::Native, 1, 1, 30).unwrap();
        ledger.restore(snapshot);

        assert_eq!(ledger.balance(&user, &usd()), 100);
        assert_eq!(ledger.fee_pool(), 0);
        assert!(ledger.pool(&usd(), &Asset::Native).is_none());
    }
}

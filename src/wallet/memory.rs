//! In-memory Wallet Store
//!
//! Process-local store used when no PostgreSQL URL is configured, and by the
//! test suite. It keeps the transactional contract of the Postgres store:
//!
//! - row locks are per-wallet `tokio::sync::Mutex` guards owned by the
//!   transaction and released when it commits, rolls back or is dropped
//! - writes are buffered in the transaction and applied atomically on commit
//! - a lock request that would close a wait-for cycle fails with
//!   [`StoreError::Deadlock`] instead of blocking, mirroring Postgres' deadlock
//!   detector; an optional lock timeout yields [`StoreError::LockTimeout`]
//!
//! Failure injection hooks (`fail_next_*`) and operation counters exist so the
//! transfer path can be exercised against storage faults.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use super::error::StoreError;
use super::store::{UserWalletStream, WalletStore, WalletTx};
use super::types::{CurrencyType, UserWallet, Wallet};

#[derive(Debug, Clone)]
struct UserRow {
    firstname: String,
    lastname: String,
}

#[derive(Debug, Clone)]
struct WalletRow {
    owner: String,
    wallet: Wallet,
}

#[derive(Debug, Default, Clone)]
struct Tables {
    users: HashMap<String, UserRow>,
    /// Keyed by wallet id
    wallets: HashMap<String, WalletRow>,
}

impl Tables {
    /// Wallet owners ordered by user id
    fn users_with_wallets(&self) -> Vec<UserWallet> {
        let mut users: Vec<UserWallet> = self
            .wallets
            .values()
            .filter_map(|row| self.user_wallet(&row.owner))
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    fn user_wallet(&self, user_id: &str) -> Option<UserWallet> {
        let user = self.users.get(user_id)?;
        let wallet = self
            .wallets
            .values()
            .find(|w| w.owner == user_id)
            .map(|w| w.wallet.clone());
        Some(UserWallet {
            user_id: user_id.to_string(),
            firstname: user.firstname.clone(),
            lastname: user.lastname.clone(),
            wallet,
        })
    }
}

/// Row lock bookkeeping: which transaction holds each wallet, and which
/// wallet each blocked transaction waits for.
#[derive(Default)]
struct LockTable {
    rows: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    holders: HashMap<String, u64>,
    waiting: HashMap<u64, String>,
}

impl LockTable {
    /// Would `requester` waiting on `wallet_id` close a wait-for cycle?
    fn would_deadlock(&self, requester: u64, wallet_id: &str) -> bool {
        let mut current = wallet_id;
        let mut hops = 0;
        while let Some(&holder) = self.holders.get(current) {
            if holder == requester {
                return true;
            }
            match self.waiting.get(&holder) {
                Some(next) => current = next,
                None => return false,
            }
            hops += 1;
            if hops > self.holders.len() {
                return false;
            }
        }
        false
    }
}

#[derive(Default)]
struct Faults {
    begin: AtomicU32,
    lock: AtomicU32,
    commit: AtomicU32,
    lookup: AtomicBool,
    update_wallets: Mutex<HashSet<String>>,
}

/// Consume one pending injected failure, if any.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
struct Counters {
    lookups: AtomicUsize,
    direct_updates: AtomicUsize,
    begins: AtomicUsize,
    locks: AtomicUsize,
    tx_updates: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Point-in-time operation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub lookups: usize,
    pub direct_updates: usize,
    pub begins: usize,
    pub locks: usize,
    pub tx_updates: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

struct Inner {
    tables: Mutex<Tables>,
    locks: Mutex<LockTable>,
    next_tx_id: AtomicU64,
    lock_timeout: Option<Duration>,
    faults: Faults,
    counters: Counters,
}

impl Inner {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_table(&self) -> MutexGuard<'_, LockTable> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory wallet store; clones share the same data.
#[derive(Clone)]
pub struct InMemoryWalletStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryWalletStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(None)
    }

    /// Bound lock waits; `None` waits until the holder finishes.
    pub fn with_lock_timeout(lock_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                locks: Mutex::new(LockTable::default()),
                next_tx_id: AtomicU64::new(1),
                lock_timeout,
                faults: Faults::default(),
                counters: Counters::default(),
            }),
        }
    }

    /// Insert a user (and its wallet, when present) directly, outside any
    /// transaction.
    pub fn insert(&self, user: UserWallet) {
        let mut tables = self.inner.tables();
        if let Some(wallet) = user.wallet {
            tables.wallets.insert(
                wallet.wallet_id.clone(),
                WalletRow {
                    owner: user.user_id.clone(),
                    wallet,
                },
            );
        }
        tables.users.insert(
            user.user_id,
            UserRow {
                firstname: user.firstname,
                lastname: user.lastname,
            },
        );
    }

    /// Committed state of a wallet
    pub fn wallet(&self, wallet_id: &str) -> Option<Wallet> {
        self.inner
            .tables()
            .wallets
            .get(wallet_id)
            .map(|row| row.wallet.clone())
    }

    pub fn user_count(&self) -> usize {
        self.inner.tables().users.len()
    }

    pub fn wallet_count(&self) -> usize {
        self.inner.tables().wallets.len()
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            lookups: c.lookups.load(Ordering::SeqCst),
            direct_updates: c.direct_updates.load(Ordering::SeqCst),
            begins: c.begins.load(Ordering::SeqCst),
            locks: c.locks.load(Ordering::SeqCst),
            tx_updates: c.tx_updates.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
        }
    }

    /// Number of wallet row locks currently held
    pub fn held_locks(&self) -> usize {
        self.inner.lock_table().holders.len()
    }

    /// Make the next `n` calls to `begin` fail
    pub fn fail_next_begins(&self, n: u32) {
        self.inner.faults.begin.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` lock requests fail with a lock timeout
    pub fn fail_next_locks(&self, n: u32) {
        self.inner.faults.lock.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail
    pub fn fail_next_commits(&self, n: u32) {
        self.inner.faults.commit.store(n, Ordering::SeqCst);
    }

    /// Make every lookup fail until cleared
    pub fn fail_lookups(&self, fail: bool) {
        self.inner.faults.lookup.store(fail, Ordering::SeqCst);
    }

    /// Make every balance write to `wallet_id` fail
    pub fn fail_updates_for(&self, wallet_id: &str) {
        self.inner
            .faults
            .update_wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(wallet_id.to_string());
    }

    fn update_fault(&self, wallet_id: &str) -> Result<(), StoreError> {
        let failing = self
            .inner
            .faults
            .update_wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(wallet_id);
        if failing {
            return Err(StoreError::Unavailable(format!(
                "injected update failure on wallet {}",
                wallet_id
            )));
        }
        Ok(())
    }
}

fn check_balance(wallet_id: &str, currency: CurrencyType, value: i64) -> Result<(), StoreError> {
    if value < 0 {
        return Err(StoreError::Unavailable(format!(
            "check constraint violated: wallet {} {} = {}",
            wallet_id, currency, value
        )));
    }
    Ok(())
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn lookup_user_with_wallet(
        &self,
        user_id: &str,
    ) -> Result<Option<UserWallet>, StoreError> {
        self.inner.counters.lookups.fetch_add(1, Ordering::SeqCst);
        if self.inner.faults.lookup.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected lookup failure".into()));
        }
        Ok(self.inner.tables().user_wallet(user_id))
    }

    async fn list_users(&self) -> Result<Vec<UserWallet>, StoreError> {
        if self.inner.faults.lookup.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected lookup failure".into()));
        }
        Ok(self.inner.tables().users_with_wallets())
    }

    fn stream_users(&self) -> UserWalletStream {
        if self.inner.faults.lookup.load(Ordering::SeqCst) {
            let err = StoreError::Unavailable("injected lookup failure".into());
            return stream::once(async move { Err(err) }).boxed();
        }
        // Snapshot at call time; later writes are not observed.
        let users = self.inner.tables().users_with_wallets();
        stream::iter(users.into_iter().map(Ok)).boxed()
    }

    async fn update_wallet_balance(
        &self,
        wallet_id: &str,
        currency: CurrencyType,
        new_balance: i64,
    ) -> Result<u64, StoreError> {
        self.inner
            .counters
            .direct_updates
            .fetch_add(1, Ordering::SeqCst);
        self.update_fault(wallet_id)?;
        check_balance(wallet_id, currency, new_balance)?;

        let mut tables = self.inner.tables();
        match tables.wallets.get_mut(wallet_id) {
            Some(row) => {
                row.wallet.set_balance(currency, new_balance);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn begin(&self) -> Result<Box<dyn WalletTx>, StoreError> {
        self.inner.counters.begins.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.inner.faults.begin) {
            return Err(StoreError::Unavailable("injected begin failure".into()));
        }
        let id = self.inner.next_tx_id.fetch_add(1, Ordering::SeqCst);
        debug!(tx_id = id, "In-memory transaction opened");
        Ok(Box::new(InMemoryTx {
            id,
            store: self.clone(),
            guards: HashMap::new(),
            pending: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum PendingWrite {
    Balance {
        wallet_id: String,
        currency: CurrencyType,
        value: i64,
    },
    InsertUser {
        user_id: String,
        row: UserRow,
    },
    InsertWallet {
        user_id: String,
        wallet: Wallet,
    },
    DeleteWallet(String),
    DeleteUser(String),
}

/// Transaction over [`InMemoryWalletStore`]
pub struct InMemoryTx {
    id: u64,
    store: InMemoryWalletStore,
    guards: HashMap<String, OwnedMutexGuard<()>>,
    pending: Vec<PendingWrite>,
}

impl InMemoryTx {
    /// Whether a wallet row exists from this transaction's point of view
    fn wallet_visible(&self, wallet_id: &str) -> bool {
        for write in self.pending.iter().rev() {
            match write {
                PendingWrite::InsertWallet { wallet, .. } if wallet.wallet_id == wallet_id => {
                    return true;
                }
                PendingWrite::DeleteWallet(id) if id == wallet_id => return false,
                _ => {}
            }
        }
        self.store.inner.tables().wallets.contains_key(wallet_id)
    }

    fn user_visible(&self, user_id: &str) -> bool {
        for write in self.pending.iter().rev() {
            match write {
                PendingWrite::InsertUser { user_id: id, .. } if id == user_id => return true,
                PendingWrite::DeleteUser(id) if id == user_id => return false,
                _ => {}
            }
        }
        self.store.inner.tables().users.contains_key(user_id)
    }

    /// Take the row lock on `wallet_id`, waiting behind its current holder.
    async fn acquire_row(&mut self, wallet_id: &str) -> Result<(), StoreError> {
        if self.guards.contains_key(wallet_id) {
            return Ok(());
        }

        let row = {
            let mut table = self.store.inner.lock_table();
            let row = table.rows.entry(wallet_id.to_string()).or_default().clone();
            if let Ok(guard) = row.clone().try_lock_owned() {
                table.holders.insert(wallet_id.to_string(), self.id);
                drop(table);
                self.guards.insert(wallet_id.to_string(), guard);
                return Ok(());
            }
            if table.would_deadlock(self.id, wallet_id) {
                warn!(tx_id = self.id, wallet_id, "Deadlock detected");
                return Err(StoreError::Deadlock(wallet_id.to_string()));
            }
            table.waiting.insert(self.id, wallet_id.to_string());
            row
        };

        let acquired = match self.store.inner.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, row.lock_owned()).await.ok(),
            None => Some(row.lock_owned().await),
        };

        let mut table = self.store.inner.lock_table();
        table.waiting.remove(&self.id);
        match acquired {
            Some(guard) => {
                table.holders.insert(wallet_id.to_string(), self.id);
                drop(table);
                self.guards.insert(wallet_id.to_string(), guard);
                Ok(())
            }
            None => Err(StoreError::LockTimeout(wallet_id.to_string())),
        }
    }

    fn apply(&mut self) {
        let writes = std::mem::take(&mut self.pending);
        let mut tables = self.store.inner.tables();
        for write in writes {
            match write {
                PendingWrite::Balance {
                    wallet_id,
                    currency,
                    value,
                } => {
                    if let Some(row) = tables.wallets.get_mut(&wallet_id) {
                        row.wallet.set_balance(currency, value);
                    }
                }
                PendingWrite::InsertUser { user_id, row } => {
                    tables.users.insert(user_id, row);
                }
                PendingWrite::InsertWallet { user_id, wallet } => {
                    tables.wallets.insert(
                        wallet.wallet_id.clone(),
                        WalletRow {
                            owner: user_id,
                            wallet,
                        },
                    );
                }
                PendingWrite::DeleteWallet(wallet_id) => {
                    tables.wallets.remove(&wallet_id);
                }
                PendingWrite::DeleteUser(user_id) => {
                    tables.users.remove(&user_id);
                    tables.wallets.retain(|_, row| row.owner != user_id);
                }
            }
        }
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        // Clear bookkeeping before the guards (fields) release the rows.
        let mut table = self.store.inner.lock_table();
        table.waiting.remove(&self.id);
        for wallet_id in self.guards.keys() {
            if table.holders.get(wallet_id) == Some(&self.id) {
                table.holders.remove(wallet_id);
            }
        }
    }
}

#[async_trait]
impl WalletTx for InMemoryTx {
    async fn lock_wallet_for_update(&mut self, wallet_id: &str) -> Result<bool, StoreError> {
        self.store.inner.counters.locks.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.store.inner.faults.lock) {
            return Err(StoreError::LockTimeout(wallet_id.to_string()));
        }
        if !self.wallet_visible(wallet_id) {
            return Ok(false);
        }
        self.acquire_row(wallet_id).await?;
        Ok(true)
    }

    async fn update_wallet_balance(
        &mut self,
        wallet_id: &str,
        currency: CurrencyType,
        new_balance: i64,
    ) -> Result<u64, StoreError> {
        self.store
            .inner
            .counters
            .tx_updates
            .fetch_add(1, Ordering::SeqCst);
        self.store.update_fault(wallet_id)?;
        if !self.wallet_visible(wallet_id) {
            return Ok(0);
        }
        check_balance(wallet_id, currency, new_balance)?;
        // UPDATE takes the row lock implicitly.
        self.acquire_row(wallet_id).await?;
        self.pending.push(PendingWrite::Balance {
            wallet_id: wallet_id.to_string(),
            currency,
            value: new_balance,
        });
        Ok(1)
    }

    async fn insert_user(
        &mut self,
        user_id: &str,
        firstname: &str,
        lastname: &str,
    ) -> Result<(), StoreError> {
        if self.user_visible(user_id) {
            return Err(StoreError::Unavailable(format!(
                "duplicate key: customer {}",
                user_id
            )));
        }
        self.pending.push(PendingWrite::InsertUser {
            user_id: user_id.to_string(),
            row: UserRow {
                firstname: firstname.to_string(),
                lastname: lastname.to_string(),
            },
        });
        Ok(())
    }

    async fn insert_wallet(&mut self, user_id: &str, wallet: &Wallet) -> Result<(), StoreError> {
        if !self.user_visible(user_id) {
            return Err(StoreError::UserNotFound(user_id.to_string()));
        }
        if self.wallet_visible(&wallet.wallet_id) {
            return Err(StoreError::Unavailable(format!(
                "duplicate key: wallet {}",
                wallet.wallet_id
            )));
        }
        for currency in CurrencyType::ALL {
            check_balance(&wallet.wallet_id, currency, wallet.balance(currency))?;
        }
        self.pending.push(PendingWrite::InsertWallet {
            user_id: user_id.to_string(),
            wallet: wallet.clone(),
        });
        Ok(())
    }

    async fn delete_wallet(&mut self, wallet_id: &str) -> Result<u64, StoreError> {
        if !self.wallet_visible(wallet_id) {
            return Ok(0);
        }
        self.acquire_row(wallet_id).await?;
        self.pending
            .push(PendingWrite::DeleteWallet(wallet_id.to_string()));
        Ok(1)
    }

    async fn delete_user(&mut self, user_id: &str) -> Result<u64, StoreError> {
        if !self.user_visible(user_id) {
            return Ok(0);
        }
        self.pending.push(PendingWrite::DeleteUser(user_id.to_string()));
        Ok(1)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if take_fault(&self.store.inner.faults.commit) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        self.apply();
        self.store.inner.counters.commits.fetch_add(1, Ordering::SeqCst);
        debug!(tx_id = self.id, "In-memory transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.pending.clear();
        self.store
            .inner
            .counters
            .rollbacks
            .fetch_add(1, Ordering::SeqCst);
        debug!(tx_id = self.id, "In-memory transaction rolled back");
        Ok(())
    }
}

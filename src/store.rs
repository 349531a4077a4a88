// ============================================================================
// Store - durable transactional state on sled
// ============================================================================
//
// One sled tree per logical table. Records are JSON so Decimal amounts keep
// their exact representation. Multi-tree units of work go through
// `Store::transact`, which layers two bounds on sled's serializable
// transactions:
//   - at most `max_attempts` executions of the closure (conflict retries)
//   - a deadline checked on entry and again right before commit
// Exceeding either aborts the transaction, so nothing is written.
//
// ============================================================================

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, Transactional, TransactionalTree,
};
use sled::Tree;
use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{EngineError, EngineResult};

pub const TREE_ACCOUNTS: &str = "accounts";
pub const TREE_LEDGER_LOG: &str = "ledger_log";
pub const TREE_LEDGER_KEYS: &str = "ledger_keys";
pub const TREE_EVENTS: &str = "events";
pub const TREE_OUTCOMES: &str = "outcomes";
pub const TREE_SNAPSHOTS: &str = "odds_snapshots";
pub const TREE_PROMOTIONS: &str = "promotions";
pub const TREE_SLIPS: &str = "slips";
pub const TREE_SLIPS_BY_ACCOUNT: &str = "slips_by_account";
pub const TREE_SLIPS_BY_EVENT: &str = "slips_by_event";
pub const TREE_IDEMPOTENCY: &str = "idempotency";

/// Separator for composite keys. Identifiers are validated never to contain it.
pub const KEY_SEP: char = '/';

/// Result type used inside transaction closures
pub type TxResult<T> = Result<T, ConflictableTransactionError<EngineError>>;

/// Abort the surrounding transaction with an engine error.
pub fn abort<T>(err: EngineError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Build a composite key from its parts.
pub fn key(parts: &[&str]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEP);
        }
        out.push_str(part);
    }
    out
}

/// Prefix matching every composite key that starts with `head`.
pub fn prefix(head: &str) -> String {
    format!("{}{}", head, KEY_SEP)
}

// ============================================================================
// DEADLINE
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn check(&self) -> EngineResult<()> {
        if Instant::now() >= self.at {
            return Err(EngineError::Timeout(self.budget.as_millis() as u64));
        }
        Ok(())
    }
}

// ============================================================================
// CODEC
// ============================================================================

pub fn encode<T: Serialize>(value: &T) -> EngineResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read and decode a record outside a transaction.
pub fn read<T: DeserializeOwned>(tree: &Tree, key: &str) -> EngineResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => decode(&bytes).map(Some),
        None => Ok(None),
    }
}

/// Decode every record whose key starts with `prefix`, in key order.
pub fn scan<T: DeserializeOwned>(tree: &Tree, prefix: &str) -> EngineResult<Vec<T>> {
    let mut out = Vec::new();
    for entry in tree.scan_prefix(prefix.as_bytes()) {
        let (_key, value) = entry?;
        out.push(decode(&value)?);
    }
    Ok(out)
}

/// Decode every record in the tree.
pub fn scan_all<T: DeserializeOwned>(tree: &Tree) -> EngineResult<Vec<T>> {
    let mut out = Vec::new();
    for entry in tree.iter() {
        let (_key, value) = entry?;
        out.push(decode(&value)?);
    }
    Ok(out)
}

/// Read and decode a record inside a transaction.
pub fn tx_read<T: DeserializeOwned>(tree: &TransactionalTree, key: &str) -> TxResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => match decode(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => abort(e),
        },
        None => Ok(None),
    }
}

/// Encode and write a record inside a transaction.
pub fn tx_write<T: Serialize>(tree: &TransactionalTree, key: &str, value: &T) -> TxResult<()> {
    let bytes = match encode(value) {
        Ok(bytes) => bytes,
        Err(e) => return abort(e),
    };
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Store {
    db: sled::Db,
    pub accounts: Tree,
    pub ledger_log: Tree,
    pub ledger_keys: Tree,
    pub events: Tree,
    pub outcomes: Tree,
    pub snapshots: Tree,
    pub promotions: Tree,
    pub slips: Tree,
    pub slips_by_account: Tree,
    pub slips_by_event: Tree,
    pub idempotency: Tree,
    max_attempts: u32,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P, max_attempts: u32) -> EngineResult<Self> {
        let db = sled::Config::new().path(path).open()?;
        Self::from_db(db, max_attempts)
    }

    /// In-memory database removed on drop; used by tests.
    pub fn temporary() -> EngineResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, crate::config::DEFAULT_TXN_MAX_ATTEMPTS)
    }

    fn from_db(db: sled::Db, max_attempts: u32) -> EngineResult<Self> {
        Ok(Self {
            accounts: db.open_tree(TREE_ACCOUNTS)?,
            ledger_log: db.open_tree(TREE_LEDGER_LOG)?,
            ledger_keys: db.open_tree(TREE_LEDGER_KEYS)?,
            events: db.open_tree(TREE_EVENTS)?,
            outcomes: db.open_tree(TREE_OUTCOMES)?,
            snapshots: db.open_tree(TREE_SNAPSHOTS)?,
            promotions: db.open_tree(TREE_PROMOTIONS)?,
            slips: db.open_tree(TREE_SLIPS)?,
            slips_by_account: db.open_tree(TREE_SLIPS_BY_ACCOUNT)?,
            slips_by_event: db.open_tree(TREE_SLIPS_BY_EVENT)?,
            idempotency: db.open_tree(TREE_IDEMPOTENCY)?,
            db,
            max_attempts: max_attempts.max(1),
        })
    }

    /// Run `body` as one serializable unit of work over `trees`.
    ///
    /// sled re-runs the closure on conflict; past `max_attempts` runs the
    /// transaction aborts with `Conflict`. The deadline is checked before the
    /// body and again before commit, aborting with `Timeout`.
    pub fn transact<R, V, A, F>(&self, trees: R, deadline: Deadline, body: F) -> EngineResult<A>
    where
        R: Transactional<EngineError, View = V>,
        F: Fn(&V) -> TxResult<A>,
    {
        let attempts = Cell::new(0u32);
        let result = trees.transaction(|view| {
            let attempt = attempts.get() + 1;
            attempts.set(attempt);
            if attempt > self.max_attempts {
                return abort(EngineError::Conflict {
                    attempts: self.max_attempts,
                });
            }
            if let Err(e) = deadline.check() {
                return abort(e);
            }
            let out = body(view)?;
            if let Err(e) = deadline.check() {
                return abort(e);
            }
            Ok(out)
        });

        if attempts.get() > 1 {
            tracing::debug!(attempts = attempts.get(), "transaction retried after conflict");
        }

        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => EngineError::Storage(e),
        })
    }

    pub fn flush(&self) -> EngineResult<usize> {
        Ok(self.db.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Counter {
        value: u64,
    }

    #[test]
    fn test_composite_keys() {
        assert_eq!(key(&["acct", "slip"]), "acct/slip");
        assert_eq!(prefix("acct"), "acct/");
    }

    #[test]
    fn test_transaction_commits_across_trees() {
        let store = Store::temporary().unwrap();
        store
            .transact(
                (&store.accounts, &store.ledger_log),
                Deadline::after(Duration::from_secs(5)),
                |(accounts, log)| {
                    tx_write(accounts, "a", &Counter { value: 1 })?;
                    tx_write(log, "a/1", &Counter { value: 2 })?;
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(read::<Counter>(&store.accounts, "a").unwrap(), Some(Counter { value: 1 }));
        assert_eq!(scan::<Counter>(&store.ledger_log, "a/").unwrap().len(), 1);
    }

    #[test]
    fn test_abort_rolls_back_every_tree() {
        let store = Store::temporary().unwrap();
        let result: EngineResult<()> = store.transact(
            (&store.accounts, &store.ledger_log),
            Deadline::after(Duration::from_secs(5)),
            |(accounts, log)| {
                tx_write(accounts, "a", &Counter { value: 1 })?;
                tx_write(log, "a/1", &Counter { value: 2 })?;
                abort(EngineError::Validation("stop".into()))
            },
        );

        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(store.accounts.is_empty());
        assert!(store.ledger_log.is_empty());
    }

    #[test]
    fn test_expired_deadline_writes_nothing() {
        let store = Store::temporary().unwrap();
        let result: EngineResult<()> = store.transact(
            &store.accounts,
            Deadline::after(Duration::ZERO),
            |accounts| tx_write(accounts, "a", &Counter { value: 1 }),
        );

        assert!(matches!(result, Err(EngineError::Timeout(_))));
        assert!(store.accounts.is_empty());
    }
}

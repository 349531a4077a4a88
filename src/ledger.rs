//! Ledger Store for the sportsbook
//!
//! Single source of truth for player funds:
//! - `accounts` caches the current balance and a version counter per account
//! - `ledger_log` is the append-only transaction log, keyed `account/sequence`
//! - `ledger_keys` is the unique index on `(slip_id, kind)` that makes slip
//!   debits and credits happen at most once
//!
//! Every mutation is one read-modify-write of a single account row inside a
//! sled transaction. No operation ever touches two accounts.
//!
//! `LedgerTx` exposes the same primitives over transactional trees so the
//! acceptance and settlement engines can fold ledger writes into their own
//! unit of work.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionalTree;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::ids::{new_id, validate_id};
use crate::money::check_amount;
use crate::store::{abort, key, prefix, read, scan, tx_read, tx_write, Deadline, Store, TxResult};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Transaction kinds recorded in the log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TxKind {
    #[serde(rename = "Debit-Stake")]
    DebitStake,
    #[serde(rename = "Credit-Win")]
    CreditWin,
    #[serde(rename = "Credit-Refund")]
    CreditRefund,
    #[serde(rename = "Deposit")]
    Deposit,
    #[serde(rename = "Withdrawal")]
    Withdrawal,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::DebitStake => "Debit-Stake",
            TxKind::CreditWin => "Credit-Win",
            TxKind::CreditRefund => "Credit-Refund",
            TxKind::Deposit => "Deposit",
            TxKind::Withdrawal => "Withdrawal",
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, TxKind::CreditWin | TxKind::CreditRefund | TxKind::Deposit)
    }

    /// Amount as it affects the balance (negative for debits)
    pub fn signed(&self, amount: Decimal) -> Decimal {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }
}

/// Player account. `balance` caches the sum of the account's log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub last_name: String,
    pub balance: Decimal,
    /// Incremented by every mutation; doubles as the log sequence number
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

/// One append-only log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub account_id: String,
    pub slip_id: Option<String>,
    pub kind: TxKind,
    pub amount: Decimal,
    pub resulting_balance: Decimal,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// Proof that a stake was debited
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReservationToken {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub resulting_balance: Decimal,
}

impl From<&LedgerTransaction> for ReservationToken {
    fn from(tx: &LedgerTransaction) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            account_id: tx.account_id.clone(),
            amount: tx.amount,
            resulting_balance: tx.resulting_balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreditOutcome {
    Applied(LedgerTransaction),
    /// The `(slip_id, kind)` pair was credited before; nothing was written
    AlreadyApplied,
}

/// Result of replaying an account's log against its cached balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub account_id: String,
    pub cached_balance: Decimal,
    pub replayed_balance: Decimal,
    pub last_resulting_balance: Decimal,
    pub transaction_count: usize,
    pub consistent: bool,
}

fn log_key(account_id: &str, sequence: u64) -> String {
    key(&[account_id, &format!("{:020}", sequence)])
}

fn slip_key(slip_id: &str, kind: TxKind) -> String {
    key(&[slip_id, kind.as_str()])
}

// ============================================================================
// TRANSACTIONAL PRIMITIVES
// ============================================================================

/// Ledger operations bound to an open sled transaction.
pub struct LedgerTx<'a> {
    pub accounts: &'a TransactionalTree,
    pub log: &'a TransactionalTree,
    pub keys: &'a TransactionalTree,
}

impl<'a> LedgerTx<'a> {
    pub fn new(
        accounts: &'a TransactionalTree,
        log: &'a TransactionalTree,
        keys: &'a TransactionalTree,
    ) -> Self {
        Self { accounts, log, keys }
    }

    pub fn account(&self, account_id: &str) -> TxResult<Account> {
        match tx_read::<Account>(self.accounts, account_id)? {
            Some(account) => Ok(account),
            None => abort(EngineError::NotFound(format!("account {}", account_id))),
        }
    }

    /// Apply one signed movement to one account and append it to the log.
    fn post(
        &self,
        account_id: &str,
        kind: TxKind,
        amount: Decimal,
        slip_id: Option<&str>,
    ) -> TxResult<LedgerTransaction> {
        let mut account = self.account(account_id)?;
        let resulting = account.balance + kind.signed(amount);
        if resulting < Decimal::ZERO {
            return abort(EngineError::InsufficientFunds {
                available: account.balance,
                required: amount,
            });
        }

        account.balance = resulting;
        account.version += 1;

        let entry = LedgerTransaction {
            id: new_id(),
            account_id: account.id.clone(),
            slip_id: slip_id.map(str::to_string),
            kind,
            amount,
            resulting_balance: resulting,
            sequence: account.version,
            timestamp: Utc::now(),
        };

        tx_write(self.accounts, &account.id, &account)?;
        tx_write(self.log, &log_key(&account.id, entry.sequence), &entry)?;
        if let Some(slip_id) = slip_id {
            self.keys
                .insert(slip_key(slip_id, kind).as_bytes(), entry.id.as_bytes())?;
        }
        Ok(entry)
    }

    /// Check `balance >= amount` and debit the stake. A second debit for the
    /// same slip is an integrity violation.
    pub fn reserve(
        &self,
        account_id: &str,
        amount: Decimal,
        slip_id: Option<&str>,
    ) -> TxResult<ReservationToken> {
        if let Some(slip_id) = slip_id {
            if self.keys.get(slip_key(slip_id, TxKind::DebitStake).as_bytes())?.is_some() {
                tracing::error!(slip_id, account_id, "stake already debited for slip");
                return abort(EngineError::Integrity(format!(
                    "stake for slip {} was already debited",
                    slip_id
                )));
            }
        }
        let entry = self.post(account_id, TxKind::DebitStake, amount, slip_id)?;
        Ok(ReservationToken::from(&entry))
    }

    /// Credit a slip-related amount once per `(slip_id, kind)`.
    pub fn credit(
        &self,
        account_id: &str,
        amount: Decimal,
        slip_id: &str,
        kind: TxKind,
    ) -> TxResult<CreditOutcome> {
        if !kind.is_credit() {
            return abort(EngineError::Validation(format!(
                "{} is not a credit kind",
                kind.as_str()
            )));
        }
        if self.keys.get(slip_key(slip_id, kind).as_bytes())?.is_some() {
            return Ok(CreditOutcome::AlreadyApplied);
        }
        let entry = self.post(account_id, kind, amount, Some(slip_id))?;
        Ok(CreditOutcome::Applied(entry))
    }

    pub fn deposit(&self, account_id: &str, amount: Decimal) -> TxResult<LedgerTransaction> {
        self.post(account_id, TxKind::Deposit, amount, None)
    }

    pub fn withdraw(&self, account_id: &str, amount: Decimal) -> TxResult<LedgerTransaction> {
        self.post(account_id, TxKind::Withdrawal, amount, None)
    }
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Ledger {
    store: Store,
    timeout: Duration,
}

impl Ledger {
    pub fn new(store: Store, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    fn run<A, F>(&self, body: F) -> EngineResult<A>
    where
        F: Fn(&LedgerTx<'_>) -> TxResult<A>,
    {
        let store = &self.store;
        store.transact(
            (&store.accounts, &store.ledger_log, &store.ledger_keys),
            Deadline::after(self.timeout),
            |(accounts, log, keys)| body(&LedgerTx::new(accounts, log, keys)),
        )
    }

    pub fn open_account(&self, id: &str, name: &str, last_name: &str) -> EngineResult<Account> {
        validate_id("account", id)?;
        let account = Account {
            id: id.to_string(),
            name: name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            balance: Decimal::ZERO,
            version: 0,
            created_at: Utc::now(),
        };

        let store = &self.store;
        store.transact(&store.accounts, Deadline::after(self.timeout), |accounts| {
            if accounts.get(id.as_bytes())?.is_some() {
                return abort(EngineError::AccountExists(id.to_string()));
            }
            tx_write(accounts, id, &account)
        })?;

        tracing::info!(account_id = id, "account opened");
        Ok(account)
    }

    pub fn account(&self, account_id: &str) -> EngineResult<Account> {
        read::<Account>(&self.store.accounts, account_id)?
            .ok_or_else(|| EngineError::NotFound(format!("account {}", account_id)))
    }

    pub fn balance(&self, account_id: &str) -> EngineResult<Decimal> {
        Ok(self.account(account_id)?.balance)
    }

    /// Debit a stake outside of slip acceptance.
    pub fn reserve(
        &self,
        account_id: &str,
        amount: Decimal,
        slip_id: Option<&str>,
    ) -> EngineResult<ReservationToken> {
        let amount = check_amount(amount).map_err(EngineError::InvalidAmount)?;
        let token = self.run(|ledger| ledger.reserve(account_id, amount, slip_id))?;
        tracing::info!(
            account_id,
            amount = %amount,
            balance = %token.resulting_balance,
            "stake reserved"
        );
        Ok(token)
    }

    pub fn credit(
        &self,
        account_id: &str,
        amount: Decimal,
        slip_id: &str,
        kind: TxKind,
    ) -> EngineResult<CreditOutcome> {
        let amount = check_amount(amount).map_err(EngineError::InvalidAmount)?;
        let outcome = self.run(|ledger| ledger.credit(account_id, amount, slip_id, kind))?;
        match &outcome {
            CreditOutcome::Applied(tx) => tracing::info!(
                account_id,
                slip_id,
                kind = kind.as_str(),
                amount = %amount,
                balance = %tx.resulting_balance,
                "credit applied"
            ),
            CreditOutcome::AlreadyApplied => tracing::info!(
                account_id,
                slip_id,
                kind = kind.as_str(),
                "credit already applied, skipping"
            ),
        }
        Ok(outcome)
    }

    pub fn deposit(&self, account_id: &str, amount: Decimal) -> EngineResult<LedgerTransaction> {
        let amount = check_amount(amount).map_err(EngineError::InvalidAmount)?;
        let tx = self.run(|ledger| ledger.deposit(account_id, amount))?;
        tracing::info!(account_id, amount = %amount, balance = %tx.resulting_balance, "deposit");
        Ok(tx)
    }

    pub fn withdraw(&self, account_id: &str, amount: Decimal) -> EngineResult<LedgerTransaction> {
        let amount = check_amount(amount).map_err(EngineError::InvalidAmount)?;
        let tx = self.run(|ledger| ledger.withdraw(account_id, amount))?;
        tracing::info!(account_id, amount = %amount, balance = %tx.resulting_balance, "withdrawal");
        Ok(tx)
    }

    /// The account's log in sequence order.
    pub fn history(&self, account_id: &str) -> EngineResult<Vec<LedgerTransaction>> {
        self.account(account_id)?;
        scan(&self.store.ledger_log, &prefix(account_id))
    }

    /// Replay the log and compare it with the cached balance.
    pub fn reconcile(&self, account_id: &str) -> EngineResult<ReconcileReport> {
        let account = self.account(account_id)?;
        let history = self.history(account_id)?;

        let replayed: Decimal = history.iter().map(|tx| tx.kind.signed(tx.amount)).sum();
        let last = history
            .last()
            .map(|tx| tx.resulting_balance)
            .unwrap_or(Decimal::ZERO);
        let consistent = replayed == account.balance
            && last == account.balance
            && history.len() as u64 == account.version;

        if !consistent {
            tracing::error!(
                account_id,
                cached = %account.balance,
                replayed = %replayed,
                "ledger reconciliation mismatch"
            );
        }

        Ok(ReconcileReport {
            account_id: account.id,
            cached_balance: account.balance,
            replayed_balance: replayed,
            last_resulting_balance: last,
            transaction_count: history.len(),
            consistent,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

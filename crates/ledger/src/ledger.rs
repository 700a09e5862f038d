//! Ledger abstraction and in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use pixelmint_core::{image_tokens, AccountId, ImageSize, Quality};

use crate::account::{Account, AccountSettings};

/// Ledger error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A debit was denied; no mutation was performed.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("account not found: {0}")]
    NotFound(AccountId),

    /// Debits and credits must move a positive amount.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Token ledger abstraction.
///
/// Implementations must serialize concurrent debits against the same
/// account: two simultaneous submissions covered by only one balance must
/// not both succeed. Refund correctness is the caller's responsibility:
/// the ledger knows nothing about jobs or escrow, it only moves tokens.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch an account, or create it with the initial grant on first
    /// contact. Returns `(account, created)`.
    async fn get_or_create(&self, id: AccountId) -> Result<(Account, bool), LedgerError>;

    /// Fetch an account by id.
    async fn get(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    /// Atomically check `balance >= amount` and decrement.
    ///
    /// Fails with [`LedgerError::InsufficientBalance`] without mutating
    /// anything when the balance does not cover the amount.
    async fn debit(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError>;

    /// Atomically increment the balance. Always succeeds for an existing
    /// account.
    async fn credit(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError>;

    /// Replace the account's generation settings.
    async fn update_settings(
        &self,
        id: AccountId,
        settings: AccountSettings,
    ) -> Result<Account, LedgerError>;
}

/// Opening balance granted to a new account: a fixed number of images at
/// the default quality/size.
pub fn default_initial_grant(credits: i64) -> i64 {
    credits * image_tokens(Quality::default(), ImageSize::default())
}

/// In-memory ledger for tests/dev.
///
/// A single mutex over the account map serializes every balance mutation,
/// which trivially satisfies the per-account serialization requirement.
#[derive(Debug)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<AccountId, Account>>,
    initial_grant: i64,
}

impl InMemoryLedger {
    pub fn new(initial_grant: i64) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            initial_grant,
        }
    }

    /// Insert an account as-is, replacing any existing one.
    ///
    /// Test seam: lets tests start from an arbitrary balance without
    /// replaying debits against the initial grant.
    pub fn seed(&self, account: Account) {
        self.accounts.lock().unwrap().insert(account.id, account);
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(default_initial_grant(10))
    }
}

#[async_trait::async_trait]
impl Ledger for InMemoryLedger {
    async fn get_or_create(&self, id: AccountId) -> Result<(Account, bool), LedgerError> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.get(&id) {
            return Ok((account.clone(), false));
        }
        let account = Account::new(id, self.initial_grant);
        accounts.insert(id, account.clone());
        Ok((account, true))
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn debit(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if account.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: account.balance,
            });
        }
        account.balance -= amount;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn credit(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        account.balance += amount;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn update_settings(
        &self,
        id: AccountId,
        settings: AccountSettings,
    ) -> Result<Account, LedgerError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        account.settings = settings;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }
}

//! Account entity: identity, balance, generation settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pixelmint_core::{AccountId, ImageSize, Quality};

/// Default model used for new accounts.
pub const DEFAULT_MODEL: &str = "gpt-image-1";

/// Per-account generation settings.
///
/// Settings are plain preferences; they are **not** part of the ledger
/// invariant and may change freely between submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub model: String,
    pub quality: Quality,
    pub size: ImageSize,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            quality: Quality::default(),
            size: ImageSize::default(),
        }
    }
}

/// A billing account.
///
/// `balance` is mutated only through [`crate::Ledger`] operations and is
/// always ≥ 0. Accounts are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Token balance in whole image tokens.
    pub balance: i64,
    pub settings: AccountSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account with the given opening balance.
    pub fn new(id: AccountId, balance: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance,
            settings: AccountSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

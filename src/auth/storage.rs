//! Account persistence.
//!
//! The engine only talks to [`AccountStore`]; [`MemoryAccountStore`] keeps
//! everything in process. Uniqueness of government ID and email is enforced
//! among activated accounts only, and rechecked atomically at activation.

use super::credentials::CredentialSet;
use crate::{collaborators::DocumentHandles, error::AuthError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub full_name: String,
    pub government_id: String,
    pub email: String,
    pub phone: String,
    pub activated: bool,
    pub credentials: CredentialSet,
    pub documents: DocumentHandles,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("identity already registered")]
    Conflict,
    #[error("account {0} not found")]
    NotFound(Uuid),
    #[error("account {0} is already activated")]
    AlreadyActivated(Uuid),
    #[error("account {0} is not activated")]
    NotActivated(Uuid),
    #[error("account store lock poisoned")]
    Poisoned,
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict => Self::Conflict,
            other => Self::Storage(other.to_string()),
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Store an unactivated shell. Pending shells never reserve identity keys.
    async fn insert_pending(&self, account: Account) -> Result<(), StorageError>;

    /// Replace a pending shell; activated accounts are rejected.
    async fn update_pending(&self, account: Account) -> Result<(), StorageError>;

    async fn remove_pending(&self, id: Uuid) -> Result<(), StorageError>;

    async fn find(&self, id: Uuid) -> Result<Option<Account>, StorageError>;

    /// Lookup by normalized email, preferring the activated account.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StorageError>;

    /// Whether an activated account already owns either key.
    async fn identity_taken(&self, government_id: &str, email: &str) -> Result<bool, StorageError>;

    /// Flip `activated`, claiming the identity keys in the same critical section.
    async fn activate(&self, id: Uuid) -> Result<Account, StorageError>;

    /// Swap the credential set of an activated account.
    async fn replace_credentials(
        &self,
        id: Uuid,
        credentials: CredentialSet,
    ) -> Result<Account, StorageError>;
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    by_government_id: HashMap<String, Uuid>,
    by_email: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryAccountStore {
    state: RwLock<MemoryState>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StorageError> {
        self.state.read().map_err(|_| {
            error!("account store lock poisoned");
            StorageError::Poisoned
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StorageError> {
        self.state.write().map_err(|_| {
            error!("account store lock poisoned");
            StorageError::Poisoned
        })
    }
}

impl MemoryState {
    fn taken(&self, government_id: &str, email: &str) -> bool {
        self.by_government_id.contains_key(government_id) || self.by_email.contains_key(email)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert_pending(&self, mut account: Account) -> Result<(), StorageError> {
        account.activated = false;
        self.write()?.accounts.insert(account.id, account);
        Ok(())
    }

    async fn update_pending(&self, account: Account) -> Result<(), StorageError> {
        let mut state = self.write()?;
        match state.accounts.get_mut(&account.id) {
            None => Err(StorageError::NotFound(account.id)),
            Some(existing) if existing.activated => Err(StorageError::AlreadyActivated(account.id)),
            Some(existing) => {
                *existing = Account {
                    activated: false,
                    ..account
                };
                Ok(())
            }
        }
    }

    async fn remove_pending(&self, id: Uuid) -> Result<(), StorageError> {
        let mut state = self.write()?;
        match state.accounts.get(&id) {
            Some(account) if account.activated => Err(StorageError::AlreadyActivated(id)),
            Some(_) => {
                state.accounts.remove(&id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<Account>, StorageError> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StorageError> {
        let state = self.read()?;
        if let Some(account) = state
            .by_email
            .get(email)
            .and_then(|id| state.accounts.get(id))
        {
            return Ok(Some(account.clone()));
        }
        Ok(state
            .accounts
            .values()
            .filter(|account| account.email == email)
            .max_by_key(|account| account.created_at)
            .cloned())
    }

    async fn identity_taken(&self, government_id: &str, email: &str) -> Result<bool, StorageError> {
        Ok(self.read()?.taken(government_id, email))
    }

    async fn activate(&self, id: Uuid) -> Result<Account, StorageError> {
        let mut state = self.write()?;
        let (government_id, email) = match state.accounts.get(&id) {
            None => return Err(StorageError::NotFound(id)),
            Some(account) if account.activated => return Err(StorageError::AlreadyActivated(id)),
            Some(account) => (account.government_id.clone(), account.email.clone()),
        };
        if state.taken(&government_id, &email) {
            debug!(%id, "activation lost the uniqueness race");
            return Err(StorageError::Conflict);
        }

        state.by_government_id.insert(government_id, id);
        state.by_email.insert(email, id);
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StorageError::NotFound(id))?;
        account.activated = true;
        Ok(account.clone())
    }

    async fn replace_credentials(
        &self,
        id: Uuid,
        credentials: CredentialSet,
    ) -> Result<Account, StorageError> {
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StorageError::NotFound(id))?;
        if !account.activated {
            return Err(StorageError::NotActivated(id));
        }
        account.credentials = credentials;
        Ok(account.clone())
    }
}

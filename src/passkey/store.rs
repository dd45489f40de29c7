//! Credential storage
//!
//! `CredentialStore` is the seam between the ceremony logic and wherever user
//! records live. `MemoryCredentialStore` keeps them in sharded maps so that
//! operations on different users never contend on one lock.
//!
//! Lock order: a `users` shard is always taken before a `credential_owners`
//! shard, never the other way round.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::types::User;
use crate::webauthn::{AuthenticationResult, Credential};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Credential not found")]
    CredentialNotFound,

    /// The credential id is already registered (to this or another user)
    #[error("Credential already registered")]
    DuplicateCredential,

    /// The stored counter changed between read and write
    #[error(
        "Signature counter changed concurrently: expected {expected}, found {actual}, received {received}"
    )]
    CounterConflict {
        expected: u32,
        actual: u32,
        received: u32,
    },
}

/// Storage capability used by the passkey service
pub trait CredentialStore: Send + Sync {
    /// Fetch a user by name
    ///
    /// # Errors
    /// `UserNotFound` if no record exists
    fn get_user(&self, user_name: &str) -> Result<User, StoreError>;

    /// Insert or replace a user record, keyed by name
    ///
    /// # Errors
    /// `DuplicateCredential` if the record carries a credential owned by another user
    fn put_user(&self, user: User) -> Result<(), StoreError>;

    /// Insert `user` unless a record with the same name exists; return the stored record
    ///
    /// # Errors
    /// Backend failures only; the in-memory store never fails here
    fn insert_user_if_absent(&self, user: User) -> Result<User, StoreError>;

    /// Append a credential to a user
    ///
    /// # Errors
    /// `UserNotFound`, or `DuplicateCredential` if the id exists for any user
    fn add_credential(&self, user_name: &str, credential: Credential) -> Result<(), StoreError>;

    /// Ids of every credential the user owns
    ///
    /// # Errors
    /// `UserNotFound` if no record exists
    fn exclude_list(&self, user_name: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Record a successful assertion if the counter still reads `expected_sign_count`
    ///
    /// # Errors
    /// `UserNotFound`, `CredentialNotFound`, or `CounterConflict` when the
    /// stored counter moved since the caller read it
    fn update_credential_usage(
        &self,
        user_name: &str,
        credential_id: &[u8],
        expected_sign_count: u32,
        result: &AuthenticationResult,
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    users: DashMap<String, User>,
    /// credential id -> owning user name
    credential_owners: DashMap<Vec<u8>, String>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("users", &self.users.len())
            .field("credentials", &self.credential_owners.len())
            .finish()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_user(&self, user_name: &str) -> Result<User, StoreError> {
        self.users
            .get(user_name)
            .map(|user| user.value().clone())
            .ok_or_else(|| StoreError::UserNotFound(user_name.to_string()))
    }

    fn put_user(&self, user: User) -> Result<(), StoreError> {
        let mut entry = self.users.entry(user.name.clone());

        let mut claimed: Vec<&[u8]> = Vec::new();
        for credential in &user.credentials {
            match self.credential_owners.entry(credential.credential_id.clone()) {
                Entry::Occupied(owner) if *owner.get() != user.name => {
                    drop(owner);
                    for id in claimed {
                        self.credential_owners.remove(id);
                    }
                    return Err(StoreError::DuplicateCredential);
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(user.name.clone());
                    claimed.push(&credential.credential_id);
                }
            }
        }

        if let Entry::Occupied(existing) = &mut entry {
            for old in &existing.get().credentials {
                if user.credential(&old.credential_id).is_none() {
                    self.credential_owners.remove(&old.credential_id);
                }
            }
        }

        entry.insert(user);
        Ok(())
    }

    fn insert_user_if_absent(&self, user: User) -> Result<User, StoreError> {
        Ok(self
            .users
            .entry(user.name.clone())
            .or_insert(user)
            .value()
            .clone())
    }

    fn add_credential(&self, user_name: &str, credential: Credential) -> Result<(), StoreError> {
        let mut user = self
            .users
            .get_mut(user_name)
            .ok_or_else(|| StoreError::UserNotFound(user_name.to_string()))?;

        match self.credential_owners.entry(credential.credential_id.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateCredential),
            Entry::Vacant(slot) => {
                slot.insert(user_name.to_string());
            }
        }

        user.credentials.push(credential);
        Ok(())
    }

    fn exclude_list(&self, user_name: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        self.users
            .get(user_name)
            .map(|user| user.credential_ids())
            .ok_or_else(|| StoreError::UserNotFound(user_name.to_string()))
    }

    fn update_credential_usage(
        &self,
        user_name: &str,
        credential_id: &[u8],
        expected_sign_count: u32,
        result: &AuthenticationResult,
    ) -> Result<(), StoreError> {
        let mut user = self
            .users
            .get_mut(user_name)
            .ok_or_else(|| StoreError::UserNotFound(user_name.to_string()))?;
        let credential = user
            .credentials
            .iter_mut()
            .find(|c| c.credential_id == credential_id)
            .ok_or(StoreError::CredentialNotFound)?;

        if credential.sign_count != expected_sign_count {
            return Err(StoreError::CounterConflict {
                expected: expected_sign_count,
                actual: credential.sign_count,
                received: result.sign_count,
            });
        }

        credential.sign_count = result.sign_count;
        credential.backup_state = result.backup_state;
        credential.last_used = Some(result.authenticated_at);
        Ok(())
    }
}

//! Passkey account records
//!
//! A `User` owns its credentials; the store hands out clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::display_name_for;
use crate::webauthn::{Base64UrlBytes, Credential, UserEntity};

/// A registered (or registering) account
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Stable user handle; 16 random bytes, never reused
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
    pub credentials: Vec<Credential>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a user with a fresh random handle and no credentials
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4().as_bytes().to_vec(),
            name: name.to_string(),
            display_name: display_name_for(name),
            credentials: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn credential_ids(&self) -> Vec<Vec<u8>> {
        self.credentials
            .iter()
            .map(|c| c.credential_id.clone())
            .collect()
    }

    #[must_use]
    pub fn credential(&self, credential_id: &[u8]) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| c.credential_id == credential_id)
    }

    /// The `user` member of creation options
    #[must_use]
    pub fn entity(&self) -> UserEntity {
        UserEntity {
            id: Base64UrlBytes(self.id.clone()),
            name: self.name.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_has_random_handle_and_no_credentials() {
        let alice = User::new("alice@example.com");
        let again = User::new("alice@example.com");
        assert_eq!(alice.id.len(), 16);
        assert_ne!(alice.id, again.id);
        assert!(alice.credentials.is_empty());
        assert_eq!(alice.display_name, "alice");
    }

    #[test]
    fn test_entity_mirrors_user() {
        let bob = User::new("bob");
        let entity = bob.entity();
        assert_eq!(entity.id.as_ref(), bob.id.as_slice());
        assert_eq!(entity.name, "bob");
        assert_eq!(entity.display_name, "bob");
    }
}

//! Challenge sessions
//!
//! Each begin call parks its ceremony state here under an opaque token. The
//! finish call takes it back out exactly once; whatever happens afterwards,
//! the entry is gone.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::crypto::generate_session_token;
use crate::webauthn::crypto;
use crate::webauthn::{AuthenticationState, RegistrationState};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration => write!(f, "registration"),
            Self::Authentication => write!(f, "authentication"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum CeremonyState {
    Registration(RegistrationState),
    Authentication(AuthenticationState),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("No pending ceremony for this session")]
    NotFound,

    #[error("Ceremony session expired")]
    Expired,

    #[error("Session belongs to a {actual} ceremony, not {expected}")]
    KindMismatch {
        expected: CeremonyKind,
        actual: CeremonyKind,
    },
}

/// A pending ceremony
#[derive(Clone, Debug)]
pub struct ChallengeSession {
    pub user_id: Vec<u8>,
    pub user_name: String,
    pub ceremony: CeremonyState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ChallengeSession {
    #[must_use]
    pub fn kind(&self) -> CeremonyKind {
        match self.ceremony {
            CeremonyState::Registration(_) => CeremonyKind::Registration,
            CeremonyState::Authentication(_) => CeremonyKind::Authentication,
        }
    }

    #[must_use]
    pub fn challenge(&self) -> &[u8] {
        match &self.ceremony {
            CeremonyState::Registration(state) => &state.challenge,
            CeremonyState::Authentication(state) => &state.challenge,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Token-keyed store of pending ceremonies
pub struct ChallengeManager {
    sessions: DashMap<String, ChallengeSession>,
    ttl: Duration,
}

impl ChallengeManager {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// 32 fresh random bytes
    #[must_use]
    pub fn generate_challenge(&self) -> Vec<u8> {
        crypto::generate_challenge()
    }

    /// Park a ceremony and return its token
    pub fn begin(
        &self,
        user_id: &[u8],
        user_name: &str,
        ceremony: CeremonyState,
    ) -> (String, ChallengeSession) {
        let purged = self.purge_expired();
        if purged > 0 {
            debug!("Purged {purged} expired ceremony sessions");
        }

        let now = Utc::now();
        let session = ChallengeSession {
            user_id: user_id.to_vec(),
            user_name: user_name.to_string(),
            ceremony,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let token = generate_session_token();
        self.sessions.insert(token.clone(), session.clone());
        (token, session)
    }

    /// Take the ceremony parked under `token`
    ///
    /// The entry is removed before any check, so a token can be consumed once.
    ///
    /// # Errors
    /// `NotFound` for unknown or already consumed tokens, `Expired` once the
    /// TTL has passed, `KindMismatch` for the wrong ceremony
    pub fn consume(
        &self,
        token: &str,
        kind: CeremonyKind,
    ) -> Result<ChallengeSession, ChallengeError> {
        let (_, session) = self.sessions.remove(token).ok_or(ChallengeError::NotFound)?;

        if session.is_expired_at(Utc::now()) {
            return Err(ChallengeError::Expired);
        }
        if session.kind() != kind {
            return Err(ChallengeError::KindMismatch {
                expected: kind,
                actual: session.kind(),
            });
        }
        Ok(session)
    }

    /// Drop expired sessions, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        before.saturating_sub(self.sessions.len())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl fmt::Debug for ChallengeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeManager")
            .field("pending", &self.sessions.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::UserVerificationRequirement;

    fn registration(challenge: Vec<u8>) -> CeremonyState {
        CeremonyState::Registration(RegistrationState {
            user_id: vec![1],
            challenge,
            user_verification: UserVerificationRequirement::Preferred,
            exclude_credentials: Vec::new(),
            created_at: Utc::now(),
        })
    }

    #[test]
    fn test_challenges_are_fresh() {
        let manager = ChallengeManager::new(Duration::seconds(300));
        let a = manager.generate_challenge();
        assert_eq!(a.len(), 32);
        assert_ne!(a, manager.generate_challenge());
    }

    #[test]
    fn test_consume_is_one_shot() {
        let manager = ChallengeManager::new(Duration::seconds(300));
        let (token, session) = manager.begin(&[1], "alice", registration(vec![9; 32]));
        assert_eq!(session.challenge(), &[9u8; 32][..]);
        assert_eq!(manager.pending(), 1);

        let consumed = manager.consume(&token, CeremonyKind::Registration).unwrap();
        assert_eq!(consumed.user_name, "alice");
        assert_eq!(
            manager.consume(&token, CeremonyKind::Registration).unwrap_err(),
            ChallengeError::NotFound
        );
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn test_unknown_token() {
        let manager = ChallengeManager::new(Duration::seconds(300));
        assert_eq!(
            manager.consume("nope", CeremonyKind::Authentication).unwrap_err(),
            ChallengeError::NotFound
        );
    }

    #[test]
    fn test_kind_mismatch_still_consumes() {
        let manager = ChallengeManager::new(Duration::seconds(300));
        let (token, _) = manager.begin(&[1], "alice", registration(vec![1; 32]));

        assert_eq!(
            manager.consume(&token, CeremonyKind::Authentication).unwrap_err(),
            ChallengeError::KindMismatch {
                expected: CeremonyKind::Authentication,
                actual: CeremonyKind::Registration,
            }
        );
        assert_eq!(
            manager.consume(&token, CeremonyKind::Registration).unwrap_err(),
            ChallengeError::NotFound
        );
    }

    #[test]
    fn test_expired_session_rejected_and_purged() {
        let manager = ChallengeManager::new(Duration::zero());
        let (token, _) = manager.begin(&[1], "alice", registration(vec![1; 32]));
        assert_eq!(
            manager.consume(&token, CeremonyKind::Registration).unwrap_err(),
            ChallengeError::Expired
        );

        manager.begin(&[1], "alice", registration(vec![2; 32]));
        assert_eq!(manager.purge_expired(), 1);
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn test_tokens_are_distinct() {
        let manager = ChallengeManager::new(Duration::seconds(300));
        let (a, _) = manager.begin(&[1], "alice", registration(vec![1; 32]));
        let (b, _) = manager.begin(&[1], "alice", registration(vec![1; 32]));
        assert_ne!(a, b);
        assert_eq!(manager.pending(), 2);
    }
}

//! In-memory identity provider.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::{DashMap, Entry};
use uuid::Uuid;

use crate::auth::{Identity, IdentityProvider};
use crate::crypto;
use crate::errors::{Error, Result};

/// Minimum password length at sign-up, matching the hosted provider's rule.
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct StoredUser {
    uid: String,
    password: String,
    verified: bool,
}

/// In-memory [`IdentityProvider`] for tests and local development.
///
/// Accounts start unverified; [`mark_verified`](Self::mark_verified) stands in
/// for the user following the emailed link.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    /// Accounts keyed by email.
    users: DashMap<String, StoredUser>,
    current: ArcSwapOption<Identity>,
    current_token: ArcSwapOption<String>,
    /// Verification emails sent, counted per uid.
    verification_sent: DashMap<String, usize>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account directly, bypassing sign-up side effects. Chainable.
    pub fn with_user(self, email: &str, password: &str, verified: bool) -> Self {
        self.users.insert(
            email.to_string(),
            StoredUser {
                uid: Uuid::new_v4().to_string(),
                password: password.to_string(),
                verified,
            },
        );
        self
    }

    /// Provider uid for an email, if the account exists.
    pub fn uid_of(&self, email: &str) -> Option<String> {
        self.users.get(email).map(|user| user.uid.clone())
    }

    /// Stand-in for following the emailed verification link.
    pub fn mark_verified(&self, email: &str) {
        if let Some(mut user) = self.users.get_mut(email) {
            user.verified = true;
        }
    }

    /// How many verification emails were sent to this uid.
    pub fn verification_emails_sent(&self, uid: &str) -> usize {
        self.verification_sent.get(uid).map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(Error::WeakPassword);
        }

        match self.users.entry(email.to_string()) {
            Entry::Occupied(_) => Err(Error::EmailAlreadyInUse),
            Entry::Vacant(entry) => {
                let uid = Uuid::new_v4().to_string();
                entry.insert(StoredUser {
                    uid: uid.clone(),
                    password: password.to_string(),
                    verified: false,
                });
                Ok(Identity {
                    uid,
                    email: email.to_string(),
                    email_verified: false,
                })
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = {
            let user = self.users.get(email).ok_or(Error::InvalidCredentials)?;
            if user.password != password {
                return Err(Error::InvalidCredentials);
            }
            Identity {
                uid: user.uid.clone(),
                email: email.to_string(),
                email_verified: user.verified,
            }
        };

        self.current.store(Some(Arc::new(identity.clone())));
        self.current_token.store(Some(Arc::new(crypto::generate_session_token())));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        self.current.store(None);
        self.current_token.store(None);
        Ok(())
    }

    async fn send_email_verification(&self, uid: &str) -> Result<()> {
        if !self.users.iter().any(|user| user.uid == uid) {
            return Err(Error::NotFound {
                resource: "User".to_string(),
                id: uid.to_string(),
            });
        }
        *self.verification_sent.entry(uid.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn id_token(&self) -> Result<String> {
        self.current_token
            .load_full()
            .map(|token| (*token).clone())
            .ok_or(Error::NotSignedIn)
    }
}

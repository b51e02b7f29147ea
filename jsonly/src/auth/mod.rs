//! Identity and session primitives.
//!
//! Sign-up, sign-in, sign-out, email verification, and bearer-token issuance
//! are delegated to an external identity provider behind [`IdentityProvider`].
//! [`InMemoryIdentityProvider`] backs tests and local development; handling of
//! the emailed verification link itself stays external.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::UserId;

pub mod memory;

pub use memory::InMemoryIdentityProvider;

/// A signed-in (or newly created) user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-unique user id; also the id of the `users` document.
    pub uid: UserId,
    pub email: String,
    /// Whether the verification link for this email has been followed.
    pub email_verified: bool,
}

/// External identity provider.
///
/// Implementations map their own failure modes onto the crate error variants
/// (`EmailAlreadyInUse`, `WeakPassword`, `InvalidCredentials`); the session
/// layer adds the user-facing fallbacks on top.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account. The new identity starts unverified.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity>;

    /// Authenticate and establish the provider-side session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Tear down the provider-side session. Idempotent.
    async fn sign_out(&self) -> Result<()>;

    /// Send the verification link for the account's email address.
    async fn send_email_verification(&self, uid: &str) -> Result<()>;

    /// Bearer token for the currently signed-in user.
    async fn id_token(&self) -> Result<String>;
}

//! API client credentials for programmatic access to the analysis backend.
//!
//! A credential pair is provisioned client-side at sign-up and stored in the
//! user document. Lookup reads it back from there; rotation and backend-driven
//! provisioning go through the analysis backend, which stores only a hash of
//! the secret.

use std::sync::Arc;

use uuid::Uuid;

use crate::analysis::{AnalysisClient, ClientCredentials};
use crate::crypto::generate_client_secret;
use crate::errors::{Error, Result};
use crate::store::{DocumentStore, USERS_COLLECTION};

/// A fresh client-side credential pair for a new account.
pub fn generate_credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: Uuid::new_v4().to_string(),
        client_secret: generate_client_secret(),
    }
}

/// Credential lookup and rotation for one user.
#[derive(Clone)]
pub struct CredentialsService {
    store: Arc<dyn DocumentStore>,
    analysis: AnalysisClient,
}

impl CredentialsService {
    pub fn new(store: Arc<dyn DocumentStore>, analysis: AnalysisClient) -> Self {
        Self { store, analysis }
    }

    /// The client id stored in `users/{uid}`.
    ///
    /// # Errors
    /// [`Error::UserDocumentNotFound`] when the document is missing,
    /// [`Error::ClientIdNotFound`] when it carries no `clientId` field.
    pub async fn client_id(&self, uid: &str) -> Result<String> {
        let document = self
            .store
            .get(USERS_COLLECTION, uid)
            .await?
            .ok_or(Error::UserDocumentNotFound)?;
        document
            .get_str("clientId")
            .map(str::to_string)
            .ok_or(Error::ClientIdNotFound)
    }

    /// Rotate the secret through the backend. The returned plaintext is shown
    /// once and never stored client-side.
    pub async fn regenerate_secret(&self, uid: &str) -> Result<ClientCredentials> {
        self.analysis.regenerate_client_secret(uid).await
    }

    /// Backend-driven provisioning: ensures the user document server-side and
    /// returns fresh credentials.
    pub async fn register_client(&self, token: &str) -> Result<ClientCredentials> {
        self.analysis.register_client(token).await
    }
}

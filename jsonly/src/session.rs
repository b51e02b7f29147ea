//! The client-core facade: one object owning the current identity and every
//! collaborator.
//!
//! A [`Session`] is constructed from the identity provider, the document
//! store, and the analysis client; it wires up the write queue and the
//! template/usage/credentials services itself. Authentication state lives
//! here (not in any global), and every user-facing flow of the product runs
//! through it: account creation, sign-in/out, and quota-gated document
//! uploads.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analysis::{AnalysisClient, Extraction, FilePart};
use crate::auth::{Identity, IdentityProvider};
use crate::credentials::{self, CredentialsService};
use crate::errors::{Error, Result};
use crate::store::{DocumentStore, WriteQueue, WriteRequest, USERS_COLLECTION};
use crate::templates::TemplateService;
use crate::types::DocumentValue;
use crate::usage::UsageService;

/// Dependency-injected session over the identity provider, document store,
/// and analysis backend.
#[derive(Clone)]
pub struct Session {
    identity_provider: Arc<dyn IdentityProvider>,
    queue: WriteQueue,
    analysis: AnalysisClient,
    templates: TemplateService,
    usage: UsageService,
    credentials: CredentialsService,
    current: Arc<ArcSwapOption<Identity>>,
}

impl Session {
    /// Wire up the services and spawn the write-queue worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        identity_provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        analysis: AnalysisClient,
    ) -> Self {
        let queue = WriteQueue::spawn(Arc::clone(&store), CancellationToken::new());
        let templates = TemplateService::new(Arc::clone(&store), analysis.clone());
        let usage = UsageService::new(Arc::clone(&store));
        let credentials = CredentialsService::new(store, analysis.clone());

        Self {
            identity_provider,
            queue,
            analysis,
            templates,
            usage,
            credentials,
            current: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Create an account, provision client credentials into the user
    /// document, and send the verification email.
    ///
    /// The user document is persisted through the write queue; the session
    /// stays signed out until the email is verified and the user signs in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        let identity = self
            .identity_provider
            .sign_up(email, password)
            .await
            .map_err(|e| match e {
                Error::EmailAlreadyInUse | Error::WeakPassword => e,
                _ => Error::SignUpFailed,
            })?;
        debug!("Created account for {}", identity.uid);

        let credentials = credentials::generate_credentials();
        let mut document = DocumentValue::new();
        document.insert("clientId", Value::String(credentials.client_id));
        document.insert("clientSecret", Value::String(credentials.client_secret));
        document.insert("email", Value::String(email.to_string()));
        document.insert("createdAt", Value::String(Utc::now().to_rfc3339()));

        let request = WriteRequest::builder()
            .collection(USERS_COLLECTION)
            .document_id(identity.uid.clone())
            .payload(document)
            .build();
        self.queue.enqueue(request)?;

        self.identity_provider.send_email_verification(&identity.uid).await?;
        Ok(())
    }

    /// Authenticate and adopt the identity as the session's current user.
    ///
    /// # Errors
    /// Any provider rejection surfaces as [`Error::InvalidCredentials`].
    /// An unverified email signs the user straight back out and returns
    /// [`Error::EmailNotVerified`].
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self
            .identity_provider
            .sign_in(email, password)
            .await
            .map_err(|_| Error::InvalidCredentials)?;

        if !identity.email_verified {
            if let Err(e) = self.identity_provider.sign_out().await {
                warn!("Failed to sign out unverified user: {}", e);
            }
            return Err(Error::EmailNotVerified);
        }

        self.current.store(Some(Arc::new(identity.clone())));
        debug!("Signed in {}", identity.uid);
        Ok(identity)
    }

    /// Sign out with the provider and clear the current identity.
    pub async fn sign_out(&self) -> Result<()> {
        self.identity_provider
            .sign_out()
            .await
            .map_err(|_| Error::SignOutFailed)?;
        self.current.store(None);
        Ok(())
    }

    /// The signed-in identity, if any.
    pub fn current_user(&self) -> Option<Identity> {
        self.current.load_full().map(|identity| (*identity).clone())
    }

    /// Upload a document for extraction, optionally shaped by a template.
    ///
    /// Requires a signed-in user and a PDF or CSV file; metered plans are
    /// gated on their monthly allowance before the backend is contacted. A
    /// successful extraction records one usage row.
    pub async fn upload_document(&self, file: FilePart, template_id: Option<&str>) -> Result<Extraction> {
        let user = self.current_user().ok_or(Error::NotSignedIn)?;

        match file.extension().as_deref() {
            Some("pdf") | Some("csv") => {}
            _ => {
                return Err(Error::UnsupportedFileType {
                    filename: file.name.clone(),
                });
            }
        }

        self.usage.check_quota(&user.uid).await?;

        let token = self.identity_provider.id_token().await?;
        let document_name = file.name.clone();
        let extraction = match template_id {
            Some(id) => self.analysis.extract_with_template(file, id, &token).await?,
            None => self.analysis.extract(file, &token).await?,
        };

        // The extraction already succeeded; a metering failure is logged, not
        // surfaced
        if let Err(e) = self
            .usage
            .record_analysis(&user.uid, &document_name, extraction.nb_pages)
            .await
        {
            warn!("Failed to record document analysis: {}", e);
        }

        Ok(extraction)
    }

    /// The write queue handle, for callers that persist documents directly.
    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    pub fn usage(&self) -> &UsageService {
        &self.usage
    }

    pub fn credentials(&self) -> &CredentialsService {
        &self.credentials
    }

    /// Stop the write-queue worker.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

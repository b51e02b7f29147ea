//! # jsonly: Client Core for Document Analysis
//!
//! `jsonly` is the headless client core of a document-upload-and-analysis
//! service. It owns everything a frontend needs short of rendering: account
//! lifecycle, per-user document persistence, quota-gated uploads to the
//! analysis backend, saved extraction templates, and usage reporting.
//!
//! ## Overview
//!
//! Users upload PDF or CSV documents and get back structured JSON: a page
//! count plus a summary of the extracted fields. Summaries can be saved as
//! templates that shape later extractions, and templates in a folder can be
//! merged ("harmonized") into one canonical shape by the backend. Every
//! successful extraction is metered against the user's plan.
//!
//! All of that state flows through one [`Session`]. The session is handed its
//! identity provider and document store as trait objects, so tests (and any
//! embedder that brings its own persistence) swap in the bundled in-memory
//! implementations without touching the rest of the stack.
//!
//! ## Architecture
//!
//! The **session facade** ([`session`]) holds the signed-in identity and runs
//! the user-facing flows: sign-up provisions API credentials into the user's
//! document and triggers the verification email, sign-in refuses unverified
//! accounts, and uploads are gated on file type and monthly quota before the
//! backend is contacted.
//!
//! The **storage layer** ([`store`]) is a document-oriented key-value
//! interface (collections of JSON documents) behind the [`store::DocumentStore`]
//! trait. User-document writes go through a single-slot [`store::WriteQueue`]:
//! one write in flight at a time, later submissions rejected until the slot
//! frees, so a stalled backend can never pile up work.
//!
//! The **analysis client** ([`analysis`]) wraps the backend's HTTP surface:
//! multipart extraction (plain, template-shaped, batched, or detached into an
//! async task), template harmonization, and client-credential endpoints.
//!
//! The **services** ([`templates`], [`usage`], [`credentials`]) implement the
//! product features over the store and the analysis client.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jsonly::analysis::{AnalysisClient, FilePart};
//! use jsonly::auth::InMemoryIdentityProvider;
//! use jsonly::store::InMemoryStore;
//! use jsonly::{Config, Session};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let provider = Arc::new(InMemoryIdentityProvider::new());
//!     let store = Arc::new(InMemoryStore::default());
//!     let session = Session::new(provider, store, AnalysisClient::new(&config.backend));
//!
//!     session.sign_up("ana@example.com", "hunter22").await?;
//!     // ...the user verifies their email, then:
//!     session.sign_in("ana@example.com", "hunter22").await?;
//!
//!     let extraction = session
//!         .upload_document(FilePart::new("invoice.pdf", std::fs::read("invoice.pdf")?), None)
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&extraction.summary)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options and the environment
//! variable scheme.

pub mod analysis;
pub mod auth;
pub mod cli;
pub mod config;
pub mod credentials;
mod crypto;
pub mod errors;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod templates;
pub mod types;
pub mod usage;

pub use config::Config;
pub use errors::{Error, Result};
pub use session::Session;

/// Tests never run `main`, which installs the process-wide rustls crypto
/// provider; reqwest clients cannot be built until one is installed.
#[cfg(test)]
pub(crate) fn install_test_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

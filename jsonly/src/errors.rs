use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Sign-in rejected by the identity provider
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Sign-up with an email the provider already knows
    #[error("Email already in use")]
    EmailAlreadyInUse,

    /// Sign-up password below the provider's minimum length
    #[error("Password should be at least 6 characters")]
    WeakPassword,

    /// Sign-up failure with no more specific classification
    #[error("Failed to create account")]
    SignUpFailed,

    /// Sign-out rejected by the identity provider
    #[error("Failed to sign out")]
    SignOutFailed,

    /// Identity exists but its email has not been verified yet
    #[error("Email address has not been verified")]
    EmailNotVerified,

    /// Operation requires a signed-in user
    #[error("User not authenticated")]
    NotSignedIn,

    /// The `users/{uid}` document is missing
    #[error("User document not found")]
    UserDocumentNotFound,

    /// The `users/{uid}` document exists but carries no client id
    #[error("Client ID not found")]
    ClientIdNotFound,

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Composite-key template creation hit an existing document
    #[error("Template \"{name}\" already exists in folder \"{folder}\"")]
    TemplateExists { name: String, folder: String },

    /// Payload that is not a JSON object where one is required
    #[error("invalid document value: {reason}")]
    InvalidDocument { reason: String },

    /// Document store operation failure
    #[error("document store error: {message}")]
    Store { message: String },

    /// The single-slot write queue is already processing a request
    #[error("a write is already in progress")]
    WriteInProgress,

    /// Analysis backend returned a non-2xx response; `detail` is the parsed
    /// error message from its body, or the generic fallback
    #[error("{detail}")]
    Analysis { status: u16, detail: String },

    /// Webhook test delivery returned a non-2xx response
    #[error("Webhook test failed: {status} - {body}")]
    WebhookTest { status: u16, body: String },

    /// File extension outside the accepted set
    #[error("Invalid file type for {filename}. Only PDF and CSV files are allowed.")]
    UnsupportedFileType { filename: String },

    /// Metered plan with no pages left this month
    #[error("Monthly page limit reached: used {used} of {limit} pages")]
    QuotaExceeded { used: u64, limit: u32 },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// HTTP transport failure
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Payload (de)serialization failure
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Analysis { detail, .. } => detail.clone(),
            Error::BadRequest { message } | Error::Store { message } => message.clone(),
            Error::Http(_) | Error::Serialization(_) | Error::Internal { .. } | Error::Other(_) => {
                "An unknown error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use base64::{engine::general_purpose, Engine as _};
use rand::{rng, RngExt};

/// Generates a client secret with 256 bits of entropy.
///
/// Issued at sign-up alongside the generated client id and written into the
/// user document. The analysis backend stores only a hash of it, so the
/// plaintext is shown once and never recoverable afterwards.
///
/// # Returns
///
/// A string in the format `cs-{base64url_encoded_random_bytes}`
pub fn generate_client_secret() -> String {
    // 32 bytes (256 bits) of cryptographically secure random data
    let mut secret_bytes = [0u8; 32];
    rng().fill(&mut secret_bytes);

    format!("cs-{}", general_purpose::URL_SAFE_NO_PAD.encode(secret_bytes))
}

/// Generates a bearer token for the in-memory identity provider.
///
/// Hosted identity providers mint their own tokens; this one only needs to be
/// unique per sign-in.
pub fn generate_session_token() -> String {
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);

    format!("tok-{}", general_purpose::URL_SAFE_NO_PAD.encode(token_bytes))
}

//! Error taxonomy of the authentication engine.

use thiserror::Error;

/// Errors produced by the authentication protocol engine.
///
/// Every kind is terminal for the step that produced it; the engine never
/// retries on its own. Callers decide whether to re-prompt (invalid
/// credentials, invalid verification code) or abort.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The server rejected the username/password pair (HTTP 401 or 403).
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The server requires a second factor before issuing a session (HTTP 409).
    #[error("second factor required to complete sign-in")]
    RequiresSecondFactor,

    /// No trusted device is available and SMS delivery is not supported.
    #[error("no trusted device available; sms fallback is not supported")]
    RequiresUnsupportedPhoneFallback,

    /// The submitted verification code was rejected (HTTP 400 during MFA).
    #[error("invalid verification code")]
    InvalidVerificationCode,

    /// The service-key discovery endpoint could not be reached or understood.
    #[error("unable to retrieve auth service key: {0}")]
    ServiceKeyUnavailable(String),

    /// The sign-in probe response lacked the hashcash challenge headers.
    #[error("response is missing the hashcash challenge headers")]
    MalformedChallengeHeaders,

    /// The MFA challenge document could not be understood.
    #[error("malformed mfa response: {0}")]
    MalformedMfaResponse(String),

    /// The account requires a server-driven repair flow (HTTP 412).
    #[error("account needs repair, visit {location}")]
    AccountNeedsRepair {
        /// Repair URL taken from the `Location` response header.
        location: String,
        /// Repair session token, when the server provided one.
        token: Option<String>,
    },

    /// A status code outside the protocol table, preserved verbatim.
    #[error("unexpected http status {0}")]
    UnexpectedStatus(u16),

    /// A transport failure or a malformed server payload.
    #[error("transport or parsing failure: {0}")]
    TransportOrParsing(String),

    /// The in-flight attempt was cancelled by the caller.
    #[error("authentication cancelled")]
    Cancelled,

    /// The secrets store failed to load or persist state.
    #[error("secrets store failure: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::TransportOrParsing(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::TransportOrParsing(err.to_string())
    }
}

impl From<base64::DecodeError> for AuthError {
    fn from(err: base64::DecodeError) -> Self {
        AuthError::TransportOrParsing(format!("invalid base64: {err}"))
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, AuthError>;

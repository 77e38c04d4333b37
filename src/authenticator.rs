//! End-to-end authentication orchestration.
//!
//! The [`Authenticator`] owns the session, the HTTP exchange and the secrets
//! store for the duration of one sign-in flow, sequences the protocol steps,
//! and persists the session and cookies after every step that changes them.
//! No step is retried internally; every failure is surfaced so the caller
//! can decide whether to prompt again.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::Utc;

use crate::credential::{self, CredentialAuthenticator};
use crate::error::{AuthError, Result};
use crate::mfa::MfaCoordinator;
use crate::secrets::SecretsStore;
use crate::session::{CookieJar, Session};
use crate::transport::HttpExchange;

pub use crate::credential::AuthMethod;

/// Default base URL of the service-key discovery host.
const DEFAULT_LOOKUP_URL: &str = "https://appstoreconnect.apple.com";

/// The hashcash timestamp: current UTC time as `yyyyMMddHHmmss`.
fn current_timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Configuration for an [`Authenticator`].
///
/// Everything the engine needs is passed in explicitly; there is no ambient
/// global state.
pub struct AuthConfig {
    /// Base URL of the service-key discovery host.
    pub lookup_url: String,
    /// Source of the hashcash timestamp, injectable for deterministic tests.
    pub timestamp_source: fn() -> String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            timestamp_source: current_timestamp,
        }
    }
}

/// Progress of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing has happened yet.
    Start,
    /// The service key is on the session.
    ServiceKeyReady,
    /// The hashcash token is on the session.
    HashcashReady,
    /// Credentials were submitted; outcome pending.
    CredentialsSubmitted,
    /// The server demanded a second factor.
    AwaitingMfa,
    /// A verification code was submitted; outcome pending. Transient: the
    /// orchestrator resolves it before
    /// [`Authenticator::submit_two_factor_code`] returns, so callers only
    /// ever observe the resolved state.
    MfaCodeSubmitted,
    /// Terminal success; session and cookies are persisted.
    Authenticated,
    /// Terminal failure.
    Failed,
}

/// Outcome of a credential submission that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The session is fully authenticated and persisted.
    Authenticated,
    /// The server demands a second factor; continue with
    /// [`Authenticator::handle_two_factor_authentication`].
    SecondFactorRequired,
}

/// Sequences the authentication protocol and owns the mutable [`Session`].
///
/// One authenticator drives at most one attempt at a time; create one
/// instance per login flow.
pub struct Authenticator<S: SecretsStore> {
    http: HttpExchange,
    session: Session,
    store: S,
    config: AuthConfig,
    state: AuthState,
    cancel: Arc<AtomicBool>,
}

impl<S: SecretsStore> Authenticator<S> {
    /// Create an authenticator, reloading any persisted session and cookies
    /// from the store.
    pub fn new(config: AuthConfig, store: S) -> Result<Self> {
        let http = HttpExchange::new()?;
        let session = store.load_session()?.unwrap_or_default();
        if let Some(cookies) = store.load_cookies()? {
            http.set_cookies(cookies);
        }
        Ok(Self {
            http,
            session,
            store,
            config,
            state: AuthState::Start,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Current position in the authentication state machine.
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// The session as accumulated so far.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Snapshot of the cookies accumulated so far.
    pub fn cookies(&self) -> CookieJar {
        self.http.cookies()
    }

    /// Flag polled by the hashcash search; set it to abort an in-flight solve.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the credential half of the protocol.
    ///
    /// Sequences service-key discovery, the hashcash challenge and the
    /// selected credential flow. Returns
    /// [`AuthOutcome::SecondFactorRequired`] when the server answers 409, in
    /// which case the caller continues with
    /// [`handle_two_factor_authentication`](Self::handle_two_factor_authentication).
    pub async fn authenticate(
        &mut self,
        method: AuthMethod,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome> {
        self.state = AuthState::Start;

        let key = {
            let mut auth = self.credential();
            auth.ensure_service_key().await
        };
        let key = match key {
            Ok(key) => key,
            Err(err) => return self.fail(err),
        };
        self.state = AuthState::ServiceKeyReady;
        self.persist()?;

        let hashcash = {
            let mut auth = self.credential();
            auth.ensure_hashcash(&key).await
        };
        let hashcash = match hashcash {
            Ok(token) => token,
            Err(err) => return self.fail(err),
        };
        self.state = AuthState::HashcashReady;
        self.persist()?;

        let result = {
            let mut auth = self.credential();
            auth.submit(method, &key, &hashcash, username, password).await
        };
        self.state = AuthState::CredentialsSubmitted;
        self.persist()?;

        match result {
            Ok(()) => {
                log::debug!("credential exchange succeeded");
                self.state = AuthState::Authenticated;
                Ok(AuthOutcome::Authenticated)
            }
            Err(AuthError::RequiresSecondFactor) => {
                log::debug!("server demands a second factor");
                self.state = AuthState::AwaitingMfa;
                Ok(AuthOutcome::SecondFactorRequired)
            }
            Err(err) => self.fail(err),
        }
    }

    /// Fetch the MFA challenge; returns the required verification code length.
    pub async fn handle_two_factor_authentication(&mut self) -> Result<usize> {
        let result = {
            let mut mfa = MfaCoordinator::new(&self.http, &mut self.session);
            mfa.query_required_code_length().await
        };
        self.persist()?;
        match result {
            Ok(length) => Ok(length),
            Err(err) => self.fail(err),
        }
    }

    /// Submit the trusted-device verification code.
    ///
    /// An [`AuthError::InvalidVerificationCode`] leaves the attempt awaiting
    /// MFA so the caller can prompt for a fresh code; any other failure is
    /// terminal.
    pub async fn submit_two_factor_code(&mut self, pin: &str) -> Result<()> {
        self.state = AuthState::MfaCodeSubmitted;
        let result = {
            let mut mfa = MfaCoordinator::new(&self.http, &mut self.session);
            mfa.submit_code(pin).await
        };
        self.persist()?;
        match result {
            Ok(()) => {
                log::debug!("second factor verified");
                self.state = AuthState::Authenticated;
                Ok(())
            }
            Err(err @ AuthError::InvalidVerificationCode) => {
                self.state = AuthState::AwaitingMfa;
                Err(err)
            }
            Err(err) => self.fail(err),
        }
    }

    /// Sign out: best-effort server notification, then clear all local state.
    ///
    /// The session is reset to empty, the cookie jar emptied, and the secrets
    /// store wiped. A failing sign-out request is logged, not fatal.
    pub async fn sign_out(&mut self) -> Result<()> {
        if let Some(key) = self.session.service_key.clone() {
            let url = format!("{}/signout", key.auth_service_url);
            let headers = credential::session_headers(&self.session, &key);
            match self.http.post_empty(&url, &headers).await {
                Ok(exchange) => log::debug!("sign-out returned status {}", exchange.status),
                Err(err) => log::debug!("sign-out request failed: {err}"),
            }
        }
        self.session = Session::default();
        self.http.clear_cookies();
        self.store.clear()?;
        self.state = AuthState::Start;
        Ok(())
    }

    fn credential(&mut self) -> CredentialAuthenticator<'_> {
        CredentialAuthenticator::new(
            &self.http,
            &mut self.session,
            &self.config.lookup_url,
            self.config.timestamp_source,
            &self.cancel,
        )
    }

    fn persist(&self) -> Result<()> {
        self.store.save_session(&self.session)?;
        self.store.save_cookies(&self.http.cookies())
    }

    fn fail<T>(&mut self, err: AuthError) -> Result<T> {
        self.state = AuthState::Failed;
        Err(err)
    }
}

//! Authentication protocol engine for Apple ID sign-in.
//!
//! Drives the multi-step protocol spoken by the App Store Connect identity
//! service: a hashcash proof-of-work challenge, an SRP-6a password exchange
//! (or the legacy plain-password flow), and an optional trusted-device second
//! factor. The result is a reusable [`Session`] plus cookies, persisted
//! through a pluggable [`SecretsStore`], for subsequent authenticated API
//! calls.
//!
//! ## Quick start
//!
//! ```ignore
//! use asc_auth::{AuthConfig, AuthMethod, AuthOutcome, Authenticator, FileSecretsStore};
//!
//! let store = FileSecretsStore::in_user_data_dir()?;
//! let mut auth = Authenticator::new(AuthConfig::default(), store)?;
//!
//! match auth.authenticate(AuthMethod::Srp, &username, &password).await? {
//!     AuthOutcome::Authenticated => {}
//!     AuthOutcome::SecondFactorRequired => {
//!         let length = auth.handle_two_factor_authentication().await?;
//!         let pin = prompt_for_code(length);
//!         auth.submit_two_factor_code(&pin).await?;
//!     }
//! }
//! ```
//!
//! The engine never retries a failed step on its own: invalid credentials and
//! invalid verification codes come back as typed errors so the surrounding
//! prompt layer can ask again, and every other failure is terminal for the
//! attempt.

pub mod authenticator;
pub mod error;
pub mod hashcash;
pub mod secrets;
pub mod session;
pub mod srp;

mod credential;
mod mfa;
mod models;
mod transport;

pub use authenticator::{AuthConfig, AuthMethod, AuthOutcome, AuthState, Authenticator};
pub use error::{AuthError, Result};
pub use secrets::{FileSecretsStore, MemorySecretsStore, SecretsStore};
pub use session::{Cookie, CookieJar, ServiceKey, Session};

//! Trusted-device second-factor coordination.

use crate::credential::{
    ResponseContext, absorb_session_headers, interpret_response, session_headers,
};
use crate::error::{AuthError, Result};
use crate::models::{MfaChallenge, SecurityCode, SubmitSecurityCodeRequest};
use crate::session::{ServiceKey, Session};
use crate::transport::HttpExchange;

/// Drives the trusted-device MFA round for one session.
pub(crate) struct MfaCoordinator<'a> {
    http: &'a HttpExchange,
    session: &'a mut Session,
}

impl<'a> MfaCoordinator<'a> {
    pub(crate) fn new(http: &'a HttpExchange, session: &'a mut Session) -> Self {
        Self { http, session }
    }

    fn service_key(&self) -> Result<ServiceKey> {
        self.session
            .service_key
            .clone()
            .ok_or_else(|| AuthError::ServiceKeyUnavailable("no service key on session".into()))
    }

    /// Fetch the MFA challenge and decide the required code length.
    ///
    /// The flow needs at least one trusted phone number and an announced code
    /// length; when either is missing the only remaining path would be SMS
    /// delivery, which is not supported.
    pub(crate) async fn query_required_code_length(&mut self) -> Result<usize> {
        let key = self.service_key()?;
        let url = format!("{}/auth", key.auth_service_url);
        let exchange = self
            .http
            .get(&url, &session_headers(self.session, &key))
            .await?;
        absorb_session_headers(self.session, &exchange);
        if exchange.status != 200 {
            interpret_response(&exchange, ResponseContext::Mfa)?;
            return Err(AuthError::UnexpectedStatus(exchange.status));
        }
        let challenge: MfaChallenge = exchange
            .json()
            .map_err(|err| AuthError::MalformedMfaResponse(err.to_string()))?;
        let code_length = challenge.security_code.and_then(|code| code.length);
        match (challenge.trusted_phone_numbers.is_empty(), code_length) {
            (false, Some(length)) => {
                log::debug!("mfa challenge expects a {length} digit code");
                Ok(length)
            }
            _ => Err(AuthError::RequiresUnsupportedPhoneFallback),
        }
    }

    /// Submit the trusted-device verification code.
    pub(crate) async fn submit_code(&mut self, pin: &str) -> Result<()> {
        let key = self.service_key()?;
        let url = format!(
            "{}/auth/verify/trusteddevice/securitycode",
            key.auth_service_url
        );
        let body = SubmitSecurityCodeRequest {
            security_code: SecurityCode {
                code: pin.to_string(),
            },
        };
        let exchange = self
            .http
            .post_json(&url, &session_headers(self.session, &key), &body)
            .await?;
        absorb_session_headers(self.session, &exchange);
        interpret_response(&exchange, ResponseContext::Mfa)
    }
}

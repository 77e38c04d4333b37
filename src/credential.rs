//! Credential exchange: service-key discovery, hashcash gating, and the
//! password and SRP sign-in flows.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::error::{AuthError, Result};
use crate::hashcash::{self, HashcashChallenge};
use crate::models::{PasswordSignInRequest, SrpCompleteRequest, SrpInitRequest, SrpInitResponse};
use crate::session::{ServiceKey, Session};
use crate::srp::{self, SrpHandshake, SrpProtocol};
use crate::transport::{Exchange, HttpExchange};

pub(crate) const HEADER_WIDGET_KEY: &str = "X-Apple-Widget-Key";
pub(crate) const HEADER_SESSION_ID: &str = "X-Apple-ID-Session-Id";
pub(crate) const HEADER_SCNT: &str = "scnt";
const HEADER_HASHCASH: &str = "X-Apple-HC";
const HEADER_HASHCASH_BITS: &str = "X-Apple-HC-Bits";
const HEADER_HASHCASH_CHALLENGE: &str = "X-Apple-HC-Challenge";
const HEADER_REPAIR_TOKEN: &str = "X-Apple-Repair-Session-Token";

/// Hostname registered with the discovery endpoint.
const DISCOVERY_HOSTNAME: &str = "itunesconnect.apple.com";

/// Which credential flow to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Legacy plain username/password submission.
    UsernamePassword,
    /// SRP-6a password-authenticated key exchange.
    Srp,
}

/// Whether a response belongs to the credential flow or the MFA flow.
///
/// Status 400 only means "invalid verification code" for the latter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseContext {
    Credentials,
    Mfa,
}

/// Map the terminal response of a flow onto a protocol outcome.
pub(crate) fn interpret_response(exchange: &Exchange, context: ResponseContext) -> Result<()> {
    match exchange.status {
        200 | 204 => Ok(()),
        400 if context == ResponseContext::Mfa => Err(AuthError::InvalidVerificationCode),
        401 | 403 => Err(AuthError::InvalidCredentials),
        409 => Err(AuthError::RequiresSecondFactor),
        412 => {
            let location = exchange.header("Location");
            if location.is_none() {
                log::debug!("repair response carried no location header");
            }
            Err(AuthError::AccountNeedsRepair {
                location: location.unwrap_or_default().to_string(),
                token: exchange.header(HEADER_REPAIR_TOKEN).map(str::to_string),
            })
        }
        other => Err(AuthError::UnexpectedStatus(other)),
    }
}

/// Headers every identity-service request carries: the widget key plus the
/// session continuation headers once the session holds them.
pub(crate) fn session_headers(session: &Session, key: &ServiceKey) -> Vec<(&'static str, String)> {
    let mut headers = vec![(HEADER_WIDGET_KEY, key.auth_service_key.clone())];
    if let Some(session_id) = &session.session_id {
        headers.push((HEADER_SESSION_ID, session_id.clone()));
    }
    if let Some(scnt) = &session.scnt {
        headers.push((HEADER_SCNT, scnt.clone()));
    }
    headers
}

/// Fold the session continuation headers of a response into the session.
pub(crate) fn absorb_session_headers(session: &mut Session, exchange: &Exchange) {
    if let Some(session_id) = exchange.header(HEADER_SESSION_ID) {
        session.session_id = Some(session_id.to_string());
    }
    if let Some(scnt) = exchange.header(HEADER_SCNT) {
        session.scnt = Some(scnt.to_string());
    }
}

/// Runs the credential half of the protocol against one mutable [`Session`].
pub(crate) struct CredentialAuthenticator<'a> {
    http: &'a HttpExchange,
    session: &'a mut Session,
    lookup_url: &'a str,
    timestamp_source: fn() -> String,
    cancel: &'a Arc<AtomicBool>,
}

impl<'a> CredentialAuthenticator<'a> {
    pub(crate) fn new(
        http: &'a HttpExchange,
        session: &'a mut Session,
        lookup_url: &'a str,
        timestamp_source: fn() -> String,
        cancel: &'a Arc<AtomicBool>,
    ) -> Self {
        Self {
            http,
            session,
            lookup_url,
            timestamp_source,
            cancel,
        }
    }

    /// Fetch the service key via the discovery endpoint, unless the session
    /// already holds one.
    pub(crate) async fn ensure_service_key(&mut self) -> Result<ServiceKey> {
        if let Some(key) = &self.session.service_key {
            return Ok(key.clone());
        }
        let url = format!(
            "{}/olympus/v1/app/config?hostname={DISCOVERY_HOSTNAME}",
            self.lookup_url
        );
        let exchange = self
            .http
            .get(&url, &[])
            .await
            .map_err(|err| AuthError::ServiceKeyUnavailable(err.to_string()))?;
        if exchange.status != 200 {
            return Err(AuthError::ServiceKeyUnavailable(format!(
                "discovery returned status {}",
                exchange.status
            )));
        }
        let key: ServiceKey = exchange
            .json()
            .map_err(|err| AuthError::ServiceKeyUnavailable(err.to_string()))?;
        log::debug!("service key retrieved for {}", key.auth_service_url);
        self.session.service_key = Some(key.clone());
        Ok(key)
    }

    /// Solve the hashcash challenge, or reuse the token already on the
    /// session. The solve itself runs on a blocking worker.
    pub(crate) async fn ensure_hashcash(&mut self, key: &ServiceKey) -> Result<String> {
        if let Some(token) = &self.session.hashcash {
            return Ok(token.clone());
        }
        let url = format!(
            "{}/auth/signin?widgetKey={}",
            key.auth_service_url, key.auth_service_key
        );
        let exchange = self.http.get(&url, &session_headers(self.session, key)).await?;
        absorb_session_headers(self.session, &exchange);
        let challenge = parse_hashcash_challenge(&exchange)?;
        log::debug!("solving hashcash challenge ({} bits)", challenge.bits);
        let timestamp = (self.timestamp_source)();
        let token = hashcash::solve_blocking(
            challenge.bits,
            challenge.challenge,
            timestamp,
            Arc::clone(self.cancel),
        )
        .await?;
        self.session.hashcash = Some(token.clone());
        Ok(token)
    }

    /// Submit credentials via the selected flow and interpret the terminal
    /// response, folding session headers into the session either way.
    pub(crate) async fn submit(
        &mut self,
        method: AuthMethod,
        key: &ServiceKey,
        hashcash: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let exchange = match method {
            AuthMethod::UsernamePassword => {
                self.submit_password(key, hashcash, username, password).await?
            }
            AuthMethod::Srp => self.submit_srp(key, hashcash, username, password).await?,
        };
        absorb_session_headers(self.session, &exchange);
        interpret_response(&exchange, ResponseContext::Credentials)
    }

    async fn submit_password(
        &mut self,
        key: &ServiceKey,
        hashcash: &str,
        username: &str,
        password: &str,
    ) -> Result<Exchange> {
        let url = format!("{}/auth/signin", key.auth_service_url);
        let mut headers = session_headers(self.session, key);
        headers.push((HEADER_HASHCASH, hashcash.to_string()));
        let body = PasswordSignInRequest {
            account_name: username,
            password,
            remember_me: false,
        };
        self.http.post_json(&url, &headers, &body).await
    }

    async fn submit_srp(
        &mut self,
        key: &ServiceKey,
        hashcash: &str,
        username: &str,
        password: &str,
    ) -> Result<Exchange> {
        let handshake = SrpHandshake::new()?;

        let init_url = format!("{}/auth/signin/init", key.auth_service_url);
        let init_body = SrpInitRequest {
            a: handshake.public_b64(),
            account_name: username,
            protocols: SrpProtocol::ADVERTISED.to_vec(),
        };
        let init = self
            .http
            .post_json(&init_url, &session_headers(self.session, key), &init_body)
            .await?;
        absorb_session_headers(self.session, &init);
        if init.status != 200 {
            interpret_response(&init, ResponseContext::Credentials)?;
            return Err(AuthError::UnexpectedStatus(init.status));
        }

        let reply: SrpInitResponse = init.json()?;
        let protocol = SrpProtocol::parse(&reply.protocol)?;
        let salt = BASE64.decode(&reply.salt)?;
        let server_public = reply
            .b
            .as_deref()
            .map(|b| BASE64.decode(b))
            .transpose()?
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                AuthError::TransportOrParsing("server public key missing from srp response".into())
            })?;
        let password_key =
            srp::derive_password_key(protocol, password, &salt, reply.iteration)?;
        let proofs =
            handshake.compute_proofs(username, &password_key[..], &salt, &server_public)?;

        let complete_url = format!(
            "{}/auth/signin/complete?isRememberMeEnabled=false",
            key.auth_service_url
        );
        let mut headers = session_headers(self.session, key);
        headers.push((HEADER_HASHCASH, hashcash.to_string()));
        let body = SrpCompleteRequest {
            account_name: username,
            c: &reply.c,
            m1: proofs.m1,
            m2: proofs.m2,
            remember_me: false,
        };
        self.http.post_json(&complete_url, &headers, &body).await
    }
}

fn parse_hashcash_challenge(exchange: &Exchange) -> Result<HashcashChallenge> {
    let bits = exchange
        .header(HEADER_HASHCASH_BITS)
        .ok_or(AuthError::MalformedChallengeHeaders)?
        .parse::<u32>()
        .map_err(|_| AuthError::MalformedChallengeHeaders)?;
    let challenge = exchange
        .header(HEADER_HASHCASH_CHALLENGE)
        .ok_or(AuthError::MalformedChallengeHeaders)?
        .to_string();
    Ok(HashcashChallenge { bits, challenge })
}

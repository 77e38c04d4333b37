//! HTTP exchange layer: one `reqwest` client plus the protocol cookie jar.
//!
//! The transport accepts any response status below 506 and hands it to the
//! caller untouched; interpreting the status into a protocol outcome happens
//! in the credential and MFA layers. `Set-Cookie` headers of every response
//! are folded into the jar with replace-on-name-collision semantics.

use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::header::{self, HeaderMap};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{AuthError, Result};
use crate::session::{Cookie, CookieJar};

/// Upper bound (exclusive) of the transport-level status acceptance window.
const STATUS_ACCEPT_LIMIT: u16 = 506;

/// A completed HTTP exchange.
pub struct Exchange {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: String,
}

impl Exchange {
    /// First value of a response header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP capability injected into the protocol components.
pub struct HttpExchange {
    client: reqwest::Client,
    cookies: Mutex<CookieJar>,
}

impl HttpExchange {
    /// Create an exchange with a fresh client and an empty cookie jar.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            cookies: Mutex::new(CookieJar::new()),
        })
    }

    /// GET `url` with extra request headers.
    pub async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<Exchange> {
        self.send(self.client.get(url), headers).await
    }

    /// POST `url` with a JSON body.
    pub async fn post_json<B: Serialize>(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &B,
    ) -> Result<Exchange> {
        self.send(self.client.post(url).json(body), headers).await
    }

    /// POST `url` with no body.
    pub async fn post_empty(&self, url: &str, headers: &[(&str, String)]) -> Result<Exchange> {
        self.send(self.client.post(url), headers).await
    }

    async fn send(
        &self,
        mut request: reqwest::RequestBuilder,
        headers: &[(&str, String)],
    ) -> Result<Exchange> {
        request = request
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        let cookie_header = self.lock_cookies().header_value();
        if !cookie_header.is_empty() {
            request = request.header(header::COOKIE, cookie_header);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        self.record_cookies(response.headers());
        let headers = response.headers().clone();
        let body = response.text().await?;
        log::debug!("exchange finished with status {status}");
        if status >= STATUS_ACCEPT_LIMIT {
            return Err(AuthError::UnexpectedStatus(status));
        }
        Ok(Exchange {
            status,
            headers,
            body,
        })
    }

    fn record_cookies(&self, headers: &HeaderMap) {
        let mut jar = self.lock_cookies();
        for value in headers.get_all(header::SET_COOKIE) {
            if let Ok(raw) = value.to_str() {
                if let Some(cookie) = Cookie::parse(raw) {
                    jar.insert(cookie);
                }
            }
        }
    }

    fn lock_cookies(&self) -> MutexGuard<'_, CookieJar> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current cookie jar.
    pub fn cookies(&self) -> CookieJar {
        self.lock_cookies().clone()
    }

    /// Replace the jar, e.g. with cookies reloaded from the secrets store.
    pub fn set_cookies(&self, jar: CookieJar) {
        *self.lock_cookies() = jar;
    }

    /// Drop all cookies.
    pub fn clear_cookies(&self) {
        self.lock_cookies().clear();
    }
}

//! Session state and the cookie model shared across authentication steps.

use serde::{Deserialize, Serialize};

/// Service discovery result, required before any authentication call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceKey {
    /// Base URL of the identity service.
    pub auth_service_url: String,
    /// Widget key sent with every identity-service request.
    pub auth_service_key: String,
}

/// Mutable state accumulated by one authentication attempt.
///
/// Fields are populated monotonically as network steps succeed and are only
/// reset by an explicit sign-out. At most one attempt may drive a session at
/// a time; concurrent use is not supported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Discovery result, fetched once per session.
    pub service_key: Option<ServiceKey>,
    /// `X-Apple-ID-Session-Id` value echoed on follow-up requests.
    pub session_id: Option<String>,
    /// `scnt` continuation token echoed on follow-up requests.
    pub scnt: Option<String>,
    /// Solved hashcash token, computed at most once per session.
    pub hashcash: Option<String>,
}

impl Session {
    /// True when no step has populated the session yet.
    pub fn is_empty(&self) -> bool {
        self.service_key.is_none()
            && self.session_id.is_none()
            && self.scnt.is_none()
            && self.hashcash.is_none()
    }
}

/// A single named cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name, unique within a [`CookieJar`].
    pub name: String,
    /// Cookie value.
    pub value: String,
}

impl Cookie {
    /// Parse the name/value pair from a `Set-Cookie` header value.
    ///
    /// Attributes after the first `;` (path, expiry, ...) are dropped; the
    /// engine only ever replays name/value pairs.
    pub fn parse(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// Name-keyed cookie set.
///
/// Merging replaces cookies whose name already exists and appends the rest;
/// no two cookies share a name afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    /// An empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cookie, replacing any existing cookie with the same name.
    pub fn insert(&mut self, cookie: Cookie) {
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            *existing = cookie;
        } else {
            self.cookies.push(cookie);
        }
    }

    /// Merge another jar into this one; new values win on name collisions.
    pub fn merge(&mut self, other: CookieJar) {
        for cookie in other.cookies {
            self.insert(cookie);
        }
    }

    /// Look up a cookie by name.
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Number of cookies in the jar.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// True when the jar holds no cookies.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Iterate over the cookies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// Value for a `Cookie` request header; empty when the jar is empty.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Drop all cookies.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, value: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_cookie_parse() {
        let parsed = Cookie::parse("myacinfo=DAWXuq; Path=/; Secure; HttpOnly").unwrap();
        assert_eq!(parsed, cookie("myacinfo", "DAWXuq"));
    }

    #[test]
    fn test_cookie_parse_rejects_garbage() {
        assert!(Cookie::parse("no-equals-sign").is_none());
        assert!(Cookie::parse("=value").is_none());
    }

    #[test]
    fn test_merge_new_value_wins() {
        let mut jar = CookieJar::new();
        jar.insert(cookie("dslang", "GB-EN"));
        jar.insert(cookie("site", "GBR"));
        jar.insert(cookie("myacinfo", "X"));
        jar.insert(cookie("aasp", "Y"));

        let mut incoming = CookieJar::new();
        incoming.insert(cookie("dslang", "FR-FR"));
        jar.merge(incoming);

        assert_eq!(jar.len(), 4);
        assert_eq!(jar.get("dslang").unwrap().value, "FR-FR");
        assert_eq!(jar.get("site").unwrap().value, "GBR");
    }

    #[test]
    fn test_header_value() {
        let mut jar = CookieJar::new();
        jar.insert(cookie("a", "1"));
        jar.insert(cookie("b", "2"));
        assert_eq!(jar.header_value(), "a=1; b=2");
        jar.clear();
        assert_eq!(jar.header_value(), "");
    }

    #[test]
    fn test_session_round_trip() {
        let session = Session {
            service_key: Some(ServiceKey {
                auth_service_url: "https://idmsa.example.com/appleauth".into(),
                auth_service_key: "widget-key".into(),
            }),
            session_id: Some("x-apple-id".into()),
            scnt: Some("scnt-token".into()),
            hashcash: Some("1:11:20230223170600:4d74fb15::6373".into()),
        };
        let encoded = serde_json::to_string(&session).unwrap();
        let decoded: Session = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, session);
    }

    #[test]
    fn test_empty_session() {
        assert!(Session::default().is_empty());
        let session = Session {
            scnt: Some("s".into()),
            ..Session::default()
        };
        assert!(!session.is_empty());
    }
}

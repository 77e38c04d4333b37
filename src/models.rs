//! Wire types for the identity-service endpoints.

use serde::{Deserialize, Serialize};

/// Body of the plain username/password sign-in request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSignInRequest<'a> {
    pub account_name: &'a str,
    pub password: &'a str,
    pub remember_me: bool,
}

/// Body of the SRP init request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SrpInitRequest<'a> {
    pub a: String,
    pub account_name: &'a str,
    pub protocols: Vec<&'static str>,
}

/// Server reply to the SRP init request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SrpInitResponse {
    pub iteration: u32,
    /// Base64-encoded salt.
    pub salt: String,
    /// Key-derivation protocol the server selected (`s2k` or `s2k_fo`).
    pub protocol: String,
    /// Base64-encoded server public key; its absence is a protocol error.
    pub b: Option<String>,
    /// Opaque continuation token echoed in the completion request.
    pub c: String,
}

/// Body of the SRP completion request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SrpCompleteRequest<'a> {
    pub account_name: &'a str,
    pub c: &'a str,
    pub m1: String,
    pub m2: String,
    pub remember_me: bool,
}

/// Loosely-typed MFA challenge document.
///
/// The server sends a large document; only the fields the engine needs are
/// modeled and all of them are optional, so unknown shapes degrade into the
/// "no trusted phone" outcome instead of a parse failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MfaChallenge {
    pub trusted_phone_numbers: Vec<TrustedPhoneNumber>,
    pub security_code: Option<SecurityCodeInfo>,
}

/// One trusted phone entry of the MFA challenge.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrustedPhoneNumber {
    pub id: Option<u64>,
    pub number_with_dial_code: Option<String>,
    pub push_mode: Option<String>,
}

/// Security-code metadata of the MFA challenge.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SecurityCodeInfo {
    pub length: Option<usize>,
}

/// Body of the MFA code submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSecurityCodeRequest {
    pub security_code: SecurityCode,
}

/// The submitted code itself.
#[derive(Debug, Serialize)]
pub struct SecurityCode {
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mfa_challenge_tolerates_unknown_fields() {
        let raw = r#"{
            "trustedPhoneNumbers": [
                {"id": 1, "numberWithDialCode": "+44 •••• ••0572", "obfuscatedNumber": "•••• ••0572"}
            ],
            "securityCode": {"length": 6, "tooManyCodesSent": false},
            "serviceErrors": []
        }"#;
        let challenge: MfaChallenge = serde_json::from_str(raw).unwrap();
        assert_eq!(challenge.trusted_phone_numbers.len(), 1);
        assert_eq!(challenge.security_code.unwrap().length, Some(6));
    }

    #[test]
    fn test_mfa_challenge_defaults() {
        let challenge: MfaChallenge = serde_json::from_str("{}").unwrap();
        assert!(challenge.trusted_phone_numbers.is_empty());
        assert!(challenge.security_code.is_none());
    }

    #[test]
    fn test_submit_body_shape() {
        let body = SubmitSecurityCodeRequest {
            security_code: SecurityCode { code: "123456".into() },
        };
        let raw = serde_json::to_string(&body).unwrap();
        assert_eq!(raw, r#"{"securityCode":{"code":"123456"}}"#);
    }
}

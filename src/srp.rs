//! SRP-6a credential exchange cryptography.
//!
//! Implements the client side of the identity service's SRP variant: group
//! N2048, SHA-256, and a two-stage password key (SHA-256 of the raw password,
//! then PBKDF2-HMAC-SHA256 over that digest). The stage order is load-bearing
//! for interoperability and must not be swapped.
//!
//! Usage within one exchange:
//! 1. [`SrpHandshake::new`] generates the ephemeral client keypair.
//! 2. Send [`SrpHandshake::public_b64`] as `a` in the init request.
//! 3. Derive the password key with [`derive_password_key`] using the salt,
//!    iteration count and protocol the server selected.
//! 4. [`SrpHandshake::compute_proofs`] yields `m1`/`m2` for the completion
//!    request.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use srp::client::SrpClient;
use srp::groups::G_2048;
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

/// Password-key derivation variants negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrpProtocol {
    /// PBKDF2 over the raw SHA-256 digest of the password.
    S2k,
    /// PBKDF2 over the lowercase-hex encoding of the digest.
    S2kFo,
}

impl SrpProtocol {
    /// Protocol identifiers advertised in the init request, in preference order.
    pub const ADVERTISED: [&'static str; 2] = ["s2k", "s2k_fo"];

    /// Parse the protocol the server selected.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "s2k" => Ok(SrpProtocol::S2k),
            "s2k_fo" => Ok(SrpProtocol::S2kFo),
            other => Err(AuthError::TransportOrParsing(format!(
                "unknown srp protocol {other:?}"
            ))),
        }
    }
}

/// Derive the 32-byte SRP password key.
///
/// The password is hashed with SHA-256 first; PBKDF2 then runs over that
/// digest (`s2k`) or over its lowercase-hex encoding (`s2k_fo`), never over
/// the raw password.
pub fn derive_password_key(
    protocol: SrpProtocol,
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; 32]>> {
    if iterations == 0 {
        return Err(AuthError::TransportOrParsing(
            "srp iteration count must be positive".into(),
        ));
    }
    let digest = Sha256::digest(password.as_bytes());
    let input: Zeroizing<Vec<u8>> = match protocol {
        SrpProtocol::S2k => Zeroizing::new(digest.to_vec()),
        SrpProtocol::S2kFo => Zeroizing::new(hex::encode(digest).into_bytes()),
    };
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(&input, salt, iterations, &mut key[..]);
    Ok(key)
}

/// Base64-encoded client and server proofs for the completion request.
#[derive(Debug, Clone)]
pub struct SrpProofs {
    /// Client proof `M1`.
    pub m1: String,
    /// Server proof `M2 = H(A | M1 | K)`, computed client-side.
    pub m2: String,
}

/// Ephemeral client keypair for one SRP exchange.
pub struct SrpHandshake {
    a_private: Zeroizing<[u8; 64]>,
    a_public: Vec<u8>,
}

impl SrpHandshake {
    /// Generate a fresh ephemeral keypair.
    pub fn new() -> Result<Self> {
        let mut a_private = Zeroizing::new([0u8; 64]);
        getrandom::getrandom(&mut a_private[..]).map_err(|err| {
            AuthError::TransportOrParsing(format!("failed to draw srp ephemeral: {err}"))
        })?;
        let client = SrpClient::<Sha256>::new(&G_2048);
        let a_public = client.compute_public_ephemeral(&a_private[..]);
        Ok(Self { a_private, a_public })
    }

    /// Client public value `A`, base64 encoded for the init request body.
    pub fn public_b64(&self) -> String {
        BASE64.encode(&self.a_public)
    }

    /// Complete the exchange against the server's reply.
    ///
    /// Runs the shared-secret computation and returns the proofs for the
    /// completion request. The server proof is computed and sent, but the
    /// client does not demand the server echo it back; that matches the
    /// deployed protocol.
    pub fn compute_proofs(
        self,
        account_name: &str,
        password_key: &[u8],
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<SrpProofs> {
        if server_public.is_empty() {
            return Err(AuthError::TransportOrParsing(
                "server public key missing from srp response".into(),
            ));
        }
        let client = SrpClient::<Sha256>::new(&G_2048);
        let verifier = client
            .process_reply(
                &self.a_private[..],
                account_name.as_bytes(),
                password_key,
                salt,
                server_public,
            )
            .map_err(|err| AuthError::TransportOrParsing(format!("srp exchange failed: {err:?}")))?;
        let m1 = verifier.proof().to_vec();
        let m2 = {
            let mut digest = Sha256::new();
            digest.update(&self.a_public);
            digest.update(&m1);
            digest.update(verifier.key());
            digest.finalize().to_vec()
        };
        Ok(SrpProofs {
            m1: BASE64.encode(&m1),
            m2: BASE64.encode(&m2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(SrpProtocol::parse("s2k").unwrap(), SrpProtocol::S2k);
        assert_eq!(SrpProtocol::parse("s2k_fo").unwrap(), SrpProtocol::S2kFo);
        assert!(SrpProtocol::parse("s2k_v2").is_err());
    }

    #[test]
    fn test_derive_password_key_deterministic() {
        let salt = [7u8; 16];
        let a = derive_password_key(SrpProtocol::S2k, "hunter2", &salt, 1024).unwrap();
        let b = derive_password_key(SrpProtocol::S2k, "hunter2", &salt, 1024).unwrap();
        assert_eq!(&a[..], &b[..]);
    }

    #[test]
    fn test_derive_password_key_variants_differ() {
        // s2k feeds PBKDF2 the raw digest, s2k_fo its hex encoding, so the
        // two protocols must produce different keys.
        let salt = [7u8; 16];
        let s2k = derive_password_key(SrpProtocol::S2k, "hunter2", &salt, 1024).unwrap();
        let s2k_fo = derive_password_key(SrpProtocol::S2kFo, "hunter2", &salt, 1024).unwrap();
        assert_ne!(&s2k[..], &s2k_fo[..]);
    }

    #[test]
    fn test_derive_password_key_rejects_zero_iterations() {
        let result = derive_password_key(SrpProtocol::S2k, "hunter2", &[7u8; 16], 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_handshake_public_value() {
        let handshake = SrpHandshake::new().unwrap();
        let a = BASE64.decode(handshake.public_b64()).unwrap();
        assert!(!a.is_empty());
        // A 2048-bit group produces values near 256 bytes.
        assert!(a.len() > 200);
    }

    #[test]
    fn test_compute_proofs_shape() {
        let handshake = SrpHandshake::new().unwrap();
        let salt = [3u8; 16];
        let key = derive_password_key(SrpProtocol::S2k, "hunter2", &salt, 128).unwrap();
        let server_public = [7u8; 256];
        let proofs = handshake
            .compute_proofs("user@example.com", &key[..], &salt, &server_public)
            .unwrap();
        // SHA-256 proofs are 32 bytes before encoding.
        assert_eq!(BASE64.decode(&proofs.m1).unwrap().len(), 32);
        assert_eq!(BASE64.decode(&proofs.m2).unwrap().len(), 32);
    }

    #[test]
    fn test_compute_proofs_rejects_missing_server_key() {
        let handshake = SrpHandshake::new().unwrap();
        let salt = [3u8; 16];
        let key = derive_password_key(SrpProtocol::S2k, "hunter2", &salt, 128).unwrap();
        let result = handshake.compute_proofs("user@example.com", &key[..], &salt, &[]);
        assert!(matches!(result, Err(AuthError::TransportOrParsing(_))));
    }
}

//! Hashcash proof-of-work solver.
//!
//! The sign-in service rate-limits credential submissions with a hashcash
//! challenge: the client must present a token whose SHA-1 digest starts with
//! a server-chosen number of zero bits. The token format deviates from the
//! public hashcash format: the ext/rand field is always empty, the resource
//! field carries the server challenge, and the counter is decimal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sha1::{Digest, Sha1};

use crate::error::{AuthError, Result};

/// Hashcash token format version.
const VERSION: &str = "1";

/// How many counter values are tried between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// A proof-of-work challenge read from the sign-in probe response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashcashChallenge {
    /// Required number of leading zero bits in the token digest.
    pub bits: u32,
    /// Server-chosen challenge string folded into the token.
    pub challenge: String,
}

/// Solve a hashcash challenge.
///
/// Candidate tokens follow the template
/// `1:{bits}:{timestamp}:{challenge}::{counter}` with a decimal counter
/// starting at 0. The first counter whose SHA-1 digest has at least `bits`
/// leading zero bits wins, and the full candidate string is returned.
///
/// The search is deterministic for fixed inputs (the timestamp is
/// caller-supplied, format `yyyyMMddHHmmss`) and unbounded: expected work is
/// `2^bits` iterations of a tight CPU loop. From async code, use
/// [`solve_blocking`] so the search cannot starve the runtime.
pub fn solve(bits: u32, challenge: &str, timestamp: &str) -> String {
    match solve_cancellable(bits, challenge, timestamp, &AtomicBool::new(false)) {
        Ok(token) => token,
        Err(_) => unreachable!("search with an unset flag never cancels"),
    }
}

/// [`solve`], aborting with [`AuthError::Cancelled`] once `cancel` is set.
///
/// The flag is polled every few thousand iterations, so cancellation is
/// prompt but not instantaneous.
pub fn solve_cancellable(
    bits: u32,
    challenge: &str,
    timestamp: &str,
    cancel: &AtomicBool,
) -> Result<String> {
    let prefix = format!("{VERSION}:{bits}:{timestamp}:{challenge}::");
    let mut counter: u64 = 0;
    loop {
        let candidate = format!("{prefix}{counter}");
        let digest = Sha1::digest(candidate.as_bytes());
        if leading_zero_bits(digest.as_slice()) >= bits {
            return Ok(candidate);
        }
        counter += 1;
        if counter % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(AuthError::Cancelled);
        }
    }
}

/// Run the search on a dedicated blocking thread.
pub async fn solve_blocking(
    bits: u32,
    challenge: String,
    timestamp: String,
    cancel: Arc<AtomicBool>,
) -> Result<String> {
    tokio::task::spawn_blocking(move || solve_cancellable(bits, &challenge, &timestamp, &cancel))
        .await
        .map_err(|err| AuthError::TransportOrParsing(format!("hashcash worker failed: {err}")))?
}

/// Count leading zero bits of a digest, most-significant bit first and
/// crossing byte boundaries.
fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in digest {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_token() {
        let token = solve(11, "4d74fb15eb23f465f1f6fcbf534e5877", "20230223170600");
        assert_eq!(token, "1:11:20230223170600:4d74fb15eb23f465f1f6fcbf534e5877::6373");
    }

    #[test]
    fn test_tokens_satisfy_bit_constraint() {
        for (bits, challenge) in [(1, "a"), (4, "ff2c"), (8, "4d74fb15")] {
            let token = solve(bits, challenge, "20230223170600");
            let digest = Sha1::digest(token.as_bytes());
            assert!(
                leading_zero_bits(digest.as_slice()) >= bits,
                "token {token} has too few leading zero bits"
            );
        }
    }

    #[test]
    fn test_token_template() {
        let token = solve(1, "abc", "20240101000000");
        let fields: Vec<&str> = token.split(':').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], "1");
        assert_eq!(fields[1], "1");
        assert_eq!(fields[2], "20240101000000");
        assert_eq!(fields[3], "abc");
        // Ext field stays empty.
        assert_eq!(fields[4], "");
        assert!(fields[5].parse::<u64>().is_ok());
    }

    #[test]
    fn test_deterministic() {
        let a = solve(8, "4d74fb15", "20230223170600");
        let b = solve(8, "4d74fb15", "20230223170600");
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancellation() {
        let cancel = AtomicBool::new(true);
        // 64 bits is unsolvable in practice, so only cancellation can end this.
        let result = solve_cancellable(64, "4d74fb15", "20230223170600", &cancel);
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits(&[0x80]), 0);
        assert_eq!(leading_zero_bits(&[0x01]), 7);
        assert_eq!(leading_zero_bits(&[0x00, 0x20]), 10);
        assert_eq!(leading_zero_bits(&[0x00, 0x00]), 16);
    }

    #[tokio::test]
    async fn test_solve_blocking() {
        let cancel = Arc::new(AtomicBool::new(false));
        let token = solve_blocking(1, "abc".into(), "20240101000000".into(), cancel)
            .await
            .unwrap();
        assert!(token.starts_with("1:1:20240101000000:abc::"));
    }
}

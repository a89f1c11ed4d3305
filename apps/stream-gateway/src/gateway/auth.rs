//! Bearer token verification.
//!
//! Token issuance and the account/session model behind a token are
//! deliberately out of scope here; a verifier only needs to answer "is this
//! token currently valid, and for which account". [`HmacBearerVerifier`] is
//! one concrete answer (a shared-secret HMAC with an embedded expiry) chosen
//! to need no external service for local/offline operation; a production
//! deployment can swap in a verifier backed by the broker's own session
//! store without the gateway above this trait noticing.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Result of verifying a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVerdict {
    /// Token is well-formed, unexpired, and its signature checks out.
    Valid {
        /// The account the token authenticates.
        account_id: i64,
    },
    /// Token parsed but its expiry has passed.
    Expired,
    /// Token is malformed or its signature does not match.
    Invalid,
}

/// Verifies a bearer token presented in an `auth` client frame.
pub trait BearerVerifier: Send + Sync {
    /// Verify `token`, returning the account it authenticates or why it was
    /// rejected.
    fn verify(&self, token: &str) -> TokenVerdict;
}

/// `account_id.expiry_unix.signature`, signature = `HMAC-SHA256(secret,
/// "account_id.expiry_unix")`, base64url-encoded without padding.
pub struct HmacBearerVerifier {
    secret: Vec<u8>,
}

impl HmacBearerVerifier {
    /// Create a verifier keyed by `secret`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a token for `account_id` expiring at `expiry_unix` (seconds
    /// since epoch). Exposed for tests and offline token minting; the
    /// gateway itself never issues tokens.
    #[must_use]
    pub fn issue(&self, account_id: i64, expiry_unix: i64) -> String {
        let payload = format!("{account_id}.{expiry_unix}");
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts a key of any length");
        mac.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

impl BearerVerifier for HmacBearerVerifier {
    fn verify(&self, token: &str) -> TokenVerdict {
        let mut parts = token.splitn(3, '.');
        let (Some(account_raw), Some(expiry_raw), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return TokenVerdict::Invalid;
        };

        let Ok(account_id) = account_raw.parse::<i64>() else {
            return TokenVerdict::Invalid;
        };
        let Ok(expiry_unix) = expiry_raw.parse::<i64>() else {
            return TokenVerdict::Invalid;
        };

        let payload = format!("{account_raw}.{expiry_raw}");
        let expected = self.sign(&payload);
        if expected.as_bytes() != signature.as_bytes() {
            return TokenVerdict::Invalid;
        }

        if chrono::Utc::now().timestamp() > expiry_unix {
            return TokenVerdict::Expired;
        }

        TokenVerdict::Valid { account_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let verifier = HmacBearerVerifier::new(b"test-secret".to_vec());
        let token = verifier.issue(42, chrono::Utc::now().timestamp() + 3600);
        assert_eq!(verifier.verify(&token), TokenVerdict::Valid { account_id: 42 });
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = HmacBearerVerifier::new(b"test-secret".to_vec());
        let token = verifier.issue(42, chrono::Utc::now().timestamp() - 1);
        assert_eq!(verifier.verify(&token), TokenVerdict::Expired);
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let verifier = HmacBearerVerifier::new(b"test-secret".to_vec());
        let mut token = verifier.issue(42, chrono::Utc::now().timestamp() + 3600);
        token.push('x');
        assert_eq!(verifier.verify(&token), TokenVerdict::Invalid);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let issuer = HmacBearerVerifier::new(b"secret-a".to_vec());
        let verifier = HmacBearerVerifier::new(b"secret-b".to_vec());
        let token = issuer.issue(42, chrono::Utc::now().timestamp() + 3600);
        assert_eq!(verifier.verify(&token), TokenVerdict::Invalid);
    }

    #[test]
    fn malformed_token_is_invalid() {
        let verifier = HmacBearerVerifier::new(b"test-secret".to_vec());
        assert_eq!(verifier.verify("not-a-token"), TokenVerdict::Invalid);
    }
}

//! HMAC signing and verification of webhook bodies

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};

use crate::error::{CreditError, CreditResult};

/// Header carrying the hex-encoded HMAC of the raw body
pub const SIGNATURE_HEADER: &str = "X-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Sha256,
    Sha512,
}

impl SignatureAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sha256" | "hmac-sha256" => Some(SignatureAlgorithm::Sha256),
            "sha512" | "hmac-sha512" => Some(SignatureAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Shared secret and algorithm for one provider integration
#[derive(Debug, Clone)]
pub struct WebhookIntegration {
    pub secret: String,
    pub algorithm: SignatureAlgorithm,
}

impl WebhookIntegration {
    pub fn sign(&self, body: &[u8]) -> String {
        sign(self.algorithm, &self.secret, body)
    }

    pub fn verify(&self, body: &[u8], signature: &str) -> CreditResult<()> {
        verify(self.algorithm, &self.secret, body, signature)
    }
}

/// Lowercase hex HMAC of `body`
pub fn sign(algorithm: SignatureAlgorithm, secret: &str, body: &[u8]) -> String {
    match algorithm {
        SignatureAlgorithm::Sha256 => hex_mac::<Hmac<Sha256>>(secret, body),
        SignatureAlgorithm::Sha512 => hex_mac::<Hmac<Sha512>>(secret, body),
    }
}

// HMAC takes keys of any length, so the error arm is unreachable
fn hex_mac<M: Mac + KeyInit>(secret: &str, body: &[u8]) -> String {
    match <M as Mac>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Constant-time comparison of `signature` against the HMAC of `body`
pub fn verify(
    algorithm: SignatureAlgorithm,
    secret: &str,
    body: &[u8],
    signature: &str,
) -> CreditResult<()> {
    let provided = hex::decode(signature.trim()).map_err(|_| CreditError::InvalidSignature)?;

    let outcome = match algorithm {
        SignatureAlgorithm::Sha256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
                .map_err(|_| CreditError::InvalidSignature)?;
            mac.update(body);
            mac.verify_slice(&provided)
        }
        SignatureAlgorithm::Sha512 => {
            let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(secret.as_bytes())
                .map_err(|_| CreditError::InvalidSignature)?;
            mac.update(body);
            mac.verify_slice(&provided)
        }
    };

    outcome.map_err(|_| CreditError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"event":"charge.success","data":{"reference":"COL-1"}}"#;

    #[test]
    fn test_sign_then_verify() {
        for algorithm in [SignatureAlgorithm::Sha256, SignatureAlgorithm::Sha512] {
            let signature = sign(algorithm, "secret", BODY);
            assert!(verify(algorithm, "secret", BODY, &signature).is_ok());
        }
    }

    #[test]
    fn test_signature_lengths() {
        assert_eq!(sign(SignatureAlgorithm::Sha256, "k", BODY).len(), 64);
        assert_eq!(sign(SignatureAlgorithm::Sha512, "k", BODY).len(), 128);
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signature = sign(
            SignatureAlgorithm::Sha256,
            "Jefe",
            b"what do ya want for nothing?",
        );
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign(SignatureAlgorithm::Sha512, "secret", BODY);
        let tampered = br#"{"event":"charge.success","data":{"reference":"COL-2"}}"#;
        assert!(matches!(
            verify(SignatureAlgorithm::Sha512, "secret", tampered, &signature),
            Err(CreditError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_secret_or_algorithm_rejected() {
        let signature = sign(SignatureAlgorithm::Sha512, "secret", BODY);
        assert!(verify(SignatureAlgorithm::Sha512, "other", BODY, &signature).is_err());
        assert!(verify(SignatureAlgorithm::Sha256, "secret", BODY, &signature).is_err());
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(verify(SignatureAlgorithm::Sha256, "secret", BODY, "not-hex").is_err());
        assert!(verify(SignatureAlgorithm::Sha256, "secret", BODY, "").is_err());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(SignatureAlgorithm::parse("SHA512"), Some(SignatureAlgorithm::Sha512));
        assert_eq!(SignatureAlgorithm::parse("hmac-sha256"), Some(SignatureAlgorithm::Sha256));
        assert_eq!(SignatureAlgorithm::parse("md5"), None);
    }
}

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted signing secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// HMAC-SHA256 key used to sign and verify token bodies.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::WeakSecret)?;
        Ok(Self { mac })
    }

    /// Sign `data`, returning the base64url (unpadded) signature
    pub fn sign(&self, data: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(data);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Verify a base64url signature over `data` in constant time
    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        let Ok(expected) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::new(SECRET).unwrap();
        let sig = key.sign(b"hello world");
        assert!(key.verify(b"hello world", &sig));
    }

    #[test]
    fn test_verify_with_wrong_secret() {
        let key = SigningKey::new(SECRET).unwrap();
        let other = SigningKey::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        let sig = key.sign(b"hello world");
        assert!(!other.verify(b"hello world", &sig));
    }

    #[test]
    fn test_verify_with_tampered_body() {
        let key = SigningKey::new(SECRET).unwrap();
        let sig = key.sign(b"original body");
        assert!(!key.verify(b"tampered body", &sig));
    }

    #[test]
    fn test_verify_rejects_non_base64_signature() {
        let key = SigningKey::new(SECRET).unwrap();
        assert!(!key.verify(b"data", "not*base64!"));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(SigningKey::new(b"short"), Err(TokenError::WeakSecret)));
    }

    #[test]
    fn test_debug_hides_key() {
        let key = SigningKey::new(SECRET).unwrap();
        assert_eq!(format!("{:?}", key), "SigningKey(<redacted>)");
    }
}

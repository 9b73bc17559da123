use crate::error::AuthError;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use chacha20poly1305::{
    Key, KeyInit, XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, OsRng},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const AEAD_NONCE_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    #[serde(rename = "http-basic")]
    HttpBasic,
}

/// Plaintext structure encrypted inside a login token. The server keeps no
/// session state; everything needed to validate the bearer is in here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub mode: AuthMode,
    pub username: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
}

/// Encrypts and decrypts token claims with XChaCha20-Poly1305 keyed by the
/// configured secret. Expiry is not checked here; callers compare
/// `expires_at` against the current time after decoding.
pub struct TokenCodec {
    cipher: XChaCha20Poly1305,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// A random `nonce` claim is injected before encryption so two tokens
    /// minted for the same user and expiry never share ciphertext.
    pub fn encode(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let mut claims = claims.clone();
        claims.nonce = Uuid::new_v4().to_string();
        let plaintext =
            serde_json::to_vec(&claims).map_err(|err| AuthError::TokenMint(err.to_string()))?;
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|err| AuthError::TokenMint(err.to_string()))?;

        let mut raw = Vec::with_capacity(AEAD_NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);
        Ok(B64.encode(raw))
    }

    pub fn decode(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let raw = B64
            .decode(token)
            .map_err(|err| AuthError::TokenDecode(err.to_string()))?;
        if raw.len() <= AEAD_NONCE_LEN {
            return Err(AuthError::TokenDecode("token too short".to_string()));
        }
        let (nonce, ciphertext) = raw.split_at(AEAD_NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| AuthError::TokenDecode("ciphertext rejected".to_string()))?;
        serde_json::from_slice(&plaintext).map_err(|err| AuthError::TokenDecode(err.to_string()))
    }
}

//! Code cipher — deterministic digest + reversible encryption.
//!
//! Every stored code carries two derived attributes:
//!
//! - **digest** — keyed HMAC-SHA256 of the plaintext, hex-encoded. Stable
//!   across calls, so equality and uniqueness checks run against the digest
//!   column without ever decrypting a row.
//! - **ciphertext** — AES-256-GCM under a fresh random nonce, transported as
//!   `base64(nonce || ciphertext)`. Decryptable on demand for delivery and
//!   reveal.
//!
//! The two attributes are kept separate on purpose; collapsing them into one
//! field would force uniqueness checks to decrypt the whole table.
//!
//! Both subkeys are derived from a single 32-byte master secret with
//! HKDF-SHA256 using distinct info labels, so the digest key and the AEAD key
//! are independent even though operators configure only one secret.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// Required master secret length after base64 decoding.
const MASTER_KEY_LEN: usize = 32;

const DIGEST_INFO: &[u8] = b"keystock|digest|v1";
const AEAD_INFO: &[u8] = b"keystock|aead|v1";

/// Error produced by cipher operations.
///
/// Any of these is fatal to the calling operation — a code must never be
/// stored or revealed with a wrong value — and none of them is ever mapped
/// to a user-input failure.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("master key is not valid base64 or is not {MASTER_KEY_LEN} bytes")]
    InvalidMasterKey,
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext is malformed or was sealed under different key material")]
    Decrypt,
}

/// Process-wide cipher, constructed once from the configured master secret.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Cipher {
    digest_key: [u8; 32],
    aead_key: [u8; 32],
}

impl Cipher {
    /// Build a cipher from a base64-encoded 32-byte master secret.
    pub fn new(master_key_b64: &str) -> Result<Self, CipherError> {
        let mut master = B64
            .decode(master_key_b64.trim())
            .map_err(|_| CipherError::InvalidMasterKey)?;
        if master.len() != MASTER_KEY_LEN {
            master.zeroize();
            return Err(CipherError::InvalidMasterKey);
        }

        let hk = Hkdf::<Sha256>::new(None, &master);
        let mut digest_key = [0u8; 32];
        let mut aead_key = [0u8; 32];
        hk.expand(DIGEST_INFO, &mut digest_key)
            .map_err(|_| CipherError::InvalidMasterKey)?;
        hk.expand(AEAD_INFO, &mut aead_key)
            .map_err(|_| CipherError::InvalidMasterKey)?;
        master.zeroize();

        Ok(Self {
            digest_key,
            aead_key,
        })
    }

    /// Deterministic digest of a plaintext code, hex-encoded.
    ///
    /// Same input always yields the same digest; used as the global
    /// uniqueness key and duplicate detector.
    pub fn hash(&self, plaintext: &str) -> String {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.digest_key)
            .expect("HMAC accepts keys of any length");
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Encrypt a plaintext code. Returns `base64(nonce || ciphertext)`.
    ///
    /// A fresh nonce is drawn per call, so two encryptions of the same code
    /// never produce equal ciphertexts.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let cipher =
            Aes256Gcm::new_from_slice(&self.aead_key).map_err(|_| CipherError::Encrypt)?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(B64.encode(out))
    }

    /// Decrypt a `base64(nonce || ciphertext)` value back to the plaintext code.
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<String, CipherError> {
        let raw = B64.decode(ciphertext_b64).map_err(|_| CipherError::Decrypt)?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Decrypt);
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);

        let cipher =
            Aes256Gcm::new_from_slice(&self.aead_key).map_err(|_| CipherError::Decrypt)?;
        let plain = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plain).map_err(|_| CipherError::Decrypt)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

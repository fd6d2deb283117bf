//! AES-CBC token codec.
//!
//! Keys and IVs are long-lived shared secrets, so output is deterministic for
//! a given key, IV and plaintext. The IV is fixed per organisation, which the
//! token issuer relies on; it cannot be made per-message without breaking
//! existing tokens.

use std::fmt;

use aes::{Aes128, Aes192, Aes256};
use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use scanproof_common::constants::{IV_LENGTH, VALID_KEY_LENGTHS};
use scanproof_common::{ScanError, ScanResult};

const BLOCK_SIZE: usize = 16;

/// AES variant selected by key length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl KeySize {
    /// Validate key and IV lengths before any cipher work
    pub fn check(key: &[u8], iv: &[u8]) -> ScanResult<Self> {
        if iv.len() != IV_LENGTH {
            return Err(ScanError::Configuration(format!(
                "IV must be {IV_LENGTH} bytes, got {}",
                iv.len()
            )));
        }

        match key.len() {
            16 => Ok(Self::Aes128),
            24 => Ok(Self::Aes192),
            32 => Ok(Self::Aes256),
            other => Err(ScanError::Configuration(format!(
                "key must be one of {VALID_KEY_LENGTHS:?} bytes, got {other}"
            ))),
        }
    }
}

/// Key/IV pair for one organisation. `Debug` never prints the secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKeys {
    key: String,
    iv: String,
}

impl EncryptionKeys {
    pub fn new(key: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            iv: iv.into(),
        }
    }

    /// Keys are used as the UTF-8 bytes of the configured strings
    pub fn key_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }

    pub fn iv_bytes(&self) -> &[u8] {
        self.iv.as_bytes()
    }

    pub fn validate(&self) -> ScanResult<KeySize> {
        KeySize::check(self.key_bytes(), self.iv_bytes())
    }
}

impl fmt::Debug for EncryptionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeys")
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .field("iv", &format_args!("<{} bytes>", self.iv.len()))
            .finish()
    }
}

/// Encrypt `plaintext` and return standard base64
pub fn encrypt(plaintext: &str, key: &[u8], iv: &[u8]) -> ScanResult<String> {
    let data = plaintext.as_bytes();

    let ciphertext = match KeySize::check(key, iv)? {
        KeySize::Aes128 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        KeySize::Aes192 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        KeySize::Aes256 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
    };

    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt standard base64 ciphertext into UTF-8 text
pub fn decrypt(ciphertext_b64: &str, key: &[u8], iv: &[u8]) -> ScanResult<String> {
    let size = KeySize::check(key, iv)?;

    let ciphertext = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|_| ScanError::Decryption("ciphertext is not valid base64".to_string()))?;

    if ciphertext.is_empty() {
        return Err(ScanError::Decryption("ciphertext is empty".to_string()));
    }
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(ScanError::Decryption(format!(
            "ciphertext length {} is not a multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let plaintext = match size {
        KeySize::Aes128 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
        KeySize::Aes192 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
        KeySize::Aes256 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
    }
    .map_err(|_| ScanError::Decryption("bad padding".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| ScanError::Decryption("plaintext is not valid UTF-8".to_string()))
}

/// Decrypt a token as it arrives in a URL
///
/// The token may still be percent-encoded, and a `+` may have been turned
/// into a space by form decoding.
pub fn decrypt_token(token: &str, keys: &EncryptionKeys) -> ScanResult<String> {
    keys.validate()?;

    let decoded = urlencoding::decode(token.trim())
        .map_err(|_| ScanError::Decryption("token is not valid percent-encoding".to_string()))?;
    let restored = decoded.replace(' ', "+");

    decrypt(&restored, keys.key_bytes(), keys.iv_bytes())
}

fn invalid_length(_: cbc::cipher::InvalidLength) -> ScanError {
    ScanError::Configuration("invalid key or IV length".to_string())
}

#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Transmit-key credential codec for fwforge
//!
//! Device network credentials (SSID/password) are stored encrypted with
//! the owner's transmit key in the OpenSSL passphrase format: Base64
//! transport around a `Salted__` envelope, key and IV derived from the
//! passphrase and salt via the MD5 `EVP_BytesToKey` construction, body
//! encrypted with AES-256-CBC/PKCS7. Fleet tooling produced these
//! ciphertexts long before this engine existed, so the format is fixed.
//!
//! [`decrypt`] is deliberately lenient: malformed input logs a warning
//! and yields `None`, which callers treat as "no credential available",
//! never as a fatal error.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fwforge_errors::SecretsError;
use md5::{Digest, Md5};
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const SALT_HEADER: &[u8] = b"Salted__";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration: digest
/// rounds of `prev || passphrase || salt` are concatenated until enough
/// material exists for key and IV.
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut material = Vec::with_capacity(KEY_LEN + IV_LEN);
    let mut prev: Vec<u8> = Vec::new();
    while material.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(passphrase);
        hasher.update(salt);
        prev = hasher.finalize().to_vec();
        material.extend_from_slice(&prev);
    }
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

/// Decrypt a stored credential with the transmit key.
///
/// Returns `None` (with a logged warning) on any malformed input:
/// bad Base64, missing salt envelope, wrong key, or non-UTF-8
/// plaintext.
#[must_use]
pub fn decrypt(transmit_key: &str, cipher_b64: &str) -> Option<String> {
    let raw = match BASE64.decode(cipher_b64.trim()) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(%err, "credential is not valid Base64");
            return None;
        }
    };
    if raw.len() <= SALT_HEADER.len() + 8 || &raw[..SALT_HEADER.len()] != SALT_HEADER {
        tracing::warn!("credential missing salt envelope");
        return None;
    }
    let salt = &raw[SALT_HEADER.len()..SALT_HEADER.len() + 8];
    let body = &raw[SALT_HEADER.len() + 8..];

    let (key, iv) = evp_bytes_to_key(transmit_key.as_bytes(), salt);
    let Ok(cipher) = Aes256CbcDec::new_from_slices(&key, &iv) else {
        return None;
    };
    let plain = match cipher.decrypt_padded_vec_mut::<Pkcs7>(body) {
        Ok(plain) => plain,
        Err(_) => {
            tracing::warn!("credential decryption failed");
            return None;
        }
    };
    match String::from_utf8(plain) {
        Ok(text) => Some(text),
        Err(_) => {
            tracing::warn!("decrypted credential is not UTF-8");
            None
        }
    }
}

/// Encrypt a credential for storage, producing the same envelope the
/// registration path writes.
///
/// # Errors
///
/// Returns an error if the cipher cannot be constructed from the
/// derived key material.
pub fn encrypt(transmit_key: &str, plaintext: &str) -> Result<String, SecretsError> {
    let mut salt = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut salt);

    let (key, iv) = evp_bytes_to_key(transmit_key.as_bytes(), &salt);
    let cipher = Aes256CbcEnc::new_from_slices(&key, &iv).map_err(|e| {
        SecretsError::EncryptFailed {
            message: e.to_string(),
        }
    })?;
    let body = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut raw = Vec::with_capacity(SALT_HEADER.len() + salt.len() + body.len());
    raw.extend_from_slice(SALT_HEADER);
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&body);
    Ok(BASE64.encode(raw))
}

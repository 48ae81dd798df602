//! Credential codec error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SecretsError {
    #[error("ciphertext is not valid Base64: {message}")]
    InvalidBase64 { message: String },

    #[error("ciphertext missing salt envelope")]
    MissingEnvelope,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("encryption failed: {message}")]
    EncryptFailed { message: String },

    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}

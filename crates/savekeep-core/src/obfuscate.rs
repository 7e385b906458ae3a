// ABOUTME: Reversible byte transforms applied to serialized saves before they hit disk.
// ABOUTME: Obfuscation is not encryption; the trait exists so a real cipher can be swapped in.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Errors from applying or reversing an obfuscation transform.
#[derive(Debug, Error)]
pub enum ObfuscationError {
    #[error("obfuscation key is empty")]
    EmptyKey,

    #[error("not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("revealed bytes are not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A keyed, reversible transform from serialized text to printable text.
pub trait Obfuscator: Send + Sync {
    /// Transform plaintext into its stored form.
    fn obfuscate(&self, plain: &str) -> Result<String, ObfuscationError>;

    /// Reverse `obfuscate`. Fails on input that was not produced by it.
    fn reveal(&self, stored: &str) -> Result<String, ObfuscationError>;

    /// Short name for logging.
    fn name(&self) -> &str;
}

/// XOR stream over UTF-8 bytes with the key cycled to length, then base64.
#[derive(Clone)]
pub struct XorObfuscator {
    key: Vec<u8>,
}

impl XorObfuscator {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, ObfuscationError> {
        if self.key.is_empty() {
            return Err(ObfuscationError::EmptyKey);
        }
        Ok(bytes
            .iter()
            .zip(self.key.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect())
    }
}

impl std::fmt::Debug for XorObfuscator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XorObfuscator")
            .field("key_len", &self.key.len())
            .finish()
    }
}

impl Obfuscator for XorObfuscator {
    fn obfuscate(&self, plain: &str) -> Result<String, ObfuscationError> {
        let mixed = self.apply(plain.as_bytes())?;
        Ok(STANDARD.encode(mixed))
    }

    fn reveal(&self, stored: &str) -> Result<String, ObfuscationError> {
        let mixed = STANDARD.decode(stored.trim())?;
        let plain = self.apply(&mixed)?;
        Ok(String::from_utf8(plain)?)
    }

    fn name(&self) -> &str {
        "xor-base64"
    }
}

/// Identity transform, used when obfuscation is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plaintext;

impl Obfuscator for Plaintext {
    fn obfuscate(&self, plain: &str) -> Result<String, ObfuscationError> {
        Ok(plain.to_string())
    }

    fn reveal(&self, stored: &str) -> Result<String, ObfuscationError> {
        Ok(stored.to_string())
    }

    fn name(&self) -> &str {
        "plaintext"
    }
}

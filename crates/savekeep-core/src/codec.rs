// ABOUTME: Pure conversions between SavePackage and the text stored on disk.
// ABOUTME: Decoding accepts both obfuscated and plaintext saves, trying reversal first.

use thiserror::Error;

use crate::obfuscate::Obfuscator;
use crate::package::SavePackage;

/// Errors that can occur while packing or unpacking a save.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialized save is empty")]
    EmptyOutput,

    #[error("save content is empty")]
    EmptyInput,
}

/// Text ready to be written, plus whether the obfuscation step succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub text: String,
    pub obfuscated: bool,
    /// Length in bytes of the serialized form before obfuscation.
    pub plain_len: usize,
}

/// Serialize a package to its flat JSON form.
pub fn pack(package: &SavePackage) -> Result<String, CodecError> {
    let json = serde_json::to_string(package)?;
    if json.trim().is_empty() {
        return Err(CodecError::EmptyOutput);
    }
    Ok(json)
}

/// Parse the flat JSON form back into a package.
pub fn unpack(text: &str) -> Result<SavePackage, CodecError> {
    if text.trim().is_empty() {
        return Err(CodecError::EmptyInput);
    }
    Ok(serde_json::from_str(text)?)
}

/// Pack and obfuscate. If the obfuscator fails, the plaintext form is
/// returned instead so the save can still be written.
pub fn encode(package: &SavePackage, obfuscator: &dyn Obfuscator) -> Result<Encoded, CodecError> {
    let plain = pack(package)?;
    let plain_len = plain.len();

    match obfuscator.obfuscate(&plain) {
        Ok(text) => Ok(Encoded {
            text,
            obfuscated: true,
            plain_len,
        }),
        Err(e) => {
            tracing::warn!(
                slot = %package.save_slot,
                obfuscator = obfuscator.name(),
                error = %e,
                "obfuscation failed, writing plaintext save"
            );
            Ok(Encoded {
                text: plain,
                obfuscated: false,
                plain_len,
            })
        }
    }
}

/// Reverse `encode`. Tries to reveal the text first; if that does not yield
/// a valid package, the text is parsed as plaintext.
pub fn decode(text: &str, obfuscator: &dyn Obfuscator) -> Result<SavePackage, CodecError> {
    if text.trim().is_empty() {
        return Err(CodecError::EmptyInput);
    }

    match obfuscator.reveal(text) {
        Ok(plain) => match unpack(&plain) {
            Ok(package) => return Ok(package),
            Err(e) => {
                tracing::debug!(error = %e, "revealed text is not a package, trying plaintext");
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "text is not obfuscated, trying plaintext");
        }
    }

    unpack(text)
}

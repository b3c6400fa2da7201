use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Length of an uncompressed P-256 public key.
const UNCOMPRESSED_POINT_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("application server key is not url-safe base64: {0}")]
    Encoding(String),
    #[error("application server key must be 65 bytes, got {0}")]
    Length(usize),
    #[error("application server key is not an uncompressed P-256 point")]
    NotUncompressed,
}

/// Public key identifying this server to the push service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationServerKey {
    bytes: Vec<u8>,
}

impl ApplicationServerKey {
    /// Decodes url-safe base64, with or without `=` padding.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let trimmed = encoded.trim().trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|err| KeyError::Encoding(err.to_string()))?;
        if bytes.len() != UNCOMPRESSED_POINT_LEN {
            return Err(KeyError::Length(bytes.len()));
        }
        if bytes[0] != 0x04 {
            return Err(KeyError::NotUncompressed);
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

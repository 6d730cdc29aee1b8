use base64::prelude::{Engine, BASE64_STANDARD};
use serde::{Deserialize, Serialize};

pub const VAULT_FORMAT_VERSION: u32 = 1;

/// On-disk vault envelope.
///
/// `cipher` names the strategy that produced `blob`, so a reader consults the
/// right strategy directly instead of guessing; readers still fall back to
/// trying every configured strategy when the tag does not resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultFile {
    pub version: u32,
    pub cipher: String,
    pub blob: String,
}

impl VaultFile {
    pub fn new(cipher: impl Into<String>, blob: &[u8]) -> Self {
        Self {
            version: VAULT_FORMAT_VERSION,
            cipher: cipher.into(),
            blob: BASE64_STANDARD.encode(blob),
        }
    }

    pub fn blob_bytes(&self) -> Vec<u8> {
        BASE64_STANDARD.decode(&self.blob).unwrap_or_default()
    }
}

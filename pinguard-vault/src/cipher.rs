//! Concrete at-rest cipher strategies.
//!
//! The store holds these in preference order.  `MachineKeyCipher` is the
//! strong default: its key comes from the per-install random seed file.
//! `HostIdCipher` exists for environments where that seed cannot be created
//! (read-only or missing data directory) — it derives a key from the host's
//! machine-id, which any local process can also do, so it trades strength for
//! always-on availability.

use std::path::PathBuf;
use std::sync::OnceLock;

use pbkdf2::pbkdf2_hmac;
use pinguard_core::{machine_key, Cipher, CipherError};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::{self, StorageKey, STORAGE_KEY_LEN};

/// HKDF context binding the machine-key seed to vault storage.
const MACHINE_KEY_CONTEXT: &[u8] = b"pinguard vault storage v1";

/// Fixed PBKDF2 salt for the host-id fallback.  Not secret — it only
/// separates pinguard's derivation from other machine-id consumers.
const HOST_ID_SALT: &[u8] = b"pinguard host-id vault v1";

const HOST_ID_ITERATIONS: u32 = 200_000;

/// Preferred strategy: key derived from the per-install machine-key seed.
#[derive(Default)]
pub struct MachineKeyCipher {
    key: OnceLock<Option<StorageKey>>,
}

impl MachineKeyCipher {
    pub fn new() -> Self {
        Self::default()
    }

    fn storage_key(&self) -> Option<&StorageKey> {
        self.key
            .get_or_init(|| match machine_key::load_or_create() {
                Ok(seed) => Some(crypto::derive_storage_key(&seed, MACHINE_KEY_CONTEXT)),
                Err(e) => {
                    tracing::warn!(error = %e, "machine-key cipher unavailable");
                    None
                }
            })
            .as_ref()
    }

    fn require_key(&self) -> Result<&StorageKey, CipherError> {
        self.storage_key()
            .ok_or_else(|| CipherError::Unavailable("machine key seed not accessible".into()))
    }
}

impl Cipher for MachineKeyCipher {
    fn tag(&self) -> &'static str {
        "machine-key"
    }

    fn is_available(&self) -> bool {
        self.storage_key().is_some()
    }

    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(crypto::seal(self.require_key()?, plaintext))
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        crypto::open(self.require_key()?, blob)
    }
}

/// Fallback strategy: key derived from the host machine-id via PBKDF2.
pub struct HostIdCipher {
    id_paths: Vec<PathBuf>,
    key: OnceLock<Option<StorageKey>>,
}

impl HostIdCipher {
    pub fn new() -> Self {
        Self::with_paths(vec![
            PathBuf::from("/etc/machine-id"),
            PathBuf::from("/var/lib/dbus/machine-id"),
        ])
    }

    /// Use explicit machine-id file candidates.  First readable, non-empty
    /// file wins.
    pub fn with_paths(id_paths: Vec<PathBuf>) -> Self {
        Self {
            id_paths,
            key: OnceLock::new(),
        }
    }

    fn read_host_id(&self) -> Option<Zeroizing<Vec<u8>>> {
        for path in &self.id_paths {
            if let Ok(raw) = std::fs::read(path) {
                let trimmed = raw.trim_ascii();
                if !trimmed.is_empty() {
                    return Some(Zeroizing::new(trimmed.to_vec()));
                }
            }
        }
        None
    }

    fn storage_key(&self) -> Option<&StorageKey> {
        self.key
            .get_or_init(|| {
                let host_id = self.read_host_id()?;
                let mut okm = Zeroizing::new([0u8; STORAGE_KEY_LEN]);
                pbkdf2_hmac::<Sha256>(&host_id, HOST_ID_SALT, HOST_ID_ITERATIONS, &mut *okm);
                StorageKey::from_bytes(&*okm).ok()
            })
            .as_ref()
    }

    fn require_key(&self) -> Result<&StorageKey, CipherError> {
        self.storage_key()
            .ok_or_else(|| CipherError::Unavailable("no readable machine-id".into()))
    }
}

impl Default for HostIdCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl Cipher for HostIdCipher {
    fn tag(&self) -> &'static str {
        "host-id"
    }

    fn is_available(&self) -> bool {
        self.storage_key().is_some()
    }

    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(crypto::seal(self.require_key()?, plaintext))
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        crypto::open(self.require_key()?, blob)
    }
}

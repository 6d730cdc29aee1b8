//! The persistent secret store.
//!
//! One encrypted file holds every `key_id = secret` record.  Reads tolerate
//! everything — a missing, corrupt, or undecryptable file is simply "no
//! record", because the caller's recovery path (prompt the user again) is
//! always available.  Writes are read-merge-rewrite over the whole map and
//! land atomically via a temp file + rename so a crash mid-write can never
//! corrupt the previous vault.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pinguard_core::{Cipher, Secret};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::types::VaultFile;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Every configured strategy refused to protect the new vault contents.
    #[error("no cipher could protect the vault")]
    AllCiphersFailed,
    #[error("vault i/o at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("vault serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct SecretStore {
    path: PathBuf,
    ciphers: Vec<Box<dyn Cipher>>,
}

impl SecretStore {
    /// `ciphers` is the preference-ordered strategy list; the first entry is
    /// the preferred cipher for new writes.
    pub fn new(path: impl Into<PathBuf>, ciphers: Vec<Box<dyn Cipher>>) -> Self {
        Self {
            path: path.into(),
            ciphers,
        }
    }

    /// `$XDG_DATA_HOME/pinguard/vault.json` (default: `~/.local/share/…`).
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))?;
        Some(base.join("pinguard").join("vault.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the secret for `key_id`.
    ///
    /// Returns `None` when no vault file exists, no record matches, or the
    /// file cannot be decrypted by any configured strategy — never an error.
    pub fn get(&self, key_id: &str) -> Option<Secret> {
        let map = self.read_map()?;
        map.get(key_id).map(|value| Secret::new(value.as_str()))
    }

    /// Merge `(key_id, secret)` into the vault and rewrite it.
    ///
    /// Existing records are preserved where they can be decoded; an
    /// undecryptable existing file is treated as an empty map rather than a
    /// fatal condition, and is only replaced once the new file is fully
    /// written.
    pub fn put(&self, key_id: &str, secret: &Secret) -> Result<(), StoreError> {
        let mut map = self.read_map().unwrap_or_default();
        map.insert(key_id.to_string(), secret.expose().to_string());

        let plaintext = Zeroizing::new(render_records(&map).into_bytes());
        drop(map);

        let (tag, blob) = self.protect_with_first_working(&plaintext)?;
        let file = VaultFile::new(tag, &blob);
        let content = serde_json::to_string_pretty(&file)?;
        self.write_atomic(content.as_bytes())?;

        debug!(cipher = tag, "vault rewritten");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    fn read_map(&self) -> Option<BTreeMap<String, String>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read vault file");
                return None;
            }
        };

        let file: VaultFile = match serde_json::from_slice(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "vault file is not a valid envelope");
                return None;
            }
        };

        let plaintext = self.unprotect_any(&file)?;
        let text = match std::str::from_utf8(&plaintext) {
            Ok(text) => text,
            Err(_) => {
                warn!("vault plaintext is not valid UTF-8");
                return None;
            }
        };
        Some(parse_records(text))
    }

    /// Decrypt the envelope: the tagged strategy first, then every strategy
    /// in preference order.  Total failure is a miss, not an error.
    fn unprotect_any(&self, file: &VaultFile) -> Option<Zeroizing<Vec<u8>>> {
        let blob = file.blob_bytes();

        if let Some(tagged) = self.ciphers.iter().find(|c| c.tag() == file.cipher) {
            match tagged.unprotect(&blob) {
                Ok(plaintext) => {
                    debug!(cipher = tagged.tag(), "vault decrypted via tag");
                    return Some(plaintext);
                }
                Err(e) => {
                    debug!(cipher = tagged.tag(), error = %e, "tagged cipher failed, trying others")
                }
            }
        }

        for cipher in &self.ciphers {
            if cipher.tag() == file.cipher {
                continue;
            }
            if let Ok(plaintext) = cipher.unprotect(&blob) {
                debug!(cipher = cipher.tag(), "vault decrypted by trial");
                return Some(plaintext);
            }
        }

        warn!("vault file undecryptable by every configured cipher");
        None
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    fn protect_with_first_working(
        &self,
        plaintext: &[u8],
    ) -> Result<(&'static str, Vec<u8>), StoreError> {
        for cipher in &self.ciphers {
            match cipher.protect(plaintext) {
                Ok(blob) => return Ok((cipher.tag(), blob)),
                Err(e) => warn!(cipher = cipher.tag(), error = %e, "cipher cannot protect vault"),
            }
        }
        Err(StoreError::AllCiphersFailed)
    }

    fn write_atomic(&self, content: &[u8]) -> Result<(), StoreError> {
        let io_err = |path: &Path, source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        write_mode_0600(&tmp, content).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("path", &self.path)
            .field(
                "ciphers",
                &self.ciphers.iter().map(|c| c.tag()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn write_mode_0600(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write as _;

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(data))
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)
    }
}

// ---------------------------------------------------------------------------
// Plaintext record format
// ---------------------------------------------------------------------------

/// Parse newline-delimited `key=value` records, trimming whitespace around
/// the first `=`.  Lines without `=` are skipped.
fn parse_records(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), value.trim().to_string());
        }
    }
    map
}

fn render_records(map: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinguard_core::CipherError;

    /// Reversible toy cipher for store-level tests: XORs with a fixed byte so
    /// two instances with different bytes cannot read each other.
    struct XorCipher {
        tag: &'static str,
        byte: u8,
        broken: bool,
    }

    impl XorCipher {
        fn new(tag: &'static str, byte: u8) -> Self {
            Self {
                tag,
                byte,
                broken: false,
            }
        }

        fn broken(tag: &'static str) -> Self {
            Self {
                tag,
                byte: 0,
                broken: true,
            }
        }
    }

    impl Cipher for XorCipher {
        fn tag(&self) -> &'static str {
            self.tag
        }

        fn is_available(&self) -> bool {
            !self.broken
        }

        fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
            if self.broken {
                return Err(CipherError::Unavailable("broken".into()));
            }
            let mut blob = vec![self.byte];
            blob.extend(plaintext.iter().map(|b| b ^ self.byte));
            Ok(blob)
        }

        fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
            if self.broken {
                return Err(CipherError::Unavailable("broken".into()));
            }
            match blob.split_first() {
                Some((&marker, rest)) if marker == self.byte => {
                    Ok(Zeroizing::new(rest.iter().map(|b| b ^ self.byte).collect()))
                }
                _ => Err(CipherError::DecryptFailed),
            }
        }
    }

    fn store_at(dir: &Path, ciphers: Vec<Box<dyn Cipher>>) -> SecretStore {
        SecretStore::new(dir.join("vault.json"), ciphers)
    }

    #[test]
    fn get_on_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 1))]);
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn put_get_roundtrip_and_simulated_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 1))]);

        store.put("keygrip", &Secret::new("pass phrase")).unwrap();
        assert_eq!(store.get("keygrip").unwrap().expose(), "pass phrase");

        // A fresh store over the same path stands in for a process restart.
        let restarted = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 1))]);
        assert_eq!(restarted.get("keygrip").unwrap().expose(), "pass phrase");
    }

    #[test]
    fn put_merges_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 1))]);

        store.put("first", &Secret::new("one")).unwrap();
        store.put("second", &Secret::new("two")).unwrap();
        store.put("first", &Secret::new("updated")).unwrap();

        assert_eq!(store.get("first").unwrap().expose(), "updated");
        assert_eq!(store.get("second").unwrap().expose(), "two");
    }

    #[test]
    fn empty_secret_roundtrips_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 1))]);

        store.put("k", &Secret::new("")).unwrap();
        let hit = store.get("k").expect("empty secret is a stored record");
        assert!(hit.is_empty());
    }

    #[test]
    fn undecryptable_file_reads_as_absent_and_put_still_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, b"this is not a vault").unwrap();

        let store = SecretStore::new(&path, vec![Box::new(XorCipher::new("a", 1))]);
        assert!(store.get("k").is_none());

        store.put("k", &Secret::new("recovered")).unwrap();
        assert_eq!(store.get("k").unwrap().expose(), "recovered");
    }

    #[test]
    fn foreign_ciphertext_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 1))]);
        writer.put("k", &Secret::new("v")).unwrap();

        // Same tag, different key material: tagged path fails, trial fails.
        let reader = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 9))]);
        assert!(reader.get("k").is_none());
    }

    #[test]
    fn preferred_failure_falls_back_and_tags_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(
            dir.path(),
            vec![
                Box::new(XorCipher::broken("preferred")),
                Box::new(XorCipher::new("fallback", 3)),
            ],
        );

        store.put("k", &Secret::new("v")).unwrap();

        let content = std::fs::read(dir.path().join("vault.json")).unwrap();
        let file: VaultFile = serde_json::from_slice(&content).unwrap();
        assert_eq!(file.cipher, "fallback");
        assert_eq!(store.get("k").unwrap().expose(), "v");
    }

    #[test]
    fn stale_tag_still_decrypts_by_trial() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::new("old-name", 5))]);
        store.put("k", &Secret::new("v")).unwrap();

        // The strategy was renamed between releases; the blob is unchanged.
        let renamed = store_at(dir.path(), vec![Box::new(XorCipher::new("new-name", 5))]);
        assert_eq!(renamed.get("k").unwrap().expose(), "v");
    }

    #[test]
    fn all_ciphers_failing_put_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::broken("only"))]);
        assert!(matches!(
            store.put("k", &Secret::new("v")),
            Err(StoreError::AllCiphersFailed)
        ));
        // And the failed put left nothing behind.
        assert!(!dir.path().join("vault.json").exists());
    }

    #[test]
    fn no_temp_file_remains_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 1))]);
        store.put("k", &Secret::new("v")).unwrap();
        assert!(!dir.path().join("vault.json.tmp").exists());
    }

    #[test]
    fn plaintext_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), vec![Box::new(XorCipher::new("a", 0xFF))]);
        store.put("keygrip", &Secret::new("hunter2-cleartext")).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("vault.json")).unwrap();
        assert!(!raw.contains("hunter2-cleartext"));
        assert!(!raw.contains("keygrip="));
    }

    #[test]
    fn parse_records_trims_around_equals() {
        let map = parse_records("a = 1\n b=2 \nnot a record\n=orphan\nc=with=equals\n");
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.get("b").map(String::as_str), Some("2"));
        assert_eq!(map.get("c").map(String::as_str), Some("with=equals"));
        assert!(!map.contains_key(""));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn render_parse_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert("alpha".to_string(), "one two".to_string());
        map.insert("beta".to_string(), String::new());
        assert_eq!(parse_records(&render_records(&map)), map);
    }
}

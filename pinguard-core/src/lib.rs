use zeroize::Zeroizing;

pub mod cache;
pub mod machine_key;

pub use cache::SessionCache;

/// Crate-wide mutex used by tests that mutate process environment variables.
///
/// `machine_key` and the `debug_enabled` tests both call
/// `unsafe { env::set_var(...) }`; a single process-wide lock prevents races
/// when those tests run in parallel in the same test binary.
#[cfg(test)]
pub(crate) static TEST_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// A passphrase held in memory.
///
/// The backing string is zeroized on drop, `Debug` is redacted, and the type
/// deliberately refuses serde so a secret can never ride along inside a
/// serialized structure by accident.
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self(Zeroizing::new(self.0.to_string()))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

impl serde::Serialize for Secret {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(serde::ser::Error::custom("Secret cannot be serialized"))
    }
}

impl<'de> serde::Deserialize<'de> for Secret {
    fn deserialize<D>(_deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Err(serde::de::Error::custom("Secret cannot be deserialized"))
    }
}

/// Outcome of asking the user for a secret.
///
/// An intentionally empty entry is `Provided` with an empty secret — it is a
/// different thing from the user backing out, and the two must stay
/// distinguishable through the whole pipeline.  Collector infrastructure
/// failures travel as `Err` on the surrounding `Result`.
#[derive(Debug)]
pub enum Collected {
    Provided(Secret),
    Cancelled,
}

/// A platform presence/identity check (biometric reader, PIN pad, or any
/// equivalent).  Implementations convert their own failures into `false`;
/// a gate that cannot run is a gate that declines.
pub trait Authenticator {
    fn is_available(&self) -> bool;

    /// Ask the platform to verify the user is present, showing `prompt` if
    /// the mechanism has a display surface.  Blocks until the user responds.
    fn verify(&self, prompt: &str) -> bool;
}

#[derive(thiserror::Error, Debug)]
pub enum CipherError {
    /// The strategy cannot run in this environment (missing key material,
    /// unresolvable data directory).
    #[error("cipher unavailable: {0}")]
    Unavailable(String),
    #[error("malformed ciphertext: {0}")]
    Malformed(&'static str),
    /// MAC verification or block decryption failed — wrong key or tampering.
    #[error("decryption failed")]
    DecryptFailed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One at-rest protection strategy in the vault's ordered preferred/fallback
/// list.
///
/// `tag()` is the stable identifier persisted next to the ciphertext so a
/// reader knows which strategy produced a given blob instead of guessing.
pub trait Cipher {
    fn tag(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decrypt a blob previously produced by `protect`.  The plaintext is
    /// returned zeroizing so it is scrubbed when the caller drops it.
    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError>;
}

/// Context handed to the input collector when no stored secret exists.
#[derive(Debug, Clone, Copy)]
pub struct CollectRequest<'a> {
    pub key_id: &'a str,
    pub description: Option<&'a str>,
    pub prompt: Option<&'a str>,
}

/// Prompts the user once to establish a secret when none is stored yet.
pub trait SecretCollector {
    fn collect(&mut self, request: &CollectRequest<'_>) -> anyhow::Result<Collected>;
}

/// Environment variable enabling verbose diagnostics on stderr.
pub const DEBUG_ENV: &str = "PINGUARD_DEBUG";

/// `true` when `PINGUARD_DEBUG` holds a truthy value (`1`, `true`, `yes`,
/// case-insensitive).  Diagnostics carry lifecycle markers only — never
/// secret values.
pub fn debug_enabled() -> bool {
    match std::env::var(DEBUG_ENV) {
        Ok(value) => {
            let value = value.trim();
            value == "1"
                || value.eq_ignore_ascii_case("true")
                || value.eq_ignore_ascii_case("yes")
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_redacts() {
        let secret = Secret::new("hunter2");
        let debug = format!("{secret:?}");
        assert_eq!(debug, "Secret([redacted])");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn secret_clone_preserves_value() {
        let secret = Secret::new("correct horse");
        assert_eq!(secret.clone().expose(), "correct horse");
    }

    #[test]
    fn secret_serialize_fails() {
        let secret = Secret::new("s3cr3t");
        assert!(serde_json::to_string(&secret).is_err());
    }

    #[test]
    fn secret_deserialize_fails() {
        let result: Result<Secret, _> = serde_json::from_str("\"data\"");
        assert!(result.is_err());
    }

    #[test]
    fn empty_secret_is_provided_not_cancelled() {
        let outcome = Collected::Provided(Secret::new(""));
        match outcome {
            Collected::Provided(secret) => assert!(secret.is_empty()),
            Collected::Cancelled => panic!("empty secret must not collapse into cancellation"),
        }
    }

    fn with_debug_env(value: Option<&str>, f: impl FnOnce()) {
        let _guard = crate::TEST_ENV_MUTEX.lock().unwrap();
        match value {
            Some(v) => unsafe { std::env::set_var(DEBUG_ENV, v) },
            None => unsafe { std::env::remove_var(DEBUG_ENV) },
        }
        f();
        unsafe { std::env::remove_var(DEBUG_ENV) };
    }

    #[test]
    fn debug_enabled_accepts_truthy_values() {
        for value in ["1", "true", "TRUE", "yes", "Yes", " yes "] {
            with_debug_env(Some(value), || assert!(debug_enabled(), "value: {value:?}"));
        }
    }

    #[test]
    fn debug_enabled_rejects_everything_else() {
        for value in ["0", "false", "no", "", "on", "2"] {
            with_debug_env(Some(value), || assert!(!debug_enabled(), "value: {value:?}"));
        }
        with_debug_env(None, || assert!(!debug_enabled()));
    }
}

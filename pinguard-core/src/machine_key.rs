//! Per-installation machine key seed.
//!
//! A random 32-byte seed generated once on first use and stored at:
//! ```text
//! $XDG_DATA_HOME/pinguard/machine-key   (default: ~/.local/share/pinguard/machine-key)
//! ```
//! The file is created with mode `0600`.  The vault's preferred cipher derives
//! its storage key from this seed, so stored passphrases can be decrypted
//! without any extra user interaction.
//!
//! # Security model
//!
//! The seed protects the vault with the same strength as the user's home
//! directory: an attacker who can read `~/.local/share/pinguard/` already has
//! the encrypted vault file sitting next to it, and both are guarded only by
//! filesystem permissions.

use std::path::PathBuf;

use rand::RngCore;
use zeroize::Zeroizing;

pub const SEED_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum MachineKeyError {
    #[error("cannot locate data directory: neither XDG_DATA_HOME nor HOME is set")]
    NoDataDir,
    #[error("machine key at {path} has length {len}, expected {SEED_LEN}")]
    BadLength { path: PathBuf, len: usize },
    #[error("machine key i/o at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Load the machine key seed, generating and persisting it if absent.
pub fn load_or_create() -> Result<Zeroizing<Vec<u8>>, MachineKeyError> {
    let path = seed_path()?;

    if path.exists() {
        let bytes = std::fs::read(&path).map_err(|source| MachineKeyError::Io {
            path: path.clone(),
            source,
        })?;
        if bytes.len() != SEED_LEN {
            return Err(MachineKeyError::BadLength {
                path,
                len: bytes.len(),
            });
        }
        return Ok(Zeroizing::new(bytes));
    }

    let mut seed = Zeroizing::new(vec![0u8; SEED_LEN]);
    rand::rng().fill_bytes(&mut seed);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| MachineKeyError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    write_mode_0600(&path, &seed).map_err(|source| MachineKeyError::Io { path, source })?;

    Ok(seed)
}

fn seed_path() -> Result<PathBuf, MachineKeyError> {
    let base = if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local/share")
    } else {
        return Err(MachineKeyError::NoDataDir);
    };
    Ok(base.join("pinguard").join("machine-key"))
}

fn write_mode_0600(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
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

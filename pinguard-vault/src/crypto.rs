//! Symmetric primitives shared by the cipher strategies.
//!
//! AES-256-CBC with encrypt-then-MAC (HMAC-SHA256), operating on a 64-byte
//! [`StorageKey`]: the first 32 bytes encrypt, the last 32 bytes authenticate.
//! Sealed blobs are self-contained: `IV || ciphertext || MAC`.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pinguard_core::CipherError;
use sha2::Sha256;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const IV_LEN: usize = 16;
pub const MAC_LEN: usize = 32;
pub const STORAGE_KEY_LEN: usize = 64;

/// A 64-byte symmetric key pair: 32 bytes encryption key + 32 bytes MAC key.
///
/// Derived by the cipher strategies from their respective seeds; zeroized on
/// drop.
pub struct StorageKey {
    data: Zeroizing<Vec<u8>>,
}

impl StorageKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != STORAGE_KEY_LEN {
            return Err(CipherError::Malformed("storage key must be 64 bytes"));
        }
        Ok(Self {
            data: Zeroizing::new(bytes.to_vec()),
        })
    }

    fn enc_key(&self) -> &[u8] {
        &self.data[..32]
    }

    fn mac_key(&self) -> &[u8] {
        &self.data[32..]
    }
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageKey([redacted])")
    }
}

/// Expand a seed into a [`StorageKey`] with HKDF-SHA256 under a context
/// string.  Distinct contexts yield independent keys from the same seed.
pub fn derive_storage_key(seed: &[u8], context: &[u8]) -> StorageKey {
    let hkdf = Hkdf::<Sha256>::new(None, seed);
    let mut okm = Zeroizing::new([0u8; STORAGE_KEY_LEN]);
    hkdf.expand(context, &mut *okm)
        .expect("HKDF expand should not fail for 64-byte output");
    StorageKey {
        data: Zeroizing::new(okm.to_vec()),
    }
}

/// Encrypt `plaintext` into a self-contained `IV || ciphertext || MAC` blob.
/// A fresh random IV is generated on every call; the MAC covers IV and
/// ciphertext (encrypt-then-MAC).
pub fn seal(key: &StorageKey, plaintext: &[u8]) -> Vec<u8> {
    let iv = rand::random::<[u8; IV_LEN]>();
    let cipher = Aes256CbcEnc::new(key.enc_key().into(), (&iv).into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut mac = HmacSha256::new_from_slice(key.mac_key())
        .expect("HMAC key should be valid for any length");
    mac.update(&iv);
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len() + MAC_LEN);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    blob.extend_from_slice(&tag);
    blob
}

/// Verify and decrypt a blob produced by [`seal`].
///
/// The MAC is checked before any decryption is attempted.  The plaintext is
/// returned zeroizing so it is scrubbed when the caller drops it.
pub fn open(key: &StorageKey, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if blob.len() < IV_LEN + MAC_LEN {
        return Err(CipherError::Malformed("blob too short"));
    }
    let (iv, rest) = blob.split_at(IV_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - MAC_LEN);

    let mut mac = HmacSha256::new_from_slice(key.mac_key())
        .expect("HMAC key should be valid for any length");
    mac.update(iv);
    mac.update(ciphertext);
    if mac.verify_slice(tag).is_err() {
        return Err(CipherError::DecryptFailed);
    }

    let cipher = Aes256CbcDec::new(key.enc_key().into(), iv.into());
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CipherError::DecryptFailed)
}

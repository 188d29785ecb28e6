use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Key size in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// IV size in bytes (128-bit)
pub const IV_SIZE: usize = 16;

/// Authentication tag appended to every ciphertext
const TAG_SIZE: usize = 16;

/// AES-256-GCM instantiated with a 128-bit IV
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub type Key = Zeroizing<[u8; KEY_SIZE]>;
pub type Iv = [u8; IV_SIZE];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid IV length: expected {IV_SIZE} bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("ciphertext too short")]
    CiphertextTooShort,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Generate a random 256-bit key from the OS CSPRNG
pub fn generate_key() -> Key {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut key[..]);
    key
}

/// Generate a random 128-bit IV; independent per call
pub fn generate_iv() -> Iv {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm16> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }
    Aes256Gcm16::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))
}

fn nonce_for(iv: &[u8]) -> Result<&Nonce<U16>> {
    if iv.len() != IV_SIZE {
        return Err(CryptoError::InvalidIvLength(iv.len()));
    }
    Ok(Nonce::<U16>::from_slice(iv))
}

/// Encrypt `plaintext` under (`key`, `iv`).
///
/// Deterministic for identical inputs. The caller must never reuse an IV
/// with the same key for a different plaintext.
pub fn encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = nonce_for(iv)?;

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt and authenticate `ciphertext`. Never returns partial plaintext.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = nonce_for(iv)?;

    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::CiphertextTooShort);
    }

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Split a blob laid out as `iv || ciphertext`
pub fn split_prefixed_iv(blob: &[u8]) -> Result<(Iv, &[u8])> {
    if blob.len() < IV_SIZE + TAG_SIZE {
        return Err(CryptoError::CiphertextTooShort);
    }

    let (prefix, rest) = blob.split_at(IV_SIZE);
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(prefix);
    Ok((iv, rest))
}

/// Holds the deployment master key.
///
/// The master key encrypts files uploaded through the system-wide flow and
/// seals per-file keys so they are never persisted in plaintext.
pub struct CryptoEngine {
    master_key: Key,
}

impl CryptoEngine {
    pub fn new(master_key: Key) -> Self {
        Self { master_key }
    }

    pub fn master_key(&self) -> &[u8; KEY_SIZE] {
        &self.master_key
    }

    /// Seal a per-file key under the master key. Output is `iv || ciphertext`.
    pub fn wrap_key(&self, key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
        let iv = generate_iv();
        let sealed = encrypt(key, &self.master_key[..], &iv)?;

        let mut wrapped = Vec::with_capacity(IV_SIZE + sealed.len());
        wrapped.extend_from_slice(&iv);
        wrapped.extend_from_slice(&sealed);
        Ok(wrapped)
    }

    /// Recover a per-file key sealed by [`CryptoEngine::wrap_key`]
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Key> {
        let (iv, sealed) = split_prefixed_iv(wrapped)?;
        let plain = Zeroizing::new(decrypt(sealed, &self.master_key[..], &iv)?);

        let key: [u8; KEY_SIZE] = plain
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(plain.len()))?;
        Ok(Zeroizing::new(key))
    }
}

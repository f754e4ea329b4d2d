//! Field-level string encryption.
//!
//! Blob format: `base64([iv:16][aes-256-cbc ciphertext])`. There is no
//! authentication tag; a wrong key or damaged blob is only noticed when the
//! padding or the UTF-8 check fails, and then [`decrypt`] returns an empty
//! string.

use crate::error::{Result, StoreError};
use crate::key_provider::EncryptionKey;
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tracing::debug;

/// Initialization vector length (one AES block).
pub const IV_SIZE: usize = 16;

/// Context string for the lookup-tag subkey.
const LOOKUP_TAG_CONTEXT: &str = "insait-store 2026 lookup tag v1";

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypts `plaintext` under `key` with a fresh random IV.
///
/// Empty input yields an empty blob. An RNG failure is logged and also
/// yields an empty blob, which readers treat as "unavailable".
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> String {
    if plaintext.is_empty() {
        return String::new();
    }
    match try_encrypt(plaintext, key) {
        Ok(blob) => blob,
        Err(e) => {
            debug!(error = %e, "String encryption failed");
            String::new()
        }
    }
}

/// Decrypts a blob produced by [`encrypt`].
///
/// Returns an empty string for an empty blob and for any blob that does not
/// decrypt cleanly under `key`.
pub fn decrypt(blob: &str, key: &EncryptionKey) -> String {
    if blob.is_empty() {
        return String::new();
    }
    match try_decrypt(blob, key) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            debug!(error = %e, "String decryption failed");
            String::new()
        }
    }
}

/// Deterministic keyed digest of `plaintext`.
///
/// Encrypted blobs differ on every call, so equality lookups on encrypted
/// fields go through this tag instead.
pub fn lookup_tag(plaintext: &str, key: &EncryptionKey) -> [u8; 32] {
    let tag_key = zeroize::Zeroizing::new(blake3::derive_key(LOOKUP_TAG_CONTEXT, key.as_bytes()));
    *blake3::keyed_hash(&tag_key, plaintext.as_bytes()).as_bytes()
}

fn try_encrypt(plaintext: &str, key: &EncryptionKey) -> Result<String> {
    let mut iv = [0u8; IV_SIZE];
    {
        use rand::TryRngCore as _;
        let mut rng = rand::rngs::OsRng;
        rng.try_fill_bytes(&mut iv)
            .map_err(|e| StoreError::Encryption(format!("secure random failed: {}", e)))?;
    }

    let ciphertext = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| StoreError::Encryption(format!("failed to create cipher: {}", e)))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut blob = Vec::with_capacity(IV_SIZE + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

fn try_decrypt(blob: &str, key: &EncryptionKey) -> Result<String> {
    let raw = STANDARD
        .decode(blob)
        .map_err(|e| StoreError::Encryption(format!("invalid base64: {}", e)))?;

    if raw.len() <= IV_SIZE || (raw.len() - IV_SIZE) % IV_SIZE != 0 {
        return Err(StoreError::Encryption(format!(
            "blob length {} is not IV plus whole blocks",
            raw.len()
        )));
    }

    let (iv, ciphertext) = raw.split_at(IV_SIZE);
    let plaintext = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| StoreError::Encryption(format!("failed to create cipher: {}", e)))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| StoreError::Encryption(format!("bad padding: {}", e)))?;

    String::from_utf8(plaintext)
        .map_err(|e| StoreError::Encryption(format!("plaintext is not UTF-8: {}", e)))
}

//! Per-user encryption key management.
//!
//! The key is 32 random bytes wrapped by an OS facility that ties it to the
//! current user (DPAPI on Windows) and stored in the key file. When no such
//! facility exists, or anything about the key file goes wrong, the provider
//! derives a deterministic key from the machine and user names instead. The
//! application always gets *a* key; only its strength varies.

use crate::error::{Result, StoreError};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Key length in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Salt mixed into the machine-derived fallback key.
const FALLBACK_SALT: &str = "InsaitVideoPlayer2026";

/// Where the in-memory key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Unwrapped from an existing key file.
    Protected,
    /// Freshly generated and written to the key file.
    Generated,
    /// Derived from machine and user names.
    Fallback,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protected => write!(f, "protected"),
            Self::Generated => write!(f, "generated"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// A 256-bit symmetric key. The buffer is zeroed when the value is dropped.
pub struct EncryptionKey {
    bytes: Zeroizing<[u8; KEY_SIZE]>,
    source: KeySource,
}

impl EncryptionKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE], source: KeySource) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
            source,
        }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// How this key was obtained.
    pub fn source(&self) -> KeySource {
        self.source
    }

    /// Short non-reversible identifier, safe to print.
    pub fn fingerprint(&self) -> String {
        let digest = blake3::derive_key("insait-store key fingerprint v1", self.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("source", &self.source)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// OS-backed wrapping of secret bytes for the current user.
pub trait KeyProtector: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the facility exists on this platform.
    fn is_available(&self) -> bool {
        true
    }

    /// Wraps `secret` so only the current user can unwrap it.
    fn protect(&self, secret: &[u8]) -> Result<Vec<u8>>;

    /// Reverses [`protect`](Self::protect).
    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Stand-in for platforms without a per-user protection facility.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableProtector;

impl KeyProtector for UnavailableProtector {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn protect(&self, _secret: &[u8]) -> Result<Vec<u8>> {
        Err(StoreError::KeyUnavailable(
            "no per-user data protection on this platform".to_string(),
        ))
    }

    fn unprotect(&self, _blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        Err(StoreError::KeyUnavailable(
            "no per-user data protection on this platform".to_string(),
        ))
    }
}

/// Windows DPAPI, current-user scope.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DpapiProtector;

#[cfg(windows)]
impl DpapiProtector {
    fn transform<F>(input: &[u8], call: F) -> Result<Vec<u8>>
    where
        F: FnOnce(
            *const windows_sys::Win32::Security::Cryptography::CRYPT_INTEGER_BLOB,
            *mut windows_sys::Win32::Security::Cryptography::CRYPT_INTEGER_BLOB,
        ) -> i32,
    {
        use windows_sys::Win32::Foundation::LocalFree;
        use windows_sys::Win32::Security::Cryptography::CRYPT_INTEGER_BLOB;

        let len = u32::try_from(input.len())
            .map_err(|_| StoreError::KeyUnavailable("input too large for DPAPI".to_string()))?;
        let data_in = CRYPT_INTEGER_BLOB {
            cbData: len,
            pbData: input.as_ptr() as *mut u8,
        };
        let mut data_out = CRYPT_INTEGER_BLOB {
            cbData: 0,
            pbData: std::ptr::null_mut(),
        };

        if call(&data_in, &mut data_out) == 0 {
            return Err(StoreError::KeyUnavailable(format!(
                "DPAPI call failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        // SAFETY: on success DPAPI hands back a LocalAlloc'd buffer of
        // cbData bytes that we own and must release with LocalFree.
        unsafe {
            let out =
                std::slice::from_raw_parts(data_out.pbData, data_out.cbData as usize).to_vec();
            LocalFree(data_out.pbData as _);
            Ok(out)
        }
    }
}

#[cfg(windows)]
impl KeyProtector for DpapiProtector {
    fn name(&self) -> &'static str {
        "dpapi"
    }

    fn protect(&self, secret: &[u8]) -> Result<Vec<u8>> {
        use windows_sys::Win32::Security::Cryptography::{
            CryptProtectData, CRYPTPROTECT_UI_FORBIDDEN,
        };

        Self::transform(secret, |input, output| {
            // SAFETY: both blobs outlive the call; optional arguments are null.
            unsafe {
                CryptProtectData(
                    input,
                    std::ptr::null(),
                    std::ptr::null(),
                    std::ptr::null(),
                    std::ptr::null(),
                    CRYPTPROTECT_UI_FORBIDDEN,
                    output,
                )
            }
        })
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        use windows_sys::Win32::Security::Cryptography::{
            CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN,
        };

        Self::transform(blob, |input, output| {
            // SAFETY: both blobs outlive the call; optional arguments are null.
            unsafe {
                CryptUnprotectData(
                    input,
                    std::ptr::null_mut(),
                    std::ptr::null(),
                    std::ptr::null(),
                    std::ptr::null(),
                    CRYPTPROTECT_UI_FORBIDDEN,
                    output,
                )
            }
        })
        .map(Zeroizing::new)
    }
}

/// The protection facility native to this platform.
pub fn platform_protector() -> Box<dyn KeyProtector> {
    #[cfg(windows)]
    {
        Box::new(DpapiProtector)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnavailableProtector)
    }
}

/// Obtains the store key, creating and protecting a new one when needed.
pub struct KeyProvider {
    key_path: PathBuf,
    protector: Box<dyn KeyProtector>,
}

impl KeyProvider {
    /// Creates a provider for the key file at `key_path`.
    pub fn new(key_path: impl Into<PathBuf>, protector: Box<dyn KeyProtector>) -> Self {
        Self {
            key_path: key_path.into(),
            protector,
        }
    }

    /// Path to the protected key file.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Returns the stored key, a newly generated one, or the fallback key.
    ///
    /// Never fails: every error on the protected path degrades to
    /// [`fallback_key`].
    pub fn get_or_create_key(&self) -> EncryptionKey {
        if !self.protector.is_available() {
            debug!(
                protector = self.protector.name(),
                "Key protection unavailable, using machine-derived key"
            );
            return fallback_key();
        }

        match self.load_or_generate() {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    protector = self.protector.name(),
                    error = %e,
                    "Protected key unavailable, using machine-derived key"
                );
                fallback_key()
            }
        }
    }

    /// Deletes the key file so the next acquisition starts over.
    pub fn discard_key_file(&self) {
        match fs::remove_file(&self.key_path) {
            Ok(()) => info!(path = %self.key_path.display(), "Deleted key file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.key_path.display(),
                error = %e,
                "Failed to delete key file"
            ),
        }
    }

    fn load_or_generate(&self) -> Result<EncryptionKey> {
        if self.key_path.exists() {
            match self.load_existing() {
                Ok(key) => return Ok(key),
                Err(e) => {
                    warn!(
                        path = %self.key_path.display(),
                        error = %e,
                        "Key file unreadable, generating a new key"
                    );
                    self.discard_key_file();
                }
            }
        }
        self.generate()
    }

    fn load_existing(&self) -> Result<EncryptionKey> {
        let protected = fs::read(&self.key_path)?;
        if protected.is_empty() {
            return Err(StoreError::KeyUnavailable("key file is empty".to_string()));
        }

        let secret = self.protector.unprotect(&protected)?;
        let bytes: [u8; KEY_SIZE] = secret.as_slice().try_into().map_err(|_| {
            StoreError::KeyUnavailable(format!(
                "unwrapped key has {} bytes, expected {}",
                secret.len(),
                KEY_SIZE
            ))
        })?;

        debug!(path = %self.key_path.display(), "Loaded protected key");
        Ok(EncryptionKey::from_bytes(bytes, KeySource::Protected))
    }

    fn generate(&self) -> Result<EncryptionKey> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        {
            use rand::TryRngCore as _;
            let mut rng = rand::rngs::OsRng;
            rng.try_fill_bytes(&mut bytes[..])
                .map_err(|e| StoreError::Encryption(format!("secure random failed: {}", e)))?;
        }

        let protected = self.protector.protect(&bytes[..])?;
        self.write_key_file(&protected)?;

        info!(
            path = %self.key_path.display(),
            protector = self.protector.name(),
            "Generated new store key"
        );
        Ok(EncryptionKey::from_bytes(*bytes, KeySource::Generated))
    }

    fn write_key_file(&self, protected: &[u8]) -> Result<()> {
        if let Some(parent) = self.key_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&self.key_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = file.metadata()?.permissions();
            permissions.set_mode(0o600);
            fs::set_permissions(&self.key_path, permissions)?;
        }

        file.write_all(protected)?;
        file.sync_all()?;
        Ok(())
    }
}

impl fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvider")
            .field("key_path", &self.key_path)
            .field("protector", &self.protector.name())
            .finish()
    }
}

/// Deterministic key from machine name, user name and a fixed salt.
///
/// Anyone who can read those names can rebuild it; it keeps the store usable
/// where no protection facility exists, nothing more.
pub fn fallback_key() -> EncryptionKey {
    let mut material = String::new();
    if let Ok(hostname) = hostname::get() {
        material.push_str(&hostname.to_string_lossy());
    }
    if let Ok(user) = std::env::var("USER") {
        material.push_str(&user);
    } else if let Ok(user) = std::env::var("USERNAME") {
        material.push_str(&user);
    }
    material.push_str(FALLBACK_SALT);

    let digest: [u8; KEY_SIZE] = Sha256::digest(material.as_bytes()).into();
    EncryptionKey::from_bytes(digest, KeySource::Fallback)
}

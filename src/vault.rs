//! At-rest protection for the account store
//!
//! The whole `Accounts.json` document is sealed as one opaque blob:
//!
//! ```text
//! "GCTV" | version (1 byte) | salt (16 bytes) | nonce (12 bytes) | AES-256-GCM ciphertext
//! ```
//!
//! The AES key is derived from the user's password with Argon2id and the
//! per-file salt. The password itself is never written anywhere; `Settings`
//! only keeps an Argon2 PHC string produced by [`hash_password`] so a
//! password attempt can be checked before decryption is attempted.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{rand_core::OsRng as HashRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{rngs::OsRng, RngCore};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{TraderError, TraderResult};

const MAGIC: &[u8; 4] = b"GCTV";
const VERSION: u8 = 1;

pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const KEY_SIZE: usize = 32;

const HEADER_SIZE: usize = MAGIC.len() + 1 + SALT_SIZE + NONCE_SIZE;

#[derive(Debug, Default, Clone, Copy)]
pub struct CredentialVault;

impl CredentialVault {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt the plaintext file at `path` into a sibling `.enc` file and
    /// remove the plaintext. Returns the path of the vault file.
    pub fn encrypt(&self, password: &str, path: &Path) -> TraderResult<PathBuf> {
        let plaintext = fs::read(path)
            .map_err(|e| TraderError::Crypto(format!("cannot read {}: {}", path.display(), e)))?;

        let vault_path = path.with_extension("enc");
        self.write_sealed(password, &plaintext, &vault_path)?;

        fs::remove_file(path)
            .map_err(|e| TraderError::Crypto(format!("cannot remove {}: {}", path.display(), e)))?;

        info!("🔒 Encrypted {}", vault_path.display());
        Ok(vault_path)
    }

    /// Read and decrypt the vault file at `path`
    pub fn decrypt(&self, password: &str, path: &Path) -> TraderResult<Vec<u8>> {
        let blob = fs::read(path)
            .map_err(|e| TraderError::Crypto(format!("cannot read {}: {}", path.display(), e)))?;
        self.open(password, &blob)
    }

    /// Seal `plaintext` and write it to `dest` through a temporary file
    pub fn write_sealed(&self, password: &str, plaintext: &[u8], dest: &Path) -> TraderResult<()> {
        let blob = self.seal(password, plaintext)?;
        write_atomic(dest, &blob)
            .map_err(|e| TraderError::Crypto(format!("cannot write {}: {}", dest.display(), e)))
    }

    /// Encrypt bytes into the vault blob format
    pub fn seal(&self, password: &str, plaintext: &[u8]) -> TraderResult<Vec<u8>> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let cipher = cipher_for(password, &salt)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| TraderError::Crypto(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        blob.extend_from_slice(MAGIC);
        blob.push(VERSION);
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a vault blob. A wrong password and a tampered file are
    /// indistinguishable; both fail the GCM tag check.
    pub fn open(&self, password: &str, blob: &[u8]) -> TraderResult<Vec<u8>> {
        if blob.len() < HEADER_SIZE || &blob[..MAGIC.len()] != MAGIC {
            return Err(TraderError::Crypto("not a credential vault file".to_string()));
        }
        if blob[MAGIC.len()] != VERSION {
            return Err(TraderError::Crypto(format!(
                "unsupported vault version {}",
                blob[MAGIC.len()]
            )));
        }

        let salt_start = MAGIC.len() + 1;
        let nonce_start = salt_start + SALT_SIZE;
        let salt = &blob[salt_start..nonce_start];
        let nonce = &blob[nonce_start..HEADER_SIZE];

        let cipher = cipher_for(password, salt)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), &blob[HEADER_SIZE..])
            .map_err(|_| TraderError::Crypto("wrong password or corrupt file".to_string()))?;

        debug!("Vault opened ({} bytes)", plaintext.len());
        Ok(plaintext)
    }
}

fn cipher_for(password: &str, salt: &[u8]) -> TraderResult<Aes256Gcm> {
    let mut key = [0u8; KEY_SIZE];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| TraderError::Crypto(format!("key derivation failed: {}", e)))?;

    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| TraderError::Crypto(format!("invalid key: {}", e)))
}

/// Salted Argon2 verifier stored in `Settings.json`
pub fn hash_password(password: &str) -> TraderResult<String> {
    let salt = SaltString::generate(&mut HashRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TraderError::Crypto(format!("password hashing failed: {}", e)))
}

/// Check a password attempt against the stored verifier
pub fn verify_password(password: &str, verifier: &str) -> TraderResult<()> {
    let parsed = PasswordHash::new(verifier)
        .map_err(|_| TraderError::Crypto("stored password verifier is malformed".to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| TraderError::Crypto("wrong password".to_string()))
}

/// Write through `<dest>.tmp` and rename so a crash never leaves a half-written file
pub(crate) fn write_atomic(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, dest)
}

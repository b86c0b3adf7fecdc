// Program settings persisted as Settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::{TraderError, TraderResult};
use crate::vault::{hash_password, verify_password, write_atomic};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub encrypted: bool,
    /// Argon2 verifier of the vault password, empty when encryption is off
    #[serde(default)]
    pub password: String,
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> TraderResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read(path)
            .map_err(|e| TraderError::FileRead(format!("{}: {}", path.display(), e)))?;
        let settings: Settings = serde_json::from_slice(&content)?;

        if settings.encrypted && settings.password.is_empty() {
            warn!("Settings mark the store encrypted but hold no password verifier");
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> TraderResult<()> {
        let content = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &content)
            .map_err(|e| TraderError::FileWrite(format!("{}: {}", path.display(), e)))
    }

    pub fn enable_encryption(&mut self, password: &str) -> TraderResult<()> {
        if password.is_empty() {
            return Err(TraderError::Validation("Password must not be empty.".to_string()));
        }
        self.password = hash_password(password)?;
        self.encrypted = true;
        Ok(())
    }

    pub fn disable_encryption(&mut self) {
        self.encrypted = false;
        self.password.clear();
    }

    /// Confirm a password attempt before it is trusted for decryption
    pub fn check_password(&self, password: &str) -> TraderResult<()> {
        if !self.encrypted {
            return Ok(());
        }
        if self.password.is_empty() {
            return Err(TraderError::Credential(
                "store is encrypted but no password verifier is configured".to_string(),
            ));
        }
        verify_password(password, &self.password)
    }
}

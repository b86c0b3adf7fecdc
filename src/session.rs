//! Application context
//!
//! A [`Session`] is built once at startup and handed by reference to
//! everything that needs accounts, settings or an exchange client. The
//! account store sits behind a lock; mutations are applied to a copy and
//! swapped in only when they succeed and have been persisted, so readers
//! never observe a half-applied change.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

use crate::accounts::{Account, AccountStore};
use crate::clients::ExchangeClient;
use crate::config::AppConfig;
use crate::error::{TraderError, TraderResult};
use crate::settings::Settings;
use crate::signing::SignedRequestBuilder;
use crate::vault::{write_atomic, CredentialVault};

pub struct Session {
    config: AppConfig,
    settings: Settings,
    store: RwLock<AccountStore>,
    vault: CredentialVault,
    password: Option<String>,
    signer: SignedRequestBuilder,
    /// Account file that exists but could not be read; never overwritten
    unreadable: Option<PathBuf>,
}

impl Session {
    /// Load settings and accounts from the configured data directory.
    ///
    /// A missing account file yields an empty store. An unreadable one also
    /// yields an empty store, but the session is then read-only so the file
    /// is not replaced. An encrypted store needs `password`, which is checked
    /// against the settings verifier before decryption.
    pub fn open(config: AppConfig, password: Option<&str>) -> TraderResult<Self> {
        let storage = &config.storage;
        let settings = Settings::load(&storage.settings_path())?;
        let vault = CredentialVault::new();

        let (store, unreadable) = if settings.encrypted {
            let password = password.ok_or_else(|| {
                TraderError::Credential("account store is encrypted; a password is required".to_string())
            })?;
            settings.check_password(password)?;
            Self::load_encrypted(&vault, password, &config)?
        } else {
            Self::load_plain(&config)?
        };

        info!(
            "👤 Loaded {} account(s){}",
            store.len(),
            if settings.encrypted { " from encrypted store" } else { "" }
        );

        Ok(Self {
            config,
            password: if settings.encrypted { password.map(str::to_string) } else { None },
            settings,
            store: RwLock::new(store),
            vault,
            signer: SignedRequestBuilder::new(),
            unreadable,
        })
    }

    fn load_encrypted(
        vault: &CredentialVault,
        password: &str,
        config: &AppConfig,
    ) -> TraderResult<(AccountStore, Option<PathBuf>)> {
        let path = config.storage.vault_path();
        match fs::read(&path) {
            Ok(blob) => Ok((AccountStore::from_json(&vault.open(password, &blob)?)?, None)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("No account vault at {}, starting with no accounts", path.display());
                Ok((AccountStore::new(), None))
            }
            Err(e) => {
                warn!("Cannot read {} ({}), starting read-only with no accounts", path.display(), e);
                Ok((AccountStore::new(), Some(path)))
            }
        }
    }

    fn load_plain(config: &AppConfig) -> TraderResult<(AccountStore, Option<PathBuf>)> {
        let path = config.storage.accounts_path();
        match fs::read(&path) {
            Ok(bytes) => Ok((AccountStore::from_json(&bytes)?, None)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if config.storage.vault_path().exists() {
                    return Err(TraderError::State(
                        "found Accounts.enc but settings say the store is not encrypted".to_string(),
                    ));
                }
                Ok((AccountStore::new(), None))
            }
            Err(e) => {
                warn!("Cannot read {} ({}), starting read-only with no accounts", path.display(), e);
                Ok((AccountStore::new(), Some(path)))
            }
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_encrypted(&self) -> bool {
        self.settings.encrypted
    }

    /// True when the account file could not be read at startup
    pub fn is_read_only(&self) -> bool {
        self.unreadable.is_some()
    }

    /// Exchange client sharing this session's nonce source
    pub fn exchange_client(&self) -> TraderResult<ExchangeClient> {
        ExchangeClient::from_config(&self.config, self.signer.clone())
    }

    pub fn store(&self) -> RwLockReadGuard<'_, AccountStore> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Consistent copy of the last-used account, or a placeholder when
    /// nothing is configured
    pub fn current_account(&self) -> TraderResult<Account> {
        let store = self.store();
        Ok(store.load_default()?.cloned().unwrap_or_else(Account::placeholder))
    }

    /// Apply `f` to a copy of the store, persist it, then publish it
    pub fn with_store_mut<R, F>(&self, f: F) -> TraderResult<R>
    where
        F: FnOnce(&mut AccountStore) -> TraderResult<R>,
    {
        self.ensure_writable()?;
        let mut guard = self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut working = guard.clone();
        let result = f(&mut working)?;
        self.persist(&working)?;
        *guard = working;
        Ok(result)
    }

    pub fn save(&self) -> TraderResult<()> {
        self.ensure_writable()?;
        let store = self.store();
        self.persist(&store)
    }

    fn ensure_writable(&self) -> TraderResult<()> {
        match &self.unreadable {
            Some(path) => Err(TraderError::State(format!(
                "{} could not be read at startup; refusing to overwrite it",
                path.display()
            ))),
            None => Ok(()),
        }
    }

    fn persist(&self, store: &AccountStore) -> TraderResult<()> {
        let json = store.to_json()?;
        let storage = &self.config.storage;

        if self.settings.encrypted {
            let password = self.password.as_deref().ok_or_else(|| {
                TraderError::Credential("session has no vault password".to_string())
            })?;
            self.vault.write_sealed(password, &json, &storage.vault_path())?;
        } else {
            let path = storage.accounts_path();
            write_atomic(&path, &json)
                .map_err(|e| TraderError::FileWrite(format!("{}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    /// Encrypt the account store at rest with `password`.
    ///
    /// Settings are written before the plaintext is sealed and removed; a
    /// failure at any step restores the previous settings and leaves
    /// `Accounts.json` in place.
    pub fn enable_encryption(&mut self, password: &str) -> TraderResult<()> {
        if self.settings.encrypted {
            return Err(TraderError::Validation("The account store is already encrypted.".to_string()));
        }

        let storage = self.config.storage.clone();
        let mut settings = self.settings.clone();
        settings.enable_encryption(password)?;

        self.save()?;
        settings.save(&storage.settings_path())?;

        if let Err(e) = self.vault.encrypt(password, &storage.accounts_path()) {
            self.restore_settings();
            remove_if_present(&storage.vault_path());
            return Err(e);
        }

        self.settings = settings;
        self.password = Some(password.to_string());
        info!("🔒 Account store encryption enabled");
        Ok(())
    }

    /// Store accounts as plain JSON again
    pub fn disable_encryption(&mut self, password: &str) -> TraderResult<()> {
        if !self.settings.encrypted {
            return Err(TraderError::Validation("The account store is not encrypted.".to_string()));
        }
        self.settings.check_password(password)?;
        self.ensure_writable()?;

        let storage = self.config.storage.clone();
        let json = self.store().to_json()?;
        write_atomic(&storage.accounts_path(), &json)
            .map_err(|e| TraderError::FileWrite(e.to_string()))?;

        let mut settings = self.settings.clone();
        settings.disable_encryption();
        if let Err(e) = settings.save(&storage.settings_path()) {
            remove_if_present(&storage.accounts_path());
            return Err(e);
        }

        remove_if_present(&storage.vault_path());

        self.settings = settings;
        self.password = None;
        info!("🔓 Account store encryption disabled");
        Ok(())
    }

    /// Re-seal the vault under `new`. The new vault is staged next to the
    /// old one and only renamed into place after the settings are saved.
    pub fn change_password(&mut self, old: &str, new: &str) -> TraderResult<()> {
        if !self.settings.encrypted {
            return Err(TraderError::Validation("The account store is not encrypted.".to_string()));
        }
        self.settings.check_password(old)?;
        self.ensure_writable()?;

        let storage = self.config.storage.clone();
        let mut settings = self.settings.clone();
        settings.enable_encryption(new)?;

        let vault_path = storage.vault_path();
        let staged = vault_path.with_extension("enc.new");
        let json = self.store().to_json()?;
        self.vault.write_sealed(new, &json, &staged)?;

        if let Err(e) = settings.save(&storage.settings_path()) {
            remove_if_present(&staged);
            return Err(e);
        }

        if let Err(e) = fs::rename(&staged, &vault_path) {
            self.restore_settings();
            remove_if_present(&staged);
            return Err(TraderError::FileWrite(format!("{}: {}", vault_path.display(), e)));
        }

        self.settings = settings;
        self.password = Some(new.to_string());
        info!("🔑 Vault password changed");
        Ok(())
    }

    /// Best-effort rewrite of the in-memory settings after a failed change
    fn restore_settings(&self) {
        let path = self.config.storage.settings_path();
        if let Err(e) = self.settings.save(&path) {
            warn!("Could not restore {}: {}", path.display(), e);
        }
    }
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().display().to_string();
        config
    }

    #[test]
    fn test_fresh_directory_has_placeholder_account() {
        let dir = TempDir::new().unwrap();
        let session = Session::open(config_in(&dir), None).unwrap();
        assert!(session.store().is_empty());
        assert!(session.current_account().unwrap().is_placeholder());
    }

    #[test]
    fn test_failed_mutation_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let session = Session::open(config_in(&dir), None).unwrap();

        session
            .with_store_mut(|store| store.add(Account::new("alice", "k1", "s1")).map(|_| ()))
            .unwrap();
        let before = session.store().clone();

        let result = session.with_store_mut(|store| store.add(Account::new("alice", "k2", "s2")).map(|_| ()));
        assert!(matches!(result, Err(TraderError::Validation(_))));
        assert_eq!(*session.store(), before);
    }

    #[test]
    fn test_orphaned_vault_is_state_error() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::write(config.storage.vault_path(), b"GCTV").unwrap();
        assert!(matches!(Session::open(config, None), Err(TraderError::State(_))));
    }

    #[test]
    fn test_unreadable_account_file_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir(config.storage.accounts_path()).unwrap();

        let session = Session::open(config.clone(), None).unwrap();
        assert!(session.is_read_only());
        assert!(session.store().is_empty());

        let result = session.with_store_mut(|store| store.add(Account::new("alice", "k1", "s1")).map(|_| ()));
        assert!(matches!(result, Err(TraderError::State(_))));
        assert!(session.store().is_empty());
        assert!(config.storage.accounts_path().is_dir());
    }
}

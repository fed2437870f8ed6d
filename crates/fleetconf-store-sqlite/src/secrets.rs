// crates/fleetconf-store-sqlite/src/secrets.rs
// ============================================================================
// Module: SQLite Config Store Secrets
// Description: Encrypted secret storage, retrieval, and key rotation.
// Purpose: Keep secret plaintext out of every table and log line.
// Dependencies: fleetconf-core, rusqlite, zeroize
// ============================================================================

//! ## Overview
//! Secrets are sealed with AES-256-GCM before they reach `SQLite`. The
//! associated data is `service/key`, so a ciphertext copied onto another row
//! fails to open. Each row records the master key id that sealed it, which is
//! what [`SqliteConfigStore::rotate_secrets`] selects on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use fleetconf_core::ConfigStoreError;
use fleetconf_core::MasterKey;
use fleetconf_core::crypto::decrypt_secret;
use fleetconf_core::crypto::encrypt_secret;
use fleetconf_core::time::unix_millis;
use fleetconf_core::validate_service_name;
use rusqlite::OptionalExtension;
use rusqlite::params;
use zeroize::Zeroizing;

use crate::store::SqliteConfigStore;
use crate::store::db_error;

// ============================================================================
// SECTION: Secrets
// ============================================================================

impl SqliteConfigStore {
    /// Encrypts and stores a secret, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Crypto`] when sealing fails, or
    /// [`ConfigStoreError::Storage`] when the write fails.
    pub fn store_secret(
        &self,
        service: &str,
        key: &str,
        plaintext: &str,
        master: &MasterKey,
    ) -> Result<(), ConfigStoreError> {
        validate_service_name(service)?;
        validate_secret_key(key)?;
        let encrypted = encrypt_secret(master, &secret_aad(service, key), plaintext.as_bytes())?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO encrypted_secrets (service, key, encrypted_value, key_id, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(service, key) DO UPDATE SET \
                 encrypted_value = excluded.encrypted_value, key_id = excluded.key_id, \
                 updated_at = excluded.updated_at",
                params![service, key, encrypted, master.key_id(), unix_millis()],
            )
            .map_err(db_error)?;
        drop(guard);
        tracing::debug!(service, key, key_id = master.key_id(), "secret stored");
        Ok(())
    }

    /// Decrypts a stored secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Crypto`] when the row was sealed under a
    /// different key id or fails to open.
    pub fn retrieve_secret(
        &self,
        service: &str,
        key: &str,
        master: &MasterKey,
    ) -> Result<Option<Zeroizing<String>>, ConfigStoreError> {
        let row: Option<(String, String)> = {
            let guard = self.lock()?;
            guard
                .query_row(
                    "SELECT encrypted_value, key_id FROM encrypted_secrets WHERE service = ?1 AND \
                     key = ?2",
                    params![service, key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db_error)?
        };
        let Some((encrypted, key_id)) = row else {
            return Ok(None);
        };
        if key_id != master.key_id() {
            return Err(ConfigStoreError::Crypto(format!(
                "secret {service}/{key} sealed under key id {key_id}"
            )));
        }
        open_secret(master, service, key, &encrypted).map(Some)
    }

    /// Deletes a secret. Returns true when a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the write fails.
    pub fn delete_secret(&self, service: &str, key: &str) -> Result<bool, ConfigStoreError> {
        let guard = self.lock()?;
        let removed = guard
            .execute(
                "DELETE FROM encrypted_secrets WHERE service = ?1 AND key = ?2",
                params![service, key],
            )
            .map_err(db_error)?;
        Ok(removed > 0)
    }

    /// Lists the secret keys stored for `service`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn list_secret_keys(&self, service: &str) -> Result<Vec<String>, ConfigStoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare("SELECT key FROM encrypted_secrets WHERE service = ?1 ORDER BY key")
            .map_err(db_error)?;
        let rows = stmt.query_map(params![service], |row| row.get::<_, String>(0)).map_err(db_error)?;
        let keys = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        Ok(keys)
    }

    /// Re-encrypts every secret sealed under `old` with `new`.
    ///
    /// Runs in one transaction; a single row that fails to open aborts the
    /// whole rotation. Returns the number of rotated rows.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Crypto`] when a row fails to open or seal,
    /// or [`ConfigStoreError::Storage`] when the write fails.
    pub fn rotate_secrets(
        &self,
        old: &MasterKey,
        new: &MasterKey,
    ) -> Result<usize, ConfigStoreError> {
        let now = unix_millis();
        let rotated = {
            let mut guard = self.lock()?;
            let tx = guard.transaction().map_err(db_error)?;
            let rows: Vec<(String, String, String)> = {
                let mut stmt = tx
                    .prepare(
                        "SELECT service, key, encrypted_value FROM encrypted_secrets WHERE key_id \
                         = ?1 ORDER BY service, key",
                    )
                    .map_err(db_error)?;
                let rows = stmt
                    .query_map(params![old.key_id()], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })
                    .map_err(db_error)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?
            };
            for (service, key, encrypted) in &rows {
                let plaintext = open_secret(old, service, key, encrypted)?;
                let sealed =
                    encrypt_secret(new, &secret_aad(service, key), plaintext.as_bytes())?;
                tx.execute(
                    "UPDATE encrypted_secrets SET encrypted_value = ?1, key_id = ?2, updated_at = \
                     ?3 WHERE service = ?4 AND key = ?5",
                    params![sealed, new.key_id(), now, service, key],
                )
                .map_err(db_error)?;
            }
            tx.commit().map_err(db_error)?;
            drop(guard);
            rows.len()
        };
        tracing::info!(
            from_key_id = old.key_id(),
            to_key_id = new.key_id(),
            rotated,
            "secrets rotated"
        );
        Ok(rotated)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Associated data binding a ciphertext to its row.
fn secret_aad(service: &str, key: &str) -> Vec<u8> {
    format!("{service}/{key}").into_bytes()
}

/// Opens a sealed secret into a zeroizing string.
fn open_secret(
    master: &MasterKey,
    service: &str,
    key: &str,
    encrypted: &str,
) -> Result<Zeroizing<String>, ConfigStoreError> {
    let plaintext = decrypt_secret(master, &secret_aad(service, key), encrypted)?;
    let text = String::from_utf8(plaintext.to_vec())
        .map_err(|_| ConfigStoreError::Crypto(format!("secret {service}/{key} is not utf-8")))?;
    Ok(Zeroizing::new(text))
}

/// Validates a secret key name.
fn validate_secret_key(key: &str) -> Result<(), ConfigStoreError> {
    if key.trim().is_empty() {
        return Err(ConfigStoreError::Invalid("secret key must be non-empty".to_string()));
    }
    Ok(())
}

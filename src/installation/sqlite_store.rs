//! SQLite-backed installation storage with tokens encrypted at rest.

use super::{encryption, installation_key, Installation, InstallationStore};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Installation storage backed by SQLite.
///
/// # Schema
/// One row per `(enterprise_id, team_id)`. Absent ids are stored as the
/// empty string, not NULL — SQLite treats NULLs as distinct in UNIQUE
/// constraints, which would break the upsert key. Token columns hold
/// AES-256-GCM blobs (nonce-prefixed, base64); scope sets are stored
/// comma-joined.
///
/// # Thread safety
/// The connection sits behind a `Mutex`; SQLite runs in serialized mode.
/// Concurrent reinstalls of the same key are last-write-wins.
pub struct SqliteInstallationStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl SqliteInstallationStore {
    /// Open (or create) the installation database.
    ///
    /// `encryption_key` is the base64-encoded 32-byte master key used for
    /// token columns.
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open installations database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS installations (
                id INTEGER PRIMARY KEY,
                enterprise_id TEXT NOT NULL DEFAULT '',
                team_id TEXT NOT NULL DEFAULT '',
                app_id TEXT,
                enterprise_name TEXT,
                team_name TEXT,
                bot_token TEXT,
                bot_id TEXT,
                bot_user_id TEXT,
                bot_scopes TEXT NOT NULL DEFAULT '',
                user_id TEXT,
                user_token TEXT,
                user_scopes TEXT NOT NULL DEFAULT '',
                incoming_webhook_url TEXT,
                incoming_webhook_channel TEXT,
                incoming_webhook_channel_id TEXT,
                incoming_webhook_configuration_url TEXT,
                is_enterprise_install INTEGER NOT NULL DEFAULT 0,
                token_type TEXT,
                installed_at TEXT NOT NULL,
                UNIQUE(enterprise_id, team_id)
            )
            "#,
            [],
        )
        .context("Failed to create installations table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_workspace ON installations(enterprise_id, team_id)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    fn encrypt_opt(&self, token: Option<&str>) -> Result<Option<String>> {
        token
            .map(|t| encryption::encrypt(t, &self.encryption_key))
            .transpose()
            .context("Failed to encrypt token")
    }

    fn decrypt_opt(&self, blob: Option<String>) -> Result<Option<String>> {
        blob.map(|b| encryption::decrypt(&b, &self.encryption_key))
            .transpose()
            .context("Failed to decrypt token")
    }
}

impl InstallationStore for SqliteInstallationStore {
    fn save(&self, installation: &Installation) -> Result<()> {
        if installation.enterprise_id.is_none() && installation.team_id.is_none() {
            return Err(anyhow!(
                "Installation requires at least one of enterprise_id, team_id"
            ));
        }

        let bot_token = self.encrypt_opt(installation.bot_token.as_deref())?;
        let user_token = self.encrypt_opt(installation.user_token.as_deref())?;

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO installations (
                    enterprise_id, team_id, app_id,
                    enterprise_name, team_name,
                    bot_token, bot_id, bot_user_id, bot_scopes,
                    user_id, user_token, user_scopes,
                    incoming_webhook_url, incoming_webhook_channel,
                    incoming_webhook_channel_id, incoming_webhook_configuration_url,
                    is_enterprise_install, token_type, installed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                ON CONFLICT(enterprise_id, team_id) DO UPDATE SET
                    app_id = excluded.app_id,
                    enterprise_name = excluded.enterprise_name,
                    team_name = excluded.team_name,
                    bot_token = excluded.bot_token,
                    bot_id = excluded.bot_id,
                    bot_user_id = excluded.bot_user_id,
                    bot_scopes = excluded.bot_scopes,
                    user_id = excluded.user_id,
                    user_token = excluded.user_token,
                    user_scopes = excluded.user_scopes,
                    incoming_webhook_url = excluded.incoming_webhook_url,
                    incoming_webhook_channel = excluded.incoming_webhook_channel,
                    incoming_webhook_channel_id = excluded.incoming_webhook_channel_id,
                    incoming_webhook_configuration_url = excluded.incoming_webhook_configuration_url,
                    is_enterprise_install = excluded.is_enterprise_install,
                    token_type = excluded.token_type,
                    installed_at = excluded.installed_at
                "#,
                params![
                    installation.enterprise_id.as_deref().unwrap_or(""),
                    installation.team_id.as_deref().unwrap_or(""),
                    installation.app_id,
                    installation.enterprise_name,
                    installation.team_name,
                    bot_token,
                    installation.bot_id,
                    installation.bot_user_id,
                    installation.bot_scopes.join(","),
                    installation.user_id,
                    user_token,
                    installation.user_scopes.join(","),
                    installation.incoming_webhook_url,
                    installation.incoming_webhook_channel,
                    installation.incoming_webhook_channel_id,
                    installation.incoming_webhook_configuration_url,
                    installation.is_enterprise_install,
                    installation.token_type,
                    installation.installed_at.to_rfc3339(),
                ],
            )
            .context("Failed to store installation")?;

        tracing::debug!(
            key = %installation.key(),
            "Stored installation"
        );
        Ok(())
    }

    fn find(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
    ) -> Result<Option<Installation>> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                r#"
                SELECT enterprise_id, team_id, app_id,
                       enterprise_name, team_name,
                       bot_token, bot_id, bot_user_id, bot_scopes,
                       user_id, user_token, user_scopes,
                       incoming_webhook_url, incoming_webhook_channel,
                       incoming_webhook_channel_id, incoming_webhook_configuration_url,
                       is_enterprise_install, token_type, installed_at
                FROM installations
                WHERE enterprise_id = ?1 AND team_id = ?2
                "#,
                params![enterprise_id.unwrap_or(""), team_id.unwrap_or("")],
                |row| {
                    Ok(RawRow {
                        enterprise_id: row.get(0)?,
                        team_id: row.get(1)?,
                        app_id: row.get(2)?,
                        enterprise_name: row.get(3)?,
                        team_name: row.get(4)?,
                        bot_token: row.get(5)?,
                        bot_id: row.get(6)?,
                        bot_user_id: row.get(7)?,
                        bot_scopes: row.get(8)?,
                        user_id: row.get(9)?,
                        user_token: row.get(10)?,
                        user_scopes: row.get(11)?,
                        incoming_webhook_url: row.get(12)?,
                        incoming_webhook_channel: row.get(13)?,
                        incoming_webhook_channel_id: row.get(14)?,
                        incoming_webhook_configuration_url: row.get(15)?,
                        is_enterprise_install: row.get(16)?,
                        token_type: row.get(17)?,
                        installed_at: row.get(18)?,
                    })
                },
            )
            .optional()
            .context("Failed to query installation")?;

        let Some(raw) = row else {
            tracing::debug!(
                key = %installation_key(enterprise_id, team_id),
                "No installation found"
            );
            return Ok(None);
        };

        let installed_at = DateTime::parse_from_rfc3339(&raw.installed_at)
            .context("Failed to parse installed_at timestamp")?
            .with_timezone(&Utc);

        Ok(Some(Installation {
            app_id: raw.app_id,
            enterprise_id: non_empty(raw.enterprise_id),
            enterprise_name: raw.enterprise_name,
            team_id: non_empty(raw.team_id),
            team_name: raw.team_name,
            bot_token: self.decrypt_opt(raw.bot_token)?,
            bot_id: raw.bot_id,
            bot_user_id: raw.bot_user_id,
            bot_scopes: split_scopes(&raw.bot_scopes),
            user_id: raw.user_id,
            user_token: self.decrypt_opt(raw.user_token)?,
            user_scopes: split_scopes(&raw.user_scopes),
            incoming_webhook_url: raw.incoming_webhook_url,
            incoming_webhook_channel: raw.incoming_webhook_channel,
            incoming_webhook_channel_id: raw.incoming_webhook_channel_id,
            incoming_webhook_configuration_url: raw.incoming_webhook_configuration_url,
            is_enterprise_install: raw.is_enterprise_install,
            token_type: raw.token_type,
            installed_at,
        }))
    }
}

/// Column values exactly as stored, before decryption and key mapping.
struct RawRow {
    enterprise_id: String,
    team_id: String,
    app_id: Option<String>,
    enterprise_name: Option<String>,
    team_name: Option<String>,
    bot_token: Option<String>,
    bot_id: Option<String>,
    bot_user_id: Option<String>,
    bot_scopes: String,
    user_id: Option<String>,
    user_token: Option<String>,
    user_scopes: String,
    incoming_webhook_url: Option<String>,
    incoming_webhook_channel: Option<String>,
    incoming_webhook_channel_id: Option<String>,
    incoming_webhook_configuration_url: Option<String>,
    is_enterprise_install: bool,
    token_type: Option<String>,
    installed_at: String,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn split_scopes(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::sample_installation;
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn in_memory_store() -> SqliteInstallationStore {
        let key = BASE64.encode([7u8; 32]);
        SqliteInstallationStore::new(":memory:", &key).expect("in-memory store failed")
    }

    #[test]
    fn test_save_and_find_roundtrip() {
        let store = in_memory_store();
        let installation = sample_installation("T123", "xoxb-abc");

        store.save(&installation).unwrap();

        let found = store.find(None, Some("T123")).unwrap().unwrap();
        assert_eq!(found.team_id.as_deref(), Some("T123"));
        assert_eq!(found.bot_token.as_deref(), Some("xoxb-abc"));
        assert_eq!(found.bot_id.as_deref(), Some("B999"));
        assert_eq!(
            found.bot_scopes,
            vec!["app_mentions:read".to_string(), "incoming-webhook".to_string()]
        );
        assert_eq!(found.user_scopes, vec!["im:read".to_string()]);
        assert_eq!(found.installed_at, installation.installed_at);
    }

    #[test]
    fn test_find_missing_returns_none() {
        let store = in_memory_store();
        assert!(store.find(None, Some("T404")).unwrap().is_none());
    }

    #[test]
    fn test_reinstall_fully_replaces() {
        let store = in_memory_store();

        let mut first = sample_installation("T123", "xoxb-old");
        first.incoming_webhook_url = Some("https://hooks.example.com/old".to_string());
        store.save(&first).unwrap();

        // Second install for the same key drops fields the new grant lacks
        let second = sample_installation("T123", "xoxb-new");
        store.save(&second).unwrap();

        let found = store.find(None, Some("T123")).unwrap().unwrap();
        assert_eq!(found.bot_token.as_deref(), Some("xoxb-new"));
        assert!(found.incoming_webhook_url.is_none());
    }

    #[test]
    fn test_enterprise_and_team_keys_are_distinct() {
        let store = in_memory_store();

        let mut enterprise = sample_installation("T123", "xoxb-ent");
        enterprise.enterprise_id = Some("E77".to_string());
        store.save(&enterprise).unwrap();

        store.save(&sample_installation("T123", "xoxb-team")).unwrap();

        let ent = store.find(Some("E77"), Some("T123")).unwrap().unwrap();
        assert_eq!(ent.bot_token.as_deref(), Some("xoxb-ent"));

        let team = store.find(None, Some("T123")).unwrap().unwrap();
        assert_eq!(team.bot_token.as_deref(), Some("xoxb-team"));
    }

    #[test]
    fn test_missing_key_pair_rejected() {
        let store = in_memory_store();

        let mut installation = sample_installation("T123", "xoxb-abc");
        installation.team_id = None;
        installation.enterprise_id = None;

        assert!(store.save(&installation).is_err());
    }

    #[test]
    fn test_tokens_encrypted_at_rest() {
        let store = in_memory_store();
        store.save(&sample_installation("T123", "xoxb-abc")).unwrap();

        let raw: String = store
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT bot_token FROM installations WHERE team_id = 'T123'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_ne!(raw, "xoxb-abc");
        assert!(!raw.contains("xoxb"));
    }

    #[test]
    fn test_webhook_only_install_roundtrip() {
        let store = in_memory_store();

        let mut installation = sample_installation("T123", "ignored");
        installation.bot_token = None;
        installation.bot_id = None;
        installation.bot_user_id = None;
        installation.bot_scopes = vec![];
        installation.incoming_webhook_url = Some("https://hooks.example.com/x".to_string());
        installation.incoming_webhook_channel = Some("#general".to_string());

        store.save(&installation).unwrap();

        let found = store.find(None, Some("T123")).unwrap().unwrap();
        assert!(found.bot_token.is_none());
        assert!(found.bot_scopes.is_empty());
        assert_eq!(
            found.incoming_webhook_url.as_deref(),
            Some("https://hooks.example.com/x")
        );
    }
}

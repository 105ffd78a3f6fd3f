//! Workspace installation records and their storage.
//!
//! One record per `(enterprise_id, team_id)` pair holds everything a
//! workspace granted during OAuth: bot and user tokens, scopes, webhook
//! descriptor, identity names. Reinstalling the same workspace fully
//! replaces the prior record.
//!
//! Two backends implement [`InstallationStore`]: a SQLite store that
//! encrypts tokens at rest ([`SqliteInstallationStore`]) and an in-memory
//! store ([`MemoryInstallationStore`]) for tests and ephemeral deployments.

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

mod encryption;
mod sqlite_store;

pub use encryption::{decrypt, encrypt, validate_key};
pub use sqlite_store::SqliteInstallationStore;

/// A workspace's granted credentials and scopes.
///
/// `enterprise_id` and `team_id` are each optional but at least one is
/// always present; the pair is the stable lookup key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub app_id: Option<String>,
    pub enterprise_id: Option<String>,
    pub enterprise_name: Option<String>,
    pub team_id: Option<String>,
    pub team_name: Option<String>,

    /// Bot access token (`xoxb-`); absent for webhook-only grants
    pub bot_token: Option<String>,
    /// Bot id verified via `auth.test` against the bot token
    pub bot_id: Option<String>,
    pub bot_user_id: Option<String>,
    pub bot_scopes: Vec<String>,

    /// Installing user's identity and grants
    pub user_id: Option<String>,
    pub user_token: Option<String>,
    pub user_scopes: Vec<String>,

    /// Incoming webhook descriptor, when the install granted one
    pub incoming_webhook_url: Option<String>,
    pub incoming_webhook_channel: Option<String>,
    pub incoming_webhook_channel_id: Option<String>,
    pub incoming_webhook_configuration_url: Option<String>,

    pub is_enterprise_install: bool,
    pub token_type: Option<String>,
    pub installed_at: DateTime<Utc>,
}

impl Installation {
    /// Composite lookup key for this record.
    pub fn key(&self) -> String {
        installation_key(self.enterprise_id.as_deref(), self.team_id.as_deref())
    }
}

/// Composite `(enterprise_id, team_id)` key string.
pub fn installation_key(enterprise_id: Option<&str>, team_id: Option<&str>) -> String {
    format!(
        "{}-{}",
        enterprise_id.unwrap_or("none"),
        team_id.unwrap_or("none")
    )
}

/// Storage contract for installation records.
///
/// `save` is a full-replace upsert by `(enterprise_id, team_id)`; `find` is
/// an exact-key lookup. Backends are interchangeable (file, database,
/// memory) as long as both hold.
pub trait InstallationStore: Send + Sync {
    /// Durably upsert the record, overwriting any prior record for the
    /// same key with no merge semantics.
    fn save(&self, installation: &Installation) -> Result<()>;

    /// Exact-key lookup.
    fn find(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
    ) -> Result<Option<Installation>>;
}

/// In-memory installation store.
///
/// Used in tests and single-process ephemeral deployments; nothing
/// survives a restart.
#[derive(Default)]
pub struct MemoryInstallationStore {
    installations: DashMap<String, Installation>,
}

impl MemoryInstallationStore {
    pub fn new() -> Self {
        Self {
            installations: DashMap::new(),
        }
    }

    /// Number of stored records (for tests/monitoring).
    pub fn count(&self) -> usize {
        self.installations.len()
    }
}

impl InstallationStore for MemoryInstallationStore {
    fn save(&self, installation: &Installation) -> Result<()> {
        self.installations
            .insert(installation.key(), installation.clone());
        tracing::debug!(key = %installation.key(), "Stored installation (in-memory)");
        Ok(())
    }

    fn find(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
    ) -> Result<Option<Installation>> {
        let key = installation_key(enterprise_id, team_id);
        Ok(self.installations.get(&key).map(|i| i.clone()))
    }
}

#[cfg(test)]
pub(crate) fn sample_installation(team_id: &str, bot_token: &str) -> Installation {
    Installation {
        app_id: Some("A0001".to_string()),
        enterprise_id: None,
        enterprise_name: None,
        team_id: Some(team_id.to_string()),
        team_name: Some("Acme".to_string()),
        bot_token: Some(bot_token.to_string()),
        bot_id: Some("B999".to_string()),
        bot_user_id: Some("U888".to_string()),
        bot_scopes: vec!["app_mentions:read".to_string(), "incoming-webhook".to_string()],
        user_id: Some("U123".to_string()),
        user_token: Some("xoxp-user".to_string()),
        user_scopes: vec!["im:read".to_string()],
        incoming_webhook_url: None,
        incoming_webhook_channel: None,
        incoming_webhook_channel_id: None,
        incoming_webhook_configuration_url: None,
        is_enterprise_install: false,
        token_type: Some("bot".to_string()),
        installed_at: Utc::now(),
    }
}

//! Slack Web API client.
//!
//! [`SlackApi`] is the narrow capability contract the rest of the app
//! depends on — OAuth code exchange, identity verification, message
//! posting, Socket Mode connection URLs — so tests substitute fakes
//! without network access. [`SlackClient`] is the reqwest implementation.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// `team` / `enterprise` sub-object of an OAuth exchange response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TeamInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// `authed_user` sub-object of an OAuth exchange response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthedUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// `incoming_webhook` sub-object of an OAuth exchange response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct IncomingWebhook {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub configuration_url: Option<String>,
}

/// Successful `oauth.v2.access` payload.
///
/// Every sub-object is optional; a webhook-only grant carries no
/// `access_token` at all. Missing sub-objects must not break assembly.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OAuthV2Access {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub bot_user_id: Option<String>,
    #[serde(default)]
    pub team: Option<TeamInfo>,
    #[serde(default)]
    pub enterprise: Option<TeamInfo>,
    #[serde(default)]
    pub authed_user: Option<AuthedUser>,
    #[serde(default)]
    pub incoming_webhook: Option<IncomingWebhook>,
    #[serde(default)]
    pub is_enterprise_install: Option<bool>,
}

/// `auth.test` identity payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthTest {
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Capability contract for the Slack Web API.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Exchange an authorization code for access credentials.
    ///
    /// `redirect_uri` must equal the value embedded in the authorization
    /// URL; Slack rejects the exchange otherwise.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthV2Access>;

    /// Authenticated self-identification for a bearer token.
    async fn auth_test(&self, token: &str) -> Result<AuthTest>;

    /// Post a message into a channel as the given bot token.
    async fn post_message(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<()>;

    /// Open a Socket Mode connection; returns the WebSocket URL.
    async fn connections_open(&self, app_token: &str) -> Result<String>;
}

/// Reqwest-backed [`SlackApi`] implementation.
///
/// Every call carries the client-level timeout; a timed-out call is a hard
/// failure of that flow instance, never retried here.
pub struct SlackClient {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl SlackClient {
    /// Create a client against the production API base URL.
    pub fn new(client_id: String, client_secret: String, timeout: Duration) -> Result<Self> {
        Self::with_base_url(
            client_id,
            client_secret,
            timeout,
            "https://slack.com/api".to_string(),
        )
    }

    /// Create a client with a custom base URL (tests, mock servers).
    pub fn with_base_url(
        client_id: String,
        client_secret: String,
        timeout: Duration,
        base_url: String,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            client_id,
            client_secret,
        })
    }
}

/// Wire envelope every Slack Web API response uses: `ok` plus either the
/// method payload or an `error` code.
#[derive(Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    payload: Option<T>,
}

fn unwrap_envelope<T>(method: &str, envelope: ApiEnvelope<T>) -> Result<T> {
    if !envelope.ok {
        return Err(anyhow!(
            "slack {} failed: {}",
            method,
            envelope.error.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    envelope
        .payload
        .ok_or_else(|| anyhow!("slack {} returned an empty payload", method))
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthV2Access> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];

        tracing::debug!("Exchanging authorization code");

        let response = self
            .http
            .post(format!("{}/oauth.v2.access", self.base_url))
            .form(&form)
            .send()
            .await
            .context("Failed to send oauth.v2.access request")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "oauth.v2.access failed with status {}",
                response.status()
            ));
        }

        let envelope: ApiEnvelope<OAuthV2Access> = response
            .json()
            .await
            .context("Failed to parse oauth.v2.access response")?;
        unwrap_envelope("oauth.v2.access", envelope)
    }

    async fn auth_test(&self, token: &str) -> Result<AuthTest> {
        let response = self
            .http
            .post(format!("{}/auth.test", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send auth.test request")?;

        if !response.status().is_success() {
            return Err(anyhow!("auth.test failed with status {}", response.status()));
        }

        let envelope: ApiEnvelope<AuthTest> = response
            .json()
            .await
            .context("Failed to parse auth.test response")?;
        unwrap_envelope("auth.test", envelope)
    }

    async fn post_message(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<()> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(blocks) = blocks {
            payload["blocks"] = blocks;
        }

        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .context("Failed to send chat.postMessage request")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat.postMessage failed with status {}",
                response.status()
            ));
        }

        let envelope: ApiEnvelope<Value> = response
            .json()
            .await
            .context("Failed to parse chat.postMessage response")?;
        unwrap_envelope("chat.postMessage", envelope)?;
        Ok(())
    }

    async fn connections_open(&self, app_token: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct OpenPayload {
            #[serde(default)]
            url: Option<String>,
        }

        let response = self
            .http
            .post(format!("{}/apps.connections.open", self.base_url))
            .bearer_auth(app_token)
            .send()
            .await
            .context("Failed to send apps.connections.open request")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "apps.connections.open failed with status {}",
                response.status()
            ));
        }

        let envelope: ApiEnvelope<OpenPayload> = response
            .json()
            .await
            .context("Failed to parse apps.connections.open response")?;
        let payload = unwrap_envelope("apps.connections.open", envelope)?;
        payload
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("apps.connections.open did not return a url"))
    }
}

//! OAuth 2.0 installation flow.
//!
//! Implements the authorization code flow for workspace installs:
//! 1. `GET /slack/install` → page with the authorization URL (fresh state token)
//! 2. User approves on Slack
//! 3. Slack redirects to `GET /slack/oauth/callback?code=&state=`
//! 4. Consume the state token (single-use, time-bounded), exchange the code,
//!    verify the bot token's identity, commit the Installation record
//!
//! Every failure is reported synchronously as a 400 with a readable body;
//! nothing is retried and no partial Installation is ever committed. A
//! failed flow is restarted from `/slack/install`, which issues a fresh
//! state token.

mod authorize_url;
mod state_store;

pub use authorize_url::{AuthorizeUrlGenerator, BOT_SCOPES, USER_SCOPES};
pub use state_store::{run_state_cleanup, StateStore};

use crate::installation::{Installation, InstallationStore};
use crate::slack::{signature, OAuthV2Access, SlackApi};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared application state for the OAuth endpoints.
#[derive(Clone)]
pub struct OAuthAppState {
    pub slack: Arc<dyn SlackApi>,
    pub installation_store: Arc<dyn InstallationStore>,
    pub state_store: StateStore,
    pub authorize_url: AuthorizeUrlGenerator,
    pub signing_secret: String,
}

/// OAuth callback query parameters.
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Terminal failure classes of the callback flow.
///
/// All render as 400 — the HTTP surface defines only 200 and 400 — but each
/// class keeps its own user-facing message.
enum CallbackError {
    /// Provider reported an error (e.g. the user denied the request)
    Authorization(String),
    /// State token unknown, already consumed, or expired
    StateValidation,
    /// Code exchange failed or returned an error payload
    UpstreamExchange,
    /// Bot token identity verification failed (bot scopes are always
    /// requested here, so this aborts the flow)
    IdentityVerification,
    /// Installation write failed after a successful exchange
    Persistence,
    /// Callback carried neither code+state nor error
    MalformedCallback,
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let body = match self {
            CallbackError::Authorization(error) => format!(
                "Something went wrong with the installation (error: {})",
                escape_html(&error)
            ),
            CallbackError::StateValidation => {
                "Try the installation again (the state value is already expired or invalid)"
                    .to_string()
            }
            CallbackError::UpstreamExchange
            | CallbackError::IdentityVerification
            | CallbackError::Persistence => "Installation failed. Please try again.".to_string(),
            CallbackError::MalformedCallback => "Invalid OAuth callback parameters.".to_string(),
        };
        (StatusCode::BAD_REQUEST, Html(body)).into_response()
    }
}

/// Create the OAuth/events router.
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/slack/install", get(oauth_start))
        .route("/slack/oauth/callback", get(oauth_callback))
        .route("/slack/events", post(events_fallback))
        .with_state(Arc::new(state))
}

/// GET / — health check.
async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Scribe is running" }))
}

/// GET /slack/install
///
/// Issues a state token and returns a page whose install link embeds it.
async fn oauth_start(State(state): State<Arc<OAuthAppState>>) -> Html<String> {
    let token = state.state_store.issue();
    let auth_url = state.authorize_url.generate(&token);

    debug!("Issued OAuth state token");

    Html(format!(
        r#"<a href="{}" style="align-items:center;color:#000;background-color:#fff;border:1px solid #ddd;border-radius:4px;display:inline-flex;font-size:16px;font-weight:600;height:48px;justify-content:center;text-decoration:none;width:236px">Add to Slack</a>"#,
        escape_html(&auth_url)
    ))
}

/// GET /slack/oauth/callback
///
/// Validates the state token, exchanges the code, verifies the bot token,
/// and commits the Installation. All failures are terminal; the consumed
/// state token is never revived.
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Html<&'static str>, CallbackError> {
    if let Some(error) = callback.error {
        warn!(error = %error, "OAuth authorization failed");
        return Err(CallbackError::Authorization(error));
    }

    let (Some(code), Some(csrf_state)) = (callback.code, callback.state) else {
        warn!("Malformed OAuth callback");
        return Err(CallbackError::MalformedCallback);
    };

    if !state.state_store.consume(&csrf_state) {
        warn!("OAuth state invalid or expired");
        return Err(CallbackError::StateValidation);
    }

    let redirect_uri = &state.authorize_url.redirect_uri;
    let payload = state
        .slack
        .exchange_code(&code, redirect_uri)
        .await
        .map_err(|e| {
            error!(error = %e, "Token exchange failed");
            CallbackError::UpstreamExchange
        })?;

    // Webhook-only grants carry no bot token; those commit with bot_id
    // absent. When a bot token exists it must verify, since bot scopes
    // are part of every authorization request this app issues.
    let bot_id = match &payload.access_token {
        Some(bot_token) => {
            let auth = state.slack.auth_test(bot_token).await.map_err(|e| {
                error!(error = %e, "Bot token identity verification failed");
                CallbackError::IdentityVerification
            })?;
            let bot_id = auth.bot_id.ok_or_else(|| {
                error!("auth.test succeeded but returned no bot_id");
                CallbackError::IdentityVerification
            })?;
            Some(bot_id)
        }
        None => None,
    };

    let installation = build_installation(&payload, bot_id);

    state
        .installation_store
        .save(&installation)
        .map_err(|e| {
            error!(error = %e, "Failed to persist installation");
            CallbackError::Persistence
        })?;

    info!(
        team_id = ?installation.team_id,
        enterprise_id = ?installation.enterprise_id,
        "Installation committed"
    );

    Ok(Html("Thanks for installing Scribe!"))
}

/// POST /slack/events
///
/// HTTP events fallback. Socket Mode is the event path; this endpoint
/// exists for Slack's URL verification handshake and rejects anything not
/// signed with the app's signing secret.
async fn events_fallback(
    State(state): State<Arc<OAuthAppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let timestamp = headers
        .get("X-Slack-Request-Timestamp")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let sig = headers
        .get("X-Slack-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !signature::verify(&state.signing_secret, timestamp, &body, sig) {
        warn!("Rejected events request: invalid signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    if payload["type"].as_str() == Some("url_verification") {
        let challenge = payload["challenge"].as_str().unwrap_or_default();
        return Json(json!({ "challenge": challenge })).into_response();
    }

    StatusCode::OK.into_response()
}

/// Assemble an Installation from an exchange payload and the verified bot
/// id. Missing sub-objects are treated as empty, never as an error.
fn build_installation(payload: &OAuthV2Access, bot_id: Option<String>) -> Installation {
    let enterprise = payload.enterprise.clone().unwrap_or_default();
    let team = payload.team.clone().unwrap_or_default();
    let installer = payload.authed_user.clone().unwrap_or_default();
    let webhook = payload.incoming_webhook.clone().unwrap_or_default();

    Installation {
        app_id: payload.app_id.clone(),
        enterprise_id: enterprise.id,
        enterprise_name: enterprise.name,
        team_id: team.id,
        team_name: team.name,
        bot_token: payload.access_token.clone(),
        bot_id,
        bot_user_id: payload.bot_user_id.clone(),
        bot_scopes: split_scope(payload.scope.as_deref()),
        user_id: installer.id,
        user_token: installer.access_token,
        user_scopes: split_scope(installer.scope.as_deref()),
        incoming_webhook_url: webhook.url,
        incoming_webhook_channel: webhook.channel,
        incoming_webhook_channel_id: webhook.channel_id,
        incoming_webhook_configuration_url: webhook.configuration_url,
        is_enterprise_install: payload.is_enterprise_install.unwrap_or(false),
        token_type: payload.token_type.clone(),
        installed_at: Utc::now(),
    }
}

fn split_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Minimal HTML escaping for values interpolated into response bodies.
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

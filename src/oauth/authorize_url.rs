//! Authorization URL construction.

/// Builds Slack `v2/authorize` consent URLs.
///
/// The redirect URI embedded here must exactly match the value later sent
/// to the token endpoint; Slack enforces the equality.
#[derive(Clone, Debug)]
pub struct AuthorizeUrlGenerator {
    pub client_id: String,
    pub bot_scopes: Vec<String>,
    pub user_scopes: Vec<String>,
    pub redirect_uri: String,
}

/// Bot-level scopes requested on every install.
pub const BOT_SCOPES: &[&str] = &["app_mentions:read", "assistant:write", "incoming-webhook"];

/// User-level scopes requested on every install.
pub const USER_SCOPES: &[&str] = &["im:read"];

impl AuthorizeUrlGenerator {
    /// Create a generator with the fixed scope sets this app requests.
    pub fn new(client_id: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            bot_scopes: BOT_SCOPES.iter().map(|s| s.to_string()).collect(),
            user_scopes: USER_SCOPES.iter().map(|s| s.to_string()).collect(),
            redirect_uri,
        }
    }

    /// Build the consent URL carrying the given state token.
    pub fn generate(&self, state: &str) -> String {
        let scope = self.bot_scopes.join(",");
        let user_scope = self.user_scopes.join(",");
        format!(
            "https://slack.com/oauth/v2/authorize?client_id={}&scope={}&user_scope={}&redirect_uri={}&state={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&scope),
            urlencoding::encode(&user_scope),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state)
        )
    }
}

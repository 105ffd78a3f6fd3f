//! Bot business logic: slash commands and app mentions.
//!
//! Handlers resolve the workspace's installation to pick the outbound bot
//! token, then reply into the originating channel. Failures here are
//! logged and dropped — a bad event must never tear down the gateway.

use crate::ai::TextGenerator;
use crate::installation::InstallationStore;
use crate::meetings::{MeetingField, MeetingStore};
use crate::slack::{AppMention, EventHandler, SlackApi, SlashCommand};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Event handler wired to the shared stores and clients.
pub struct BotHandler {
    slack: Arc<dyn SlackApi>,
    ai: Arc<dyn TextGenerator>,
    installations: Arc<dyn InstallationStore>,
    meetings: Arc<MeetingStore>,
    /// Development fallback when a team has no installation record
    default_bot_token: String,
}

impl BotHandler {
    pub fn new(
        slack: Arc<dyn SlackApi>,
        ai: Arc<dyn TextGenerator>,
        installations: Arc<dyn InstallationStore>,
        meetings: Arc<MeetingStore>,
        default_bot_token: String,
    ) -> Self {
        Self {
            slack,
            ai,
            installations,
            meetings,
            default_bot_token,
        }
    }

    /// Pick the bot token for a workspace from its installation record,
    /// falling back to the configured development token.
    fn resolve_bot_token(&self, enterprise_id: Option<&str>, team_id: Option<&str>) -> String {
        match self.installations.find(enterprise_id, team_id) {
            Ok(Some(installation)) => {
                if let Some(token) = installation.bot_token {
                    debug!(team_id = ?team_id, "Resolved installation bot token");
                    return token;
                }
                warn!(team_id = ?team_id, "Installation has no bot token, using default");
                self.default_bot_token.clone()
            }
            Ok(None) => {
                warn!(team_id = ?team_id, "No installation found, using default bot token");
                self.default_bot_token.clone()
            }
            Err(e) => {
                error!(team_id = ?team_id, error = %e, "Installation lookup failed, using default bot token");
                self.default_bot_token.clone()
            }
        }
    }
}

/// Map a slash command to the meeting field it reads and its reply title.
fn command_info(command: &str) -> Option<(MeetingField, &'static str)> {
    match command {
        "/lastmeetingsummary" => Some((MeetingField::Summary, "Latest Meeting Summary")),
        "/lastmeetingtodo" => Some((MeetingField::Todo, "Latest Meeting To-Do Items")),
        "/lastmeetinguserstory" => Some((MeetingField::UserStories, "Latest Meeting User Stories")),
        _ => None,
    }
}

/// Build the reply text for a slash command against the meeting store.
fn slash_command_reply(command: &str, meetings: &MeetingStore) -> String {
    match command_info(command) {
        Some((field, title)) => match meetings.latest_field(field) {
            Some(content) => format!("*{}:*\n{}", title, content),
            None => "No meeting data found yet. Add some meeting data first!".to_string(),
        },
        None => "Unknown slash command.".to_string(),
    }
}

/// Strip the bot's own mention tag from an event text.
fn strip_mention(text: &str, bot_user_id: &str) -> String {
    text.replace(&format!("<@{}>", bot_user_id), "")
        .trim()
        .to_string()
}

fn section_block(text: &str) -> Value {
    json!([{
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    }])
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn on_slash_command(&self, command: SlashCommand) {
        let token =
            self.resolve_bot_token(command.enterprise_id.as_deref(), Some(&command.team_id));

        let reply = slash_command_reply(&command.command, &self.meetings);

        if let Err(e) = self
            .slack
            .post_message(
                &token,
                &command.channel_id,
                &reply,
                Some(section_block(&reply)),
            )
            .await
        {
            error!(
                channel_id = %command.channel_id,
                error = %e,
                "Failed to post slash command reply"
            );
        }
    }

    async fn on_app_mention(&self, mention: AppMention) {
        let token =
            self.resolve_bot_token(mention.enterprise_id.as_deref(), mention.team_id.as_deref());

        // The mention tag carries the bot's user id for this workspace;
        // auth.test against the resolved token tells us which one to strip.
        let clean_text = match self.slack.auth_test(&token).await {
            Ok(auth) => match auth.user_id {
                Some(bot_user_id) => strip_mention(&mention.text, &bot_user_id),
                None => mention.text.trim().to_string(),
            },
            Err(e) => {
                warn!(error = %e, "auth.test failed, leaving mention text as-is");
                mention.text.trim().to_string()
            }
        };

        let reply = if clean_text.is_empty() {
            format!(
                "Hello <@{}>! What can I help you with today? Please provide some text after mentioning me.",
                mention.user
            )
        } else {
            match self.ai.generate(&clean_text).await {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "AI generation failed");
                    "Sorry, I couldn't get a response from the AI service at the moment."
                        .to_string()
                }
            }
        };

        if let Err(e) = self
            .slack
            .post_message(&token, &mention.channel, &reply, None)
            .await
        {
            error!(channel = %mention.channel, error = %e, "Failed to post mention reply");
        }
    }
}

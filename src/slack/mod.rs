//! Slack integration: Web API client, Socket Mode gateway, request
//! signatures.

mod client;
pub mod signature;
mod socket_mode;

pub use client::{
    AuthTest, AuthedUser, IncomingWebhook, OAuthV2Access, SlackApi, SlackClient, TeamInfo,
};
pub use socket_mode::{AppMention, EventHandler, SlashCommand, SocketModeGateway};

// AI text generation client
pub mod ai;

// Slash command and mention handlers
pub mod bot;

// Environment credentials and tunables
pub mod config;

// Workspace installation records and storage
pub mod installation;

// Meeting-notes store
pub mod meetings;

// OAuth installation flow
pub mod oauth;

// Slack Web API client, Socket Mode gateway, request signatures
pub mod slack;

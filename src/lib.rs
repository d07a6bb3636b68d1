//! mailhook: relays mail received over SMTP to a chat-platform webhook.

pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod smtp;
pub mod sniff;
pub mod webhook;

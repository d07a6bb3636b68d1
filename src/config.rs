//! Process configuration from CLI flags and environment variables.

use clap::Parser;

/// Relays mail received over SMTP to a chat-platform webhook.
///
/// Every flag can also come from the environment; a flag on the command
/// line wins.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Webhook URL to deliver messages to.
    #[arg(env = "WEBHOOK", value_name = "URL")]
    pub webhook: reqwest::Url,

    /// Address to listen on.
    #[arg(short, long, env = "BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 25)]
    pub port: u16,

    /// Attach a dump of the message headers as headers.txt.
    #[arg(
        short = 'H',
        long = "headers",
        env = "SEND_HEADERS",
        value_parser = clap::builder::FalseyValueParser::new(),
    )]
    pub send_headers: bool,

    /// Sniffing command for parts without a declared content type.
    #[arg(short, long = "file-cmd", env = "FILE_COMMAND", default_value = "file")]
    pub file_command: String,

    /// Attach the raw original message as message.eml.
    #[arg(
        short,
        long,
        env = "ATTACH",
        value_parser = clap::builder::FalseyValueParser::new(),
    )]
    pub attach: bool,
}

impl Config {
    /// Socket address string for the SMTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

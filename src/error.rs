//! Error types for mailhook.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Sniff error: {0}")]
    Sniff(#[from] SniffError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),
}

/// SMTP intake errors.
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline errors for a single mail transaction.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Message could not be parsed ({size} bytes)")]
    Unparseable { size: usize },

    #[error("Sniff error: {0}")]
    Sniff(#[from] SniffError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),
}

/// Content-sniffing errors.
#[derive(Debug, thiserror::Error)]
pub enum SniffError {
    #[error("Sniffing tool '{command}' not found")]
    Unavailable { command: String },

    #[error("Sniffing tool '{command}' failed with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("IO error running '{command}': {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
}

/// Webhook delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

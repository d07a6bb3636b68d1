//! Relay pipeline: from a completed SMTP transaction to a webhook delivery.

pub mod payload;
pub mod resolve;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::message::{self, ParsedMail};
use crate::sniff::TypeSniffer;
use crate::webhook::{PlatformMessage, WebhookClient};
use payload::{WebhookPayload, build_payload};
use resolve::resolve_leaves;

/// SMTP transaction data captured by intake.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Remote socket address of the submitting client.
    pub peer: SocketAddr,
    /// Reverse path; empty for a null sender (`MAIL FROM:<>`).
    pub mail_from: String,
    /// Forward paths, one per accepted RCPT.
    pub rcpt_to: Vec<String>,
}

/// A completed SMTP transaction handed to the mail handler.
#[derive(Debug, Clone)]
pub struct ReceivedMail {
    /// Transaction id, generated at receipt, used in logs.
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub envelope: Envelope,
    /// Raw message bytes as received, before trace headers are stamped.
    pub data: Vec<u8>,
}

impl ReceivedMail {
    pub fn new(envelope: Envelope, data: Vec<u8>) -> ReceivedMail {
        ReceivedMail {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            envelope,
            data,
        }
    }
}

/// Capability invoked once per completed SMTP transaction. The SMTP reply
/// for the transaction reflects the returned result.
#[async_trait]
pub trait MailHandler: Send + Sync {
    async fn handle(&self, mail: ReceivedMail) -> Result<Option<PlatformMessage>>;
}

/// Pipeline toggles, straight from the CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayOptions {
    /// Attach a `headers.txt` dump of the root headers.
    pub send_headers: bool,
    /// Attach the stamped original message as `message.eml`.
    pub attach_original: bool,
    /// Ask the platform to echo the created message and record it.
    pub wait: bool,
}

/// The production [`MailHandler`]: stamps, parses, resolves and posts each
/// received message to the configured webhook.
pub struct RelayHandler {
    client: WebhookClient,
    sniffer: Arc<dyn TypeSniffer>,
    options: RelayOptions,
    responses: Mutex<Vec<PlatformMessage>>,
}

impl RelayHandler {
    pub fn new(
        client: WebhookClient,
        sniffer: Arc<dyn TypeSniffer>,
        options: RelayOptions,
    ) -> RelayHandler {
        RelayHandler {
            client,
            sniffer,
            options,
            responses: Mutex::new(Vec::new()),
        }
    }

    /// Builds the webhook payload for one received message without sending
    /// it: stamps the envelope trace headers, parses the result, resolves
    /// every leaf and assembles the ordered fields.
    async fn assemble(&self, mail: &ReceivedMail) -> Result<WebhookPayload> {
        let peer = mail.envelope.peer.to_string();
        let stamped = message::stamp_trace_headers(
            &mail.data,
            &peer,
            &mail.envelope.mail_from,
            &mail.envelope.rcpt_to,
        );
        let parsed = ParsedMail::parse(stamped).ok_or(RelayError::Unparseable {
            size: mail.data.len(),
        })?;
        let leaves = parsed.root.leaves();
        let attachments = resolve_leaves(&leaves, self.sniffer.as_ref())
            .await
            .map_err(RelayError::Sniff)?;
        Ok(build_payload(
            &parsed.headers,
            &attachments,
            &parsed.raw,
            self.options.send_headers,
            self.options.attach_original,
        ))
    }

    /// Platform echoes recorded so far (wait mode only), oldest first.
    pub fn responses(&self) -> Vec<PlatformMessage> {
        self.responses.lock().unwrap().clone()
    }

    pub fn clear_responses(&self) {
        self.responses.lock().unwrap().clear();
    }
}

#[async_trait]
impl MailHandler for RelayHandler {
    async fn handle(&self, mail: ReceivedMail) -> Result<Option<PlatformMessage>> {
        let started = Instant::now();
        let payload = self.assemble(&mail).await?;
        let fields = payload.parts.len();
        let response = self
            .client
            .send(&payload, self.options.wait)
            .await
            .map_err(RelayError::Webhook)?;
        if let Some(echo) = &response {
            self.responses.lock().unwrap().push(echo.clone());
        }
        info!(
            "relayed mail {} from {} ({fields} fields, {}ms)",
            mail.id,
            mail.envelope.peer,
            started.elapsed().as_millis(),
        );
        Ok(response)
    }
}

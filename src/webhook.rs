//! Multipart delivery to the chat platform's webhook endpoint.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::WebhookError;
use crate::relay::payload::{PayloadPart, WebhookPayload};

/// The platform's JSON echo of a delivered message, returned when the POST
/// asked to wait for creation.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformMessage {
    /// Platform-assigned message id, when the echo carries one.
    #[serde(default)]
    pub id: Option<String>,
    /// Everything else the platform included.
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

/// Client bound to a single webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookClient {
    pub fn new(url: reqwest::Url) -> WebhookClient {
        WebhookClient {
            http: reqwest::Client::new(),
            url,
        }
    }

    /// Posts the payload as `multipart/form-data`. With `wait` the platform
    /// echoes the created message, which is parsed and returned. Non-success
    /// statuses are delivery failures; there is no retry.
    pub async fn send(
        &self,
        payload: &WebhookPayload,
        wait: bool,
    ) -> Result<Option<PlatformMessage>, WebhookError> {
        let mut form = Form::new();
        for part in &payload.parts {
            form = form.part(part.name.clone(), to_multipart(part)?);
        }

        let response = self
            .http
            .post(self.url.clone())
            .query(&[("wait", wait)])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Status { status, body });
        }
        if wait {
            Ok(Some(response.json().await?))
        } else {
            Ok(None)
        }
    }

    /// Deletes a previously delivered message
    /// (`DELETE <webhook>/messages/{id}`).
    pub async fn delete_message(&self, id: &str) -> Result<(), WebhookError> {
        let response = self
            .http
            .delete(format!("{}/messages/{id}", self.url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Status { status, body });
        }
        Ok(())
    }
}

fn to_multipart(part: &PayloadPart) -> Result<Part, WebhookError> {
    let mut multipart = Part::bytes(part.data.clone());
    if let Some(file_name) = &part.file_name {
        multipart = multipart.file_name(file_name.clone());
    }
    if let Some(media_type) = &part.media_type {
        multipart = multipart.mime_str(media_type)?;
    }
    Ok(multipart)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_with_id_deserializes() {
        let echo: PlatformMessage =
            serde_json::from_str(r#"{"id":"123","channel_id":"9","content":"hi"}"#).unwrap();
        assert_eq!(echo.id.as_deref(), Some("123"));
        assert_eq!(echo.rest["channel_id"], "9");
    }

    #[test]
    fn echo_without_id_still_deserializes() {
        let echo: PlatformMessage = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(echo.id, None);
        assert_eq!(echo.rest["status"], "queued");
    }
}

//! Reqwest-backed push notifier.
//!
//! This adapter owns transport details only: payload serialisation, timeout
//! handling and mapping push service replies onto [`PushOutcome`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::domain::ports::{PushNotification, PushNotifier, PushNotifierError, PushOutcome};

const INVALID_TOKEN_CODES: [&str; 2] = ["INVALID_TOKEN", "DeviceNotRegistered"];

/// Where and how to reach the push service.
#[derive(Clone)]
pub struct PushEndpoint {
    /// URL receiving `POST` requests.
    pub url: Url,
    /// Optional bearer key for the push service.
    pub api_key: Option<Zeroizing<String>>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// [`PushNotifier`] posting JSON to an HTTP push service.
pub struct HttpPushNotifier {
    client: Client,
    url: Url,
    api_key: Option<Zeroizing<String>>,
}

impl HttpPushNotifier {
    /// Build the notifier.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: PushEndpoint) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(endpoint.timeout).build()?;
        Ok(Self {
            client,
            url: endpoint.url,
            api_key: endpoint.api_key,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRequestDto<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: PushDataDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushDataDto {
    #[serde(rename = "type")]
    kind: &'static str,
    message_id: String,
    sender_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct PushReplyDto {
    #[serde(default)]
    error: Option<String>,
}

impl<'a> From<&'a PushNotification> for PushRequestDto<'a> {
    fn from(notification: &'a PushNotification) -> Self {
        Self {
            to: notification.device_token.as_str(),
            title: notification.sender_name.as_str(),
            body: notification.preview.as_str(),
            data: PushDataDto {
                kind: "NEW_MESSAGE",
                message_id: notification.message_id.to_string(),
                sender_id: notification.sender_id.to_string(),
            },
        }
    }
}

#[async_trait]
impl PushNotifier for HttpPushNotifier {
    async fn notify_new_message(
        &self,
        notification: &PushNotification,
    ) -> Result<PushOutcome, PushNotifierError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .json(&PushRequestDto::from(notification));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|err| PushNotifierError::transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| PushNotifierError::transport(err.to_string()))?;
        classify_reply(status, body.as_ref())
    }
}

fn classify_reply(status: StatusCode, body: &[u8]) -> Result<PushOutcome, PushNotifierError> {
    if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
        return Ok(PushOutcome::InvalidToken);
    }
    let reply: PushReplyDto = serde_json::from_slice(body).unwrap_or_default();
    let invalid_token = reply
        .error
        .as_deref()
        .is_some_and(|code| INVALID_TOKEN_CODES.contains(&code));
    if invalid_token {
        return Ok(PushOutcome::InvalidToken);
    }
    if status.is_success() {
        return Ok(PushOutcome::Delivered);
    }
    Err(PushNotifierError::rejected(
        status.as_u16(),
        String::from_utf8_lossy(body).chars().take(160).collect::<String>(),
    ))
}

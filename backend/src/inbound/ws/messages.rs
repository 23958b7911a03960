//! Wire-level frame definitions for the WebSocket adapter.
//!
//! Every frame is `{"event": NAME, "data": {...}, "requestId"?: string}`.
//! Client frames are decoded into [`ClientSignal`]s; server frames are either
//! a domain [`GatewayEvent`] written verbatim or a [`ControlFrame`] answering
//! a client request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{
    CommandReply, Error, GatewayCommand, MessageId, SendOutcome, SendRequest, UserId,
};

/// Envelope of every client frame.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    /// Event name such as `authenticate` or `NEW_MESSAGE`.
    pub event: String,
    /// Event payload; absent for argument-less events.
    #[serde(default)]
    pub data: Value,
    /// Correlates the server's `ACK` with this frame.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Decoded client intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSignal {
    /// Handshake carrying the asserted identity and bearer credential.
    Authenticate {
        /// Identity the client claims.
        user_id: String,
        /// Bearer credential proving it.
        token: String,
    },
    /// Any post-handshake command.
    Command(GatewayCommand),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateData {
    #[serde(default)]
    user_id: String,
    #[serde(default, alias = "credential")]
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMessageData {
    receiver_id: UserId,
    content: String,
    #[serde(default)]
    correlation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingData {
    receiver_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRefData {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditData {
    message_id: MessageId,
    content: String,
}

impl ClientFrame {
    /// Decode the payload for the named event.
    pub fn signal(&self) -> Result<ClientSignal, Error> {
        let command = match self.event.as_str() {
            "authenticate" => {
                let data: AuthenticateData = if self.data.is_null() {
                    AuthenticateData::default()
                } else {
                    self.payload()?
                };
                return Ok(ClientSignal::Authenticate {
                    user_id: data.user_id,
                    token: data.token,
                });
            }
            "NEW_MESSAGE" => {
                let data: NewMessageData = self.payload()?;
                GatewayCommand::SendMessage(SendRequest {
                    receiver_id: data.receiver_id,
                    content: data.content,
                    correlation_id: data.correlation_id,
                })
            }
            "TYPING_START" => {
                let data: TypingData = self.payload()?;
                GatewayCommand::TypingStart {
                    receiver_id: data.receiver_id,
                }
            }
            "TYPING_STOP" => {
                let data: TypingData = self.payload()?;
                GatewayCommand::TypingStop {
                    receiver_id: data.receiver_id,
                }
            }
            "MESSAGE_READ" => {
                let data: MessageRefData = self.payload()?;
                GatewayCommand::MarkRead {
                    message_id: data.message_id,
                }
            }
            "EDIT_MESSAGE" => {
                let data: EditData = self.payload()?;
                GatewayCommand::Edit {
                    message_id: data.message_id,
                    content: data.content,
                }
            }
            "DELETE_MESSAGE" => {
                let data: MessageRefData = self.payload()?;
                GatewayCommand::Delete {
                    message_id: data.message_id,
                }
            }
            "GET_ONLINE_USERS" => GatewayCommand::GetOnlineUsers,
            "HEALTH_CHECK" => GatewayCommand::HealthCheck,
            other => {
                return Err(Error::invalid_request(format!("unknown event {other:?}")));
            }
        };
        Ok(ClientSignal::Command(command))
    }

    fn payload<T: DeserializeOwned>(&self) -> Result<T, Error> {
        T::deserialize(&self.data).map_err(|err| {
            Error::invalid_request(format!("invalid {} payload: {err}", self.event))
        })
    }
}

/// Server frames that answer a client frame rather than report an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlFrame {
    /// Result for a frame that carried a `requestId`.
    Ack(AckPayload),
    /// Failure for a frame without a `requestId`.
    Error(ErrorPayload),
    /// Answer to `GET_ONLINE_USERS` sent without a `requestId`.
    OnlineUsers(Value),
    /// Answer to `HEALTH_CHECK` sent without a `requestId`.
    HealthStatus(Value),
}

/// Body of an `ACK` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    /// Echo of the client's `requestId`.
    pub request_id: String,
    /// Whether the command succeeded.
    pub success: bool,
    /// Result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

/// Body of an `ERROR` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Event the failure relates to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// The failure.
    #[serde(flatten)]
    pub error: Error,
}

impl ControlFrame {
    /// Successful `ACK`.
    pub fn ack(request_id: String, data: Value) -> Self {
        Self::Ack(AckPayload {
            request_id,
            success: true,
            data: Some(data),
            error: None,
        })
    }

    /// Failed `ACK`.
    pub fn nack(request_id: String, error: Error) -> Self {
        Self::Ack(AckPayload {
            request_id,
            success: false,
            data: None,
            error: Some(error),
        })
    }

    /// `ERROR` frame, optionally naming the offending event.
    pub fn error(event: Option<String>, error: Error) -> Self {
        Self::Error(ErrorPayload { event, error })
    }

    /// Frame answering a command result: an `ACK` when the client asked for
    /// one, otherwise an `ERROR` on failure. Without a `requestId`, queries
    /// still get their answer frame while other commands succeed silently.
    pub fn for_result(
        request_id: Option<String>,
        event: &str,
        result: Result<Value, Error>,
    ) -> Option<Self> {
        match (request_id, result) {
            (Some(id), Ok(data)) => Some(Self::ack(id, data)),
            (Some(id), Err(error)) => Some(Self::nack(id, error)),
            (None, Ok(data)) => Self::query_answer(event, data),
            (None, Err(error)) => Some(Self::error(Some(event.to_owned()), error)),
        }
    }

    fn query_answer(event: &str, data: Value) -> Option<Self> {
        match event {
            "GET_ONLINE_USERS" => Some(Self::OnlineUsers(data)),
            "HEALTH_CHECK" => Some(Self::HealthStatus(data)),
            _ => None,
        }
    }
}

/// JSON body of an `ACK` for a successful command.
pub fn reply_data(reply: CommandReply) -> Result<Value, serde_json::Error> {
    Ok(match reply {
        CommandReply::Sent(SendOutcome::Delivered {
            message,
            correlation_id,
        }) => json!({
            "messageId": message.id,
            "correlationId": correlation_id.as_str(),
            "createdAt": message.created_at,
            "duplicate": false,
            "message": serde_json::to_value(&message)?,
        }),
        CommandReply::Sent(SendOutcome::Duplicate {
            message_id,
            correlation_id,
        }) => json!({
            "messageId": message_id,
            "correlationId": correlation_id.as_str(),
            "duplicate": true,
        }),
        CommandReply::Typing { is_typing } => json!({ "isTyping": is_typing }),
        CommandReply::Receipt(receipt) => serde_json::to_value(receipt)?,
        CommandReply::Edited(message) | CommandReply::Deleted(message) => {
            serde_json::to_value(message)?
        }
        CommandReply::OnlineUsers(users) => json!({
            "count": users.len(),
            "users": users,
        }),
        CommandReply::Health(report) => serde_json::to_value(report)?,
    })
}

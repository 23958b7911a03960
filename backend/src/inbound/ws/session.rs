//! Per-connection WebSocket task.
//!
//! A connection first has to authenticate within the configured timeout.
//! Once bound to an identity it is registered with the gateway and the task
//! multiplexes three sources: heartbeat ticks, inbound client frames and the
//! outbound command channel fed by the registry. Inbound frames are handled
//! strictly one after another.

use std::sync::Arc;
use std::time::Duration;

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::time::{self, Instant};
use tracing::{Instrument, Span, debug, field, info, info_span, warn};

use crate::domain::{
    ConnectionCommand, ConnectionHandle, ConnectionId, ConnectionReceiver, DisconnectReason,
    Error, Gateway, GatewayEvent, UserId,
};
use crate::inbound::ws::messages::{ClientFrame, ClientSignal, ControlFrame, reply_data};

pub(super) async fn handle_ws_session(
    gateway: Arc<Gateway>,
    session: Session,
    stream: MessageStream,
) {
    let (handle, outbound) = ConnectionHandle::channel();
    let span = info_span!(
        "ws_connection",
        connection_id = %handle.id(),
        user_id = field::Empty
    );
    WsSession::new(gateway)
        .run(session, stream, handle, outbound)
        .instrument(span)
        .await;
}

enum SessionError {
    ClientClosed(Option<CloseReason>),
    StreamClosed,
    HeartbeatTimeout,
    Protocol(ProtocolError),
    AuthenticationFailed(Error),
    Evicted(DisconnectReason),
    Unregistered,
    Network(Closed),
}

enum CloseAction {
    None,
    Close(Option<CloseReason>),
}

/// Outcome of decoding one text frame.
enum Inbound {
    Signal {
        request_id: Option<String>,
        event: String,
        signal: ClientSignal,
    },
    Rejected(ControlFrame),
}

struct WsSession {
    gateway: Arc<Gateway>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn new(gateway: Arc<Gateway>) -> Self {
        let heartbeat_interval = gateway.config().heartbeat_interval;
        Self {
            gateway,
            heartbeat_interval,
            client_timeout: heartbeat_interval * 2,
        }
    }

    async fn run(
        &self,
        mut session: Session,
        mut stream: MessageStream,
        handle: ConnectionHandle,
        mut outbound: ConnectionReceiver,
    ) {
        let connection = handle.id();
        let user = match self.authenticate(&mut session, &mut stream).await {
            Ok(user) => user,
            Err(error) => {
                self.finish(session, error).await;
                return;
            }
        };
        Span::current().record("user_id", field::display(user));

        let welcome = GatewayEvent::ConnectionSuccess {
            user_id: user,
            connection_id: *connection.as_uuid(),
        };
        if let Err(error) = send_json(&mut session, &welcome).await {
            self.finish(session, SessionError::Network(error)).await;
            return;
        }
        self.gateway.connect(user, handle).await;
        info!("connection authenticated");

        let error = self
            .serve(&mut session, &mut stream, &mut outbound, user, connection)
            .await;
        self.gateway.disconnect(&user, connection).await;
        self.finish(session, error).await;
    }

    async fn authenticate(
        &self,
        session: &mut Session,
        stream: &mut MessageStream,
    ) -> Result<UserId, SessionError> {
        let deadline = Instant::now() + self.gateway.config().auth_timeout;
        loop {
            let Ok(message) = time::timeout_at(deadline, stream.recv()).await else {
                return Err(SessionError::AuthenticationFailed(
                    Error::authentication_failed("authentication timed out"),
                ));
            };
            let Some(message) = message else {
                return Err(SessionError::StreamClosed);
            };
            match message.map_err(SessionError::Protocol)? {
                Message::Ping(payload) => {
                    session.pong(&payload).await.map_err(SessionError::Network)?;
                }
                Message::Text(text) => match decode(text.as_ref()) {
                    Inbound::Signal {
                        signal: ClientSignal::Authenticate { user_id, token },
                        ..
                    } => {
                        return self
                            .gateway
                            .authenticate(&user_id, &token)
                            .map_err(SessionError::AuthenticationFailed);
                    }
                    Inbound::Signal {
                        request_id, event, ..
                    } => {
                        debug!(event = %event, "command before authentication");
                        let reply = ControlFrame::for_result(
                            request_id,
                            &event,
                            Err(Error::not_authenticated()),
                        );
                        send_control(session, reply).await?;
                    }
                    Inbound::Rejected(frame) => send_control(session, Some(frame)).await?,
                },
                Message::Close(reason) => return Err(SessionError::ClientClosed(reason)),
                Message::Pong(_) | Message::Binary(_) | Message::Continuation(_) | Message::Nop => {}
            }
        }
    }

    async fn serve(
        &self,
        session: &mut Session,
        stream: &mut MessageStream,
        outbound: &mut ConnectionReceiver,
        user: UserId,
        connection: ConnectionId,
    ) -> SessionError {
        let mut last_heartbeat = Instant::now();
        let mut heartbeat = time::interval(self.heartbeat_interval);
        // The first tick completes immediately.
        heartbeat.tick().await;

        loop {
            let result = tokio::select! {
                _ = heartbeat.tick() => {
                    self.handle_heartbeat_tick(session, &last_heartbeat).await
                }
                message = stream.recv() => {
                    self.handle_stream_message(session, &mut last_heartbeat, user, connection, message)
                        .await
                }
                command = outbound.recv() => self.handle_outbound(session, command).await,
            };
            if let Err(error) = result {
                return error;
            }
        }
    }

    async fn handle_heartbeat_tick(
        &self,
        session: &mut Session,
        last_heartbeat: &Instant,
    ) -> Result<(), SessionError> {
        if Instant::now().duration_since(*last_heartbeat) > self.client_timeout {
            return Err(SessionError::HeartbeatTimeout);
        }
        session.ping(b"").await.map_err(SessionError::Network)
    }

    async fn handle_stream_message(
        &self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        user: UserId,
        connection: ConnectionId,
        message: Option<Result<Message, ProtocolError>>,
    ) -> Result<(), SessionError> {
        let Some(message) = message else {
            return Err(SessionError::StreamClosed);
        };
        let message = message.map_err(SessionError::Protocol)?;
        *last_heartbeat = Instant::now();
        match message {
            Message::Ping(payload) => session.pong(&payload).await.map_err(SessionError::Network),
            Message::Text(text) => {
                self.gateway.touch(&user, connection);
                self.handle_text_message(session, user, text.as_ref()).await
            }
            Message::Pong(_) | Message::Binary(_) | Message::Continuation(_) | Message::Nop => Ok(()),
            Message::Close(reason) => Err(SessionError::ClientClosed(reason)),
        }
    }

    async fn handle_text_message(
        &self,
        session: &mut Session,
        user: UserId,
        text: &str,
    ) -> Result<(), SessionError> {
        let reply = match decode(text) {
            Inbound::Rejected(frame) => Some(frame),
            Inbound::Signal {
                request_id,
                event,
                signal: ClientSignal::Authenticate { .. },
            } => ControlFrame::for_result(
                request_id,
                &event,
                Err(Error::invalid_request("connection is already authenticated")),
            ),
            Inbound::Signal {
                request_id,
                event,
                signal: ClientSignal::Command(command),
            } => {
                let result = self.gateway.handle(user, command).await.and_then(|reply| {
                    reply_data(reply)
                        .map_err(|err| Error::internal(format!("failed to encode reply: {err}")))
                });
                if let Err(error) = &result {
                    debug!(event = %event, code = %error.code(), "command rejected");
                }
                ControlFrame::for_result(request_id, &event, result)
            }
        };
        send_control(session, reply).await
    }

    async fn handle_outbound(
        &self,
        session: &mut Session,
        command: Option<ConnectionCommand>,
    ) -> Result<(), SessionError> {
        match command {
            Some(ConnectionCommand::Deliver(event)) => send_json(session, &event)
                .await
                .map_err(SessionError::Network),
            Some(ConnectionCommand::Disconnect(reason)) => {
                send_json(session, &GatewayEvent::ForceDisconnect { reason })
                    .await
                    .map_err(SessionError::Network)?;
                Err(SessionError::Evicted(reason))
            }
            None => Err(SessionError::Unregistered),
        }
    }

    async fn finish(&self, mut session: Session, error: SessionError) {
        self.log_shutdown_reason(&error);
        if let SessionError::AuthenticationFailed(failure) = &error {
            let rejection = GatewayEvent::ConnectionError {
                code: failure.code(),
                message: failure.message().to_owned(),
            };
            if let Err(closed) = send_json(&mut session, &rejection).await {
                debug!(error = %closed, "client left before the handshake rejection");
                return;
            }
        }
        if let CloseAction::Close(reason) = close_action_for(error) {
            if let Err(closed) = session.close(reason).await {
                warn!(error = %closed, "failed to close WebSocket session");
            }
        }
    }

    fn log_shutdown_reason(&self, error: &SessionError) {
        match error {
            SessionError::HeartbeatTimeout => {
                warn!("WebSocket heartbeat timeout; closing connection");
            }
            SessionError::Protocol(error) => {
                warn!(error = %error, "WebSocket protocol error");
            }
            SessionError::Network(error) => {
                warn!(error = %error, "WebSocket send failed; closing connection");
            }
            SessionError::AuthenticationFailed(error) => {
                warn!(reason = error.message(), "authentication failed");
            }
            SessionError::Evicted(reason) => {
                info!(?reason, "connection closed by the gateway");
            }
            SessionError::ClientClosed(_)
            | SessionError::StreamClosed
            | SessionError::Unregistered => {
                debug!("connection closed");
            }
        }
    }
}

fn close_action_for(error: SessionError) -> CloseAction {
    let close = |code, description: &str| {
        CloseAction::Close(Some(CloseReason {
            code,
            description: Some(description.to_owned()),
        }))
    };
    match error {
        SessionError::HeartbeatTimeout => close(CloseCode::Normal, "heartbeat timeout"),
        SessionError::Protocol(_) => close(CloseCode::Protocol, "protocol error"),
        SessionError::AuthenticationFailed(_) => close(CloseCode::Policy, "authentication failed"),
        SessionError::Evicted(DisconnectReason::NewerSession) => {
            close(CloseCode::Policy, "newer_session")
        }
        SessionError::Evicted(DisconnectReason::Inactivity) => {
            close(CloseCode::Normal, "inactivity")
        }
        SessionError::Unregistered => close(CloseCode::Normal, "unregistered"),
        SessionError::ClientClosed(reason) => CloseAction::Close(reason),
        SessionError::StreamClosed | SessionError::Network(_) => CloseAction::None,
    }
}

fn decode(text: &str) -> Inbound {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(error = %err, "malformed client frame");
            return Inbound::Rejected(ControlFrame::error(
                None,
                Error::invalid_request("frames must be JSON objects with an event name"),
            ));
        }
    };
    match frame.signal() {
        Ok(signal) => Inbound::Signal {
            request_id: frame.request_id,
            event: frame.event,
            signal,
        },
        Err(error) => Inbound::Rejected(match frame.request_id {
            Some(id) => ControlFrame::nack(id, error),
            None => ControlFrame::error(Some(frame.event), error),
        }),
    }
}

async fn send_control(
    session: &mut Session,
    frame: Option<ControlFrame>,
) -> Result<(), SessionError> {
    match frame {
        Some(frame) => send_json(session, &frame)
            .await
            .map_err(SessionError::Network),
        None => Ok(()),
    }
}

async fn send_json<T: serde::Serialize>(session: &mut Session, payload: &T) -> Result<(), Closed> {
    match serde_json::to_string(payload) {
        Ok(body) => session.text(body).await,
        Err(error) => {
            warn!(error = %error, "failed to serialise WebSocket payload");
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

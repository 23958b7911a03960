//! WebSocket session handler tests.

use super::*;
use crate::domain::GatewayConfig;
use crate::inbound::ws;
use crate::inbound::ws::state::{AllowedOrigins, WsState};
use crate::test_support::{GatewayHarness, StaticCredentialVerifier};
use actix_web::{App, HttpServer, dev::Server, http::header};
use awc::{BoxedSocket, ws::Codec, ws::Frame, ws::Message as ClientMessage};
use futures_util::{SinkExt, StreamExt};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

type Socket = actix_codec::Framed<BoxedSocket, Codec>;

struct TestServer {
    url: String,
    harness: GatewayHarness,
}

fn start_ws_server(config: GatewayConfig) -> (TestServer, Server) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let harness = GatewayHarness::with_config(config);
    let ws_state = WsState::new(
        harness.gateway.clone(),
        AllowedOrigins::parse(["http://localhost:3000"]).expect("valid origin"),
    );
    let server = HttpServer::new(move || {
        App::new()
            .app_data(actix_web::web::Data::new(ws_state.clone()))
            .service(ws::ws_entry)
    })
    .listen(listener)
    .expect("bind test server")
    .disable_signals()
    .run();
    let url = format!("http://{addr}");
    (TestServer { url, harness }, server)
}

#[fixture]
async fn running_server() -> TestServer {
    start_with(GatewayConfig::default())
}

fn start_with(config: GatewayConfig) -> TestServer {
    let (server, handle) = start_ws_server(config);
    actix_web::rt::spawn(handle);
    server
}

async fn open_socket(server: &TestServer) -> Socket {
    let (_resp, socket) = awc::Client::default()
        .ws(format!("{}/ws", server.url))
        .set_header(header::ORIGIN, "http://localhost:3000")
        .connect()
        .await
        .expect("websocket connect");
    socket
}

async fn send(socket: &mut Socket, frame: Value) {
    socket
        .send(ClientMessage::Text(frame.to_string().into()))
        .await
        .expect("send text");
}

async fn next_frame(socket: &mut Socket) -> Frame {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame before timeout")
            .expect("response frame")
            .expect("frame");
        match frame {
            Frame::Ping(_) | Frame::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    match next_frame(socket).await {
        Frame::Text(bytes) => serde_json::from_slice(&bytes).expect("json"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

/// Skip frames until one with the given event name arrives.
async fn next_event(socket: &mut Socket, event: &str) -> Value {
    loop {
        let value = next_json(socket).await;
        if value["event"] == event {
            return value;
        }
    }
}

async fn expect_close(socket: &mut Socket) -> Option<actix_ws::CloseReason> {
    loop {
        match next_frame(socket).await {
            Frame::Close(reason) => return reason,
            Frame::Text(_) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

async fn authenticated(server: &TestServer, user: &UserId) -> Socket {
    let mut socket = open_socket(server).await;
    send(
        &mut socket,
        json!({
            "event": "authenticate",
            "data": {
                "userId": user.to_string(),
                "token": StaticCredentialVerifier::token_for(user),
            }
        }),
    )
    .await;
    let welcome = next_json(&mut socket).await;
    assert_eq!(welcome["event"], "CONNECTION_SUCCESS");
    socket
}

#[rstest]
#[actix_rt::test]
async fn authenticate_binds_identity(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut socket = open_socket(&running_server).await;
    send(
        &mut socket,
        json!({
            "event": "authenticate",
            "data": {
                "userId": alice.to_string(),
                "token": StaticCredentialVerifier::token_for(&alice),
            }
        }),
    )
    .await;

    let welcome = next_json(&mut socket).await;
    assert_eq!(welcome["event"], "CONNECTION_SUCCESS");
    assert_eq!(welcome["data"]["userId"], alice.to_string());
    assert!(welcome["data"]["connectionId"].is_string());
}

#[rstest]
#[case(json!({"userId": "", "token": ""}))]
#[case(json!({"userId": UserId::random().to_string(), "token": "garbage"}))]
#[case(json!({"userId": UserId::random().to_string(), "token": "expired"}))]
#[actix_rt::test]
async fn rejected_credentials_close_with_policy(
    #[future] running_server: TestServer,
    #[case] data: Value,
) {
    let running_server = running_server.await;
    let mut socket = open_socket(&running_server).await;
    send(&mut socket, json!({"event": "authenticate", "data": data})).await;

    let rejection = next_json(&mut socket).await;
    assert_eq!(rejection["event"], "CONNECTION_ERROR");
    assert_eq!(rejection["data"]["code"], "authentication_failed");
    let reason = expect_close(&mut socket).await.expect("close reason");
    assert_eq!(reason.code, CloseCode::Policy);
}

#[rstest]
#[actix_rt::test]
async fn credential_subject_is_bound_over_asserted_identity(
    #[future] running_server: TestServer,
) {
    let running_server = running_server.await;
    let (alice, bob) = running_server.harness.connected_pair();
    let mut socket = open_socket(&running_server).await;
    send(
        &mut socket,
        json!({
            "event": "authenticate",
            "data": {
                "userId": alice.to_string(),
                "token": StaticCredentialVerifier::token_for(&bob),
            }
        }),
    )
    .await;

    let welcome = next_json(&mut socket).await;
    assert_eq!(welcome["event"], "CONNECTION_SUCCESS");
    assert_eq!(welcome["data"]["userId"], bob.to_string());
}

#[rstest]
#[actix_rt::test]
async fn commands_before_authentication_are_refused(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut socket = open_socket(&running_server).await;
    send(
        &mut socket,
        json!({"event": "GET_ONLINE_USERS", "requestId": "r-1"}),
    )
    .await;

    let ack = next_json(&mut socket).await;
    assert_eq!(ack["event"], "ACK");
    assert_eq!(ack["data"]["requestId"], "r-1");
    assert_eq!(ack["data"]["success"], false);
    assert_eq!(ack["data"]["error"]["code"], "not_authenticated");

    // The connection is still usable for the handshake.
    send(
        &mut socket,
        json!({
            "event": "authenticate",
            "data": {
                "userId": alice.to_string(),
                "token": StaticCredentialVerifier::token_for(&alice),
            }
        }),
    )
    .await;
    assert_eq!(next_json(&mut socket).await["event"], "CONNECTION_SUCCESS");
}

#[rstest]
#[actix_rt::test]
async fn queries_without_request_id_are_answered(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut socket = authenticated(&running_server, &alice).await;

    send(&mut socket, json!({"event": "GET_ONLINE_USERS"})).await;
    let online = next_event(&mut socket, "ONLINE_USERS").await;
    assert_eq!(online["data"]["count"], 1);
    assert_eq!(online["data"]["users"], json!([alice.to_string()]));

    send(&mut socket, json!({"event": "HEALTH_CHECK"})).await;
    let health = next_event(&mut socket, "HEALTH_STATUS").await;
    assert!(health["data"].is_object());
}

#[rstest]
#[actix_rt::test]
async fn malformed_json_gets_error_frame(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut socket = authenticated(&running_server, &alice).await;
    socket
        .send(ClientMessage::Text("not-json".into()))
        .await
        .expect("send text");

    let error = next_json(&mut socket).await;
    assert_eq!(error["event"], "ERROR");
    assert_eq!(error["data"]["code"], "invalid_request");

    send(
        &mut socket,
        json!({"event": "HEALTH_CHECK", "requestId": "h-1"}),
    )
    .await;
    let ack = next_event(&mut socket, "ACK").await;
    assert_eq!(ack["data"]["success"], true);
}

#[rstest]
#[actix_rt::test]
async fn unknown_event_is_rejected_with_event_name(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut socket = authenticated(&running_server, &alice).await;
    send(&mut socket, json!({"event": "SUMMON_DRAGON"})).await;

    let error = next_json(&mut socket).await;
    assert_eq!(error["event"], "ERROR");
    assert_eq!(error["data"]["event"], "SUMMON_DRAGON");
}

#[rstest]
#[actix_rt::test]
async fn second_authenticate_is_refused(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut socket = authenticated(&running_server, &alice).await;
    send(
        &mut socket,
        json!({
            "event": "authenticate",
            "requestId": "again",
            "data": {"userId": alice.to_string(), "token": "whatever"}
        }),
    )
    .await;

    let ack = next_event(&mut socket, "ACK").await;
    assert_eq!(ack["data"]["success"], false);
    assert_eq!(ack["data"]["error"]["code"], "invalid_request");
}

#[rstest]
#[actix_rt::test]
async fn message_reaches_connected_receiver() {
    let server = start_with(GatewayConfig::default());
    let (alice, bob) = server.harness.connected_pair();
    let mut alice_socket = authenticated(&server, &alice).await;
    let mut bob_socket = authenticated(&server, &bob).await;

    send(
        &mut alice_socket,
        json!({
            "event": "NEW_MESSAGE",
            "requestId": "send-1",
            "data": {
                "receiverId": bob.to_string(),
                "content": "hello there",
                "correlationId": "c-1",
            }
        }),
    )
    .await;

    let ack = next_event(&mut alice_socket, "ACK").await;
    assert_eq!(ack["data"]["success"], true);
    assert_eq!(ack["data"]["data"]["duplicate"], false);
    assert_eq!(ack["data"]["data"]["correlationId"], "c-1");

    let delivered = next_event(&mut bob_socket, "NEW_MESSAGE").await;
    assert_eq!(delivered["data"]["content"], "hello there");
    assert_eq!(delivered["data"]["senderId"], alice.to_string());
    assert_eq!(delivered["data"]["id"], ack["data"]["data"]["messageId"]);
    assert_eq!(server.harness.messages.len(), 1);
}

#[rstest]
#[actix_rt::test]
async fn newer_session_evicts_older_connection(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut first = authenticated(&running_server, &alice).await;
    let _second = authenticated(&running_server, &alice).await;

    let notice = next_event(&mut first, "FORCE_DISCONNECT").await;
    assert_eq!(notice["data"]["reason"], "newer_session");
    let reason = expect_close(&mut first).await.expect("close reason");
    assert_eq!(reason.code, CloseCode::Policy);
    assert!(running_server.harness.gateway.registry().is_registered(&alice));
}

#[rstest]
#[actix_rt::test]
async fn handshake_times_out() {
    let server = start_with(GatewayConfig {
        auth_timeout: Duration::from_millis(100),
        ..GatewayConfig::default()
    });
    let mut socket = open_socket(&server).await;

    let rejection = next_json(&mut socket).await;
    assert_eq!(rejection["event"], "CONNECTION_ERROR");
    assert_eq!(rejection["data"]["code"], "authentication_failed");
    let reason = expect_close(&mut socket).await.expect("close reason");
    assert_eq!(reason.code, CloseCode::Policy);
}

#[rstest]
#[actix_rt::test]
async fn closing_socket_unregisters_connection(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let (alice, _) = running_server.harness.connected_pair();
    let mut socket = authenticated(&running_server, &alice).await;
    assert!(running_server.harness.gateway.registry().is_registered(&alice));

    socket
        .send(ClientMessage::Close(None))
        .await
        .expect("send close");

    let unregistered = tokio::time::timeout(Duration::from_secs(2), async {
        while running_server.harness.gateway.registry().is_registered(&alice) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(unregistered.is_ok(), "registry entry removed after close");
}

#[rstest]
#[actix_rt::test]
async fn rejects_disallowed_origin_before_upgrade(#[future] running_server: TestServer) {
    let running_server = running_server.await;
    let result = awc::Client::default()
        .ws(format!("{}/ws", running_server.url))
        .set_header(header::ORIGIN, "http://evil.example")
        .connect()
        .await;
    match result {
        Err(awc::error::WsClientError::InvalidResponseStatus(status)) => {
            assert_eq!(status, actix_web::http::StatusCode::FORBIDDEN);
        }
        Err(other) => panic!("unexpected client error: {other}"),
        Ok(_) => panic!("upgrade should be refused"),
    }
}

#[rstest]
fn close_reasons_match_shutdown_causes() {
    let action = close_action_for(SessionError::Evicted(DisconnectReason::Inactivity));
    let CloseAction::Close(Some(reason)) = action else {
        panic!("inactivity closes with a reason");
    };
    assert_eq!(reason.code, CloseCode::Normal);
    assert_eq!(reason.description.as_deref(), Some("inactivity"));

    assert!(matches!(
        close_action_for(SessionError::StreamClosed),
        CloseAction::None
    ));
}

#[rstest]
#[case("{}", None)]
#[case(r#"{"event":"NEW_MESSAGE","data":{}}"#, Some("NEW_MESSAGE"))]
fn decode_rejects_bad_frames(#[case] raw: &str, #[case] event: Option<&str>) {
    match decode(raw) {
        Inbound::Rejected(ControlFrame::Error(payload)) => {
            assert_eq!(payload.event.as_deref(), event);
        }
        Inbound::Rejected(other) => panic!("unexpected frame {other:?}"),
        Inbound::Signal { .. } => panic!("frame should be rejected"),
    }
}

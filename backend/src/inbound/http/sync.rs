//! Reconnection catch-up endpoint.
//!
//! ```text
//! GET /api/v1/messages/sync?since=2026-03-01T12:00:00Z
//! Authorization: Bearer <jwt>
//! ```

use actix_web::{get, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Error, SyncedMessage};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::BearerIdentity;
use crate::inbound::http::state::HttpState;

/// Query string for `GET /api/v1/messages/sync`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SyncQuery {
    /// RFC 3339 timestamp of the newest message the client holds.
    #[param(example = "2026-03-01T12:00:00Z")]
    pub since: Option<String>,
}

/// Messages missed while disconnected.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Messages created strictly after `since`, oldest first.
    pub messages: Vec<SyncedMessage>,
    /// Number of messages returned.
    pub count: usize,
}

fn parse_since(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, Error> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|err| {
            Error::invalid_request("since must be an RFC 3339 timestamp")
                .with_details(json!({ "field": "since", "reason": err.to_string() }))
        })
}

/// Fetch every message involving the caller created after `since`.
#[utoipa::path(
    get,
    path = "/api/v1/messages/sync",
    params(SyncQuery),
    responses(
        (status = 200, description = "Missed messages", body = SyncResponse),
        (status = 400, description = "Invalid timestamp", body = Error),
        (status = 401, description = "Missing or invalid bearer credential", body = Error),
        (status = 503, description = "Message store unavailable", body = Error)
    ),
    tags = ["messages"],
    operation_id = "syncMessages"
)]
#[get("/messages/sync")]
pub async fn sync_messages(
    state: web::Data<HttpState>,
    identity: BearerIdentity,
    query: web::Query<SyncQuery>,
) -> ApiResult<web::Json<SyncResponse>> {
    let since = parse_since(query.since.as_deref())?;
    let messages = state.sync.sync(&identity.user_id(), since).await?;
    Ok(web::Json(SyncResponse {
        count: messages.len(),
        messages,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{MessageRepository, MessageSync};
    use crate::domain::{
        AuthenticationService, MessageContent, MessageId, NewMessage, SyncService, UserId,
    };
    use crate::test_support::{GatewayHarness, StaticCredentialVerifier};
    use actix_web::http::{StatusCode, header::AUTHORIZATION};
    use actix_web::{App, test as actix_test};
    use chrono::TimeDelta;
    use mockable::Clock;
    use rstest::rstest;
    use serde_json::Value;
    use std::sync::Arc;

    fn state_for(harness: &GatewayHarness) -> HttpState {
        let sync: Arc<dyn MessageSync> = Arc::new(SyncService::new(harness.messages.clone()));
        HttpState::new(
            AuthenticationService::new(Arc::new(StaticCredentialVerifier)),
            sync,
            harness.gateway.clone(),
        )
    }

    async fn seed(harness: &GatewayHarness, sender: UserId, receiver: UserId, offset_secs: i64) {
        let message = NewMessage {
            id: MessageId::random(),
            sender_id: sender,
            receiver_id: receiver,
            content: MessageContent::new(format!("at {offset_secs}")).expect("valid content"),
            created_at: harness.clock.utc() + TimeDelta::seconds(offset_secs),
        };
        harness.messages.create(&message).await.expect("seeded");
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some(""), true)]
    #[case(Some("2026-03-01T12:00:00+01:00"), true)]
    #[case(Some("yesterday"), false)]
    fn since_parsing(#[case] raw: Option<&str>, #[case] ok: bool) {
        assert_eq!(parse_since(raw).is_ok(), ok);
    }

    #[rstest]
    #[actix_web::test]
    async fn returns_messages_after_since_in_order() {
        let harness = GatewayHarness::new();
        let (alice, bob) = harness.connected_pair();
        seed(&harness, alice, bob, 10).await;
        seed(&harness, bob, alice, 30).await;
        seed(&harness, alice, bob, 20).await;
        seed(&harness, UserId::random(), bob, 40).await;
        let since = (harness.clock.utc() + TimeDelta::seconds(10)).to_rfc3339();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state_for(&harness)))
                .service(web::scope("/api/v1").service(sync_messages)),
        )
        .await;
        let req = actix_test::TestRequest::get()
            .uri(&format!(
                "/api/v1/messages/sync?since={}",
                since.replace('+', "%2B")
            ))
            .insert_header((
                AUTHORIZATION,
                format!("Bearer {}", StaticCredentialVerifier::token_for(&alice)),
            ))
            .to_request();
        let res = actix_test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["messages"][0]["content"], "at 20");
        assert_eq!(body["messages"][1]["content"], "at 30");
        assert!(body["messages"][0]["readReceipts"].is_array());
    }

    #[rstest]
    #[case(None, StatusCode::UNAUTHORIZED)]
    #[case(Some("Bearer expired"), StatusCode::UNAUTHORIZED)]
    #[case(Some("Basic dXNlcjpwYXNz"), StatusCode::UNAUTHORIZED)]
    #[actix_web::test]
    async fn rejects_missing_or_bad_credentials(
        #[case] header: Option<&str>,
        #[case] status: StatusCode,
    ) {
        let harness = GatewayHarness::new();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state_for(&harness)))
                .service(web::scope("/api/v1").service(sync_messages)),
        )
        .await;
        let mut req = actix_test::TestRequest::get().uri("/api/v1/messages/sync");
        if let Some(value) = header {
            req = req.insert_header((AUTHORIZATION, value));
        }
        let res = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(res.status(), status);
    }

    #[rstest]
    #[actix_web::test]
    async fn rejects_unparsable_since() {
        let harness = GatewayHarness::new();
        let user = UserId::random();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state_for(&harness)))
                .service(web::scope("/api/v1").service(sync_messages)),
        )
        .await;
        let req = actix_test::TestRequest::get()
            .uri("/api/v1/messages/sync?since=last-tuesday")
            .insert_header((
                AUTHORIZATION,
                format!("Bearer {}", StaticCredentialVerifier::token_for(&user)),
            ))
            .to_request();
        let res = actix_test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["details"]["field"], "since");
    }
}

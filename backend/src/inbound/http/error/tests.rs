//! Tests for HTTP error mapping.

use super::*;
use actix_web::body::to_bytes;
use rstest::rstest;
use serde_json::{Value, json};
use std::time::Duration;

#[rstest]
#[case(Error::invalid_request("bad"), StatusCode::BAD_REQUEST)]
#[case(Error::authentication_failed("no"), StatusCode::UNAUTHORIZED)]
#[case(Error::not_authenticated(), StatusCode::UNAUTHORIZED)]
#[case(Error::forbidden("denied"), StatusCode::FORBIDDEN)]
#[case(Error::not_found("missing"), StatusCode::NOT_FOUND)]
#[case(Error::rate_limited(Duration::from_secs(3)), StatusCode::TOO_MANY_REQUESTS)]
#[case(Error::service_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE)]
#[case(Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR)]
fn status_code_matches_error_code(#[case] error: Error, #[case] status: StatusCode) {
    assert_eq!(ResponseError::status_code(&error), status);
}

async fn body_of(response: HttpResponse) -> Value {
    let bytes = to_bytes(response.into_body())
        .await
        .expect("reading response body succeeds");
    serde_json::from_slice(&bytes).expect("error JSON")
}

#[rstest]
#[actix_web::test]
async fn internal_errors_are_redacted() {
    let error = Error::internal("pool exhausted at 10.0.0.3").with_details(json!({"secret": "x"}));
    let body = body_of(ResponseError::error_response(&error)).await;

    assert_eq!(body["code"], "internal_error");
    assert_eq!(body["message"], "Internal server error");
    assert!(body.get("details").is_none());
}

#[rstest]
#[actix_web::test]
async fn client_errors_keep_message_and_details() {
    let error = Error::invalid_request("bad since").with_details(json!({"field": "since"}));
    let body = body_of(ResponseError::error_response(&error)).await;

    assert_eq!(body["message"], "bad since");
    assert_eq!(body["details"]["field"], "since");
}

#[rstest]
fn rate_limited_responses_carry_retry_after() {
    let response = ResponseError::error_response(&Error::rate_limited(Duration::from_millis(2500)));
    let header = response
        .headers()
        .get(header::RETRY_AFTER)
        .expect("Retry-After header");
    assert_eq!(header.to_str().expect("ascii"), "3");
}

#[rstest]
fn unauthorised_responses_challenge_for_bearer() {
    let response = ResponseError::error_response(&Error::authentication_failed("expired"));
    assert_eq!(
        response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok()),
        Some("Bearer")
    );
}

//! HTTP response building helpers
//!
//! Every error body has the shape `{"error": "<message>"}`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::RoadmapError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn message(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found(msg: &str) -> Response<Full<Bytes>> {
    message(StatusCode::NOT_FOUND, msg)
}

pub fn bad_request(msg: &str) -> Response<Full<Bytes>> {
    message(StatusCode::BAD_REQUEST, msg)
}

/// HTTP status for a service error
pub fn status_for(error: &RoadmapError) -> StatusCode {
    match error {
        RoadmapError::NotFound(_) => StatusCode::NOT_FOUND,
        RoadmapError::Conflict(_) => StatusCode::CONFLICT,
        RoadmapError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
        RoadmapError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        RoadmapError::Forbidden(_) => StatusCode::FORBIDDEN,
        RoadmapError::InvalidInput(_) | RoadmapError::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a RoadmapError to an appropriate HTTP response
///
/// Server-side failures are logged and reported without internal detail.
pub fn error_response(err: RoadmapError) -> Response<Full<Bytes>> {
    let status = status_for(&err);
    let msg = match &err {
        RoadmapError::NotFound(m)
        | RoadmapError::Conflict(m)
        | RoadmapError::PreconditionFailed(m)
        | RoadmapError::Unauthorized(m)
        | RoadmapError::Forbidden(m)
        | RoadmapError::InvalidInput(m) => m.clone(),
        RoadmapError::Json(e) => format!("Invalid JSON body: {}", e),
        _ => {
            error!(error = %err, "Request failed");
            "Internal server error".to_string()
        }
    };
    message(status, &msg)
}

/// Wrap a delete result (bool) into an HTTP response
/// Returns 204 No Content if deleted, 404 Not Found if not found
pub fn from_delete_bool_result(
    result: Result<bool, RoadmapError>,
    not_found_msg: &str,
) -> Response<Full<Bytes>> {
    match result {
        Ok(true) => no_content(),
        Ok(false) => not_found(not_found_msg),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (RoadmapError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (RoadmapError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                RoadmapError::PreconditionFailed("x".into()),
                StatusCode::PRECONDITION_FAILED,
            ),
            (RoadmapError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (RoadmapError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (RoadmapError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (RoadmapError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(error_response(err).status(), status);
        }
    }

    #[test]
    fn test_delete_bool() {
        assert_eq!(
            from_delete_bool_result(Ok(true), "gone").status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            from_delete_bool_result(Ok(false), "gone").status(),
            StatusCode::NOT_FOUND
        );
    }
}

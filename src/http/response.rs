use hyper::{header, StatusCode};

use super::Response;


pub(super) fn json(status: StatusCode, body: Vec<u8>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

pub(super) fn bad_request(msg: &str) -> Response {
    plain(StatusCode::BAD_REQUEST, format!("400 Bad request: {msg}"))
}

pub(super) fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "404 Not found".into())
}

pub(super) fn method_not_allowed() -> Response {
    let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "405 Method not allowed".into());
    response.headers_mut().insert(header::ALLOW, header::HeaderValue::from_static("POST"));
    response
}

pub(super) fn payload_too_large() -> Response {
    plain(StatusCode::PAYLOAD_TOO_LARGE, "413 Payload too large".into())
}

pub(super) fn internal_server_error() -> Response {
    plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
}

fn plain(status: StatusCode, body: String) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=UTF-8")
        .body(body.into())
        .unwrap()
}

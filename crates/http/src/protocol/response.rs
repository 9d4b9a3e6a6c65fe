//! Response heads handed to the encoder.

use http::{Response, StatusCode, Version, header};

/// The head of a response; the body travels separately as payload events.
pub type ResponseHead = Response<()>;

/// Builds the fixed `400 Bad Request` head sent when a request cannot be served.
///
/// The head always asks the client to close the connection.
pub(crate) fn bad_request_head() -> ResponseHead {
    let mut head = Response::new(());
    *head.status_mut() = StatusCode::BAD_REQUEST;
    *head.version_mut() = Version::HTTP_11;
    head.headers_mut().insert(header::CONNECTION, header::HeaderValue::from_static("close"));
    head
}

/// Builds a bare head for `status`, used when the handler fails before anything was written.
pub(crate) fn status_head(status: StatusCode) -> ResponseHead {
    let mut head = Response::new(());
    *head.status_mut() = status;
    head
}

//! Decoded request heads.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version, header};

/// A fully decoded request head, before a body is attached.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, producing the request a handler receives.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the client allows the connection to be reused after this exchange.
    ///
    /// HTTP/1.1 connections persist unless the client sends `Connection: close`.
    pub fn is_keep_alive(&self) -> bool {
        !has_connection_close(self.headers())
    }

    /// Whether the client waits for `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(header::EXPECT)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }
}

/// Returns true if any `Connection` header lists the `close` option.
pub(crate) fn has_connection_close(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .flat_map(|value| value.as_bytes().split(|b| *b == b','))
        .any(|option| option.trim_ascii().eq_ignore_ascii_case(b"close"))
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(name: &str, value: &str) -> RequestHeader {
        Request::builder().uri("/").header(name, value).body(()).unwrap().into()
    }

    #[test]
    fn keep_alive_by_default() {
        let header: RequestHeader = Request::builder().uri("/").body(()).unwrap().into();
        assert!(header.is_keep_alive());
        assert!(!header.expects_continue());
    }

    #[test]
    fn connection_close_in_option_list() {
        assert!(!header_with("Connection", "close").is_keep_alive());
        assert!(!header_with("Connection", "Upgrade, Close").is_keep_alive());
        assert!(header_with("Connection", "keep-alive").is_keep_alive());
    }

    #[test]
    fn expect_continue_is_case_insensitive() {
        assert!(header_with("Expect", "100-Continue").expects_continue());
        assert!(!header_with("Expect", "200-ok").expects_continue());
    }

    #[test]
    fn body_keeps_head() {
        let header = header_with("Host", "localhost");
        let request = header.body("payload");
        assert_eq!(request.headers()["host"], "localhost");
        assert_eq!(*request.body(), "payload");
    }
}

//! Request handlers.
//!
//! A [`Handler`] turns a [`Request<Body>`] into a [`Response<Body>`]. One handler instance is
//! shared by every worker thread, so it must be `Send + Sync`; the futures it returns run on a
//! single worker and need not be `Send`.
//!
//! Async functions and closures become handlers through [`make_handler`]:
//!
//! ```
//! use fiber_http::handler::make_handler;
//! use fiber_http::protocol::body::Body;
//! use http::{Request, Response};
//! use std::convert::Infallible;
//!
//! let handler = make_handler(|request: Request<Body>| async move {
//!     let path = request.uri().path().to_owned();
//!     Ok::<_, Infallible>(Response::new(format!("hello {path}")))
//! });
//! ```

use std::error::Error;

use http::{Request, Response};

use crate::protocol::body::Body;

pub trait Handler: Send + Sync + 'static {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    /// Serves one request.
    ///
    /// An `Err` is answered with an empty `500 Internal Server Error`.
    fn call(&self, req: Request<Body>) -> impl Future<Output = Result<Response<Body>, Self::Error>>;
}

#[derive(Debug, Clone)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut, RespBody, Err> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<RespBody>, Err>>,
    RespBody: Into<Body>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    async fn call(&self, req: Request<Body>) -> Result<Response<Body>, Self::Error> {
        let response = (self.f)(req).await?;
        Ok(response.map(Into::into))
    }
}

/// Wraps a function returning a response future into a [`Handler`].
///
/// The response body can be anything convertible into [`Body`], such as `String`, `&'static str`
/// or `Bytes`.
pub fn make_handler<F, Fut, RespBody, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<RespBody>, Err>>,
    RespBody: Into<Body>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}

//! The wire-level response this crate knows how to write back to the socket.

use crate::body::Body;
use http::{HeaderMap, StatusCode};

pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl RawResponse {
    pub fn new(status: StatusCode) -> Self {
        RawResponse {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Render as a `hyper::Response` ready to hand to `http1::Builder::serve_connection`.
    pub fn into_hyper(self) -> hyper::Response<Body> {
        let mut builder = hyper::Response::builder().status(self.status);
        if let Some(map) = builder.headers_mut() {
            *map = self.headers;
        }
        builder
            .body(self.body)
            .unwrap_or_else(|_| hyper::Response::new(Body::empty()))
    }
}

//! The wire-level request this crate hands up to whatever dispatches it.
//!
//! `RawRequest` carries nothing route- or middleware-specific — that's built
//! on top of it one layer up. It's just "here is what arrived on the socket".

use crate::body::Body;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};
use std::net::SocketAddr;

/// Information about the peer the request arrived from.
///
/// `tls_peer_certificate` is only ever populated by a host that terminates
/// TLS itself and chooses to surface the peer certificate; this crate never
/// performs TLS termination — that's explicitly out of scope here.
#[derive(Debug, Clone)]
pub struct RemoteInfo {
    pub socket_addr: SocketAddr,
    pub tls_peer_certificate: Option<Vec<u8>>,
}

impl RemoteInfo {
    pub fn new(socket_addr: SocketAddr) -> Self {
        RemoteInfo {
            socket_addr,
            tls_peer_certificate: None,
        }
    }
}

/// A request as received from the wire, before any routing or middleware.
pub struct RawRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub remote: RemoteInfo,
    pub body: Body,
}

impl RawRequest {
    /// Build a `RawRequest` from a hyper request plus the peer address hyper
    /// doesn't carry on the request itself.
    pub fn from_hyper(req: hyper::Request<hyper::body::Incoming>, remote: RemoteInfo) -> Self {
        let (parts, incoming) = req.into_parts();
        RawRequest {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            remote,
            body: Body::boxed(incoming),
        }
    }

    /// Construct directly from parts, bypassing hyper — used by tests that
    /// drive the dispatch path without a real socket.
    pub fn new(method: Method, uri: Uri, remote: RemoteInfo) -> Self {
        RawRequest {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote,
            body: Body::empty(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::from_bytes(body.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

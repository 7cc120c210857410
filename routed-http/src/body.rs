//! The request/response body abstraction shared by every layer above this crate.
//!
//! A [`Body`] is either fully buffered (the common case: small JSON/form
//! payloads) or a boxed stream of frames read lazily from the connection.
//! Collecting an already-collected body is free; collecting a streaming body
//! drives the underlying connection.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed error type used by [`Body`] so callers don't need to name hyper's or
/// a stream adapter's concrete error type.
pub type BodyError = Box<dyn std::error::Error + Send + Sync + 'static>;

enum Inner {
    Empty,
    Full(Bytes),
    Boxed(BoxBody<Bytes, BodyError>),
}

/// A request or response body.
///
/// Cloning is not supported — a body is a single-consumer stream, matching
/// the "read at most once" contract the engine enforces on request bodies.
pub struct Body(Inner);

impl Body {
    /// An empty body (used for bodyless responses and as the default).
    pub fn empty() -> Self {
        Body(Inner::Empty)
    }

    /// A body made of an already-available byte buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Body(Inner::Full(bytes.into()))
    }

    /// Wrap any `http_body::Body` (e.g. hyper's `Incoming`) as a `Body`,
    /// erasing its concrete error type behind [`BodyError`].
    pub fn boxed<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        Body(Inner::Boxed(body.map_err(|e| Box::new(e) as BodyError).boxed()))
    }

    /// True for the zero-length empty body (distinguished from a streaming
    /// body that happens to yield no bytes, which is `false` until polled).
    pub fn is_known_empty(&self) -> bool {
        matches!(&self.0, Inner::Empty) || matches!(&self.0, Inner::Full(b) if b.is_empty())
    }

    /// Buffer the entire body into memory.
    pub async fn collect(self) -> Result<Bytes, BodyError> {
        match self.0 {
            Inner::Empty => Ok(Bytes::new()),
            Inner::Full(b) => Ok(b),
            Inner::Boxed(b) => Ok(b.collect().await?.to_bytes()),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Inner::Empty => write!(f, "Body::Empty"),
            Inner::Full(b) => write!(f, "Body::Full({} bytes)", b.len()),
            Inner::Boxed(_) => write!(f, "Body::Boxed"),
        }
    }
}

impl http_body::Body for Body {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match &mut this.0 {
            Inner::Empty => Poll::Ready(None),
            Inner::Full(bytes) => {
                if bytes.is_empty() {
                    Poll::Ready(None)
                } else {
                    let taken = std::mem::take(bytes);
                    Poll::Ready(Some(Ok(http_body::Frame::data(taken))))
                }
            }
            Inner::Boxed(body) => Pin::new(body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.0 {
            Inner::Empty => true,
            Inner::Full(b) => b.is_empty(),
            Inner::Boxed(b) => b.is_end_stream(),
        }
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::empty()
    }
}

impl From<Full<Bytes>> for Body {
    fn from(full: Full<Bytes>) -> Self {
        Body::boxed(full.map_err(|never| match never {}))
    }
}

//! Wire-level HTTP types and the listener/connection loop.
//!
//! This crate is the sole owner of the `hyper` dependency. Everything above
//! it (`routed-core`) talks in terms of [`RawRequest`]/[`RawResponse`] and
//! never imports hyper directly.

pub mod body;
pub mod listener;
pub mod request;
pub mod response;

pub use body::{Body, BodyError};
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
pub use listener::{serve, BoxFuture, ConnectionError, Dispatch};
pub use request::{RawRequest, RemoteInfo};
pub use response::RawResponse;

//! The per-request façade.
//!
//! A `Context` is born when a route matches, lives through the middleware
//! chain, and is torn down once the response is flushed and any unread body
//! drained. It borrows nothing from the engine or router beyond what it
//! needs for the duration of the request — no back-reference to either.

use crate::error::{AppError, RequestError};
use crate::proxy::ClientIpPolicy;
use bytes::Bytes;
use routed_http::{Body, HeaderMap, HeaderName, HeaderValue, Method, RawRequest, RawResponse, StatusCode, Uri};
use std::any::Any;
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// An immutable view over the incoming request. Everything here is cheap to
/// read repeatedly; the body is the one field that moves into `Context` as
/// a single-consumer resource (see [`Context::body_bytes`]).
pub struct RequestView {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: IpAddr,
    pub tls_peer_certificate: Option<Vec<u8>>,
}

impl RequestView {
    pub fn header(&self, name: &str) -> String {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Minimal `Cookie:` header parsing — split on `;`, trim, split first `=`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.headers.get(http::header::COOKIE)?.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }
}

enum BodyState {
    Unread(Body),
    Consumed,
}

/// The response under construction. Owned by `Context`; flushed by the
/// dispatcher at the end of the chain.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    buffer: Vec<u8>,
    flushed: bool,
    closed: bool,
}

impl ResponseBuilder {
    fn new() -> Self {
        ResponseBuilder {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            buffer: Vec::new(),
            flushed: false,
            closed: false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set the status code. Fails once headers have been flushed.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), RequestError> {
        if self.flushed {
            return Err(RequestError::HeadersAlreadyFlushed);
        }
        self.status = status;
        Ok(())
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), RequestError> {
        if self.flushed {
            return Err(RequestError::HeadersAlreadyFlushed);
        }
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append raw bytes to the body buffer. Flushes headers on the first
    /// write; a no-op once closed.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), RequestError> {
        if self.closed {
            return Ok(());
        }
        self.flushed = true;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Mark headers flushed without writing a body, for responses (like a
    /// redirect) that are complete as soon as their headers are set.
    fn mark_flushed(&mut self) {
        self.flushed = true;
    }

    fn into_raw(self) -> RawResponse {
        RawResponse::new(self.status)
            .with_headers(self.headers)
            .with_body(Body::from_bytes(Bytes::from(self.buffer)))
    }
}

/// Everything a `Context` needs to resolve client IPs and mint request IDs
/// without holding a reference back to the engine.
#[derive(Clone)]
pub struct ContextServices {
    pub client_ip_policy: Arc<ClientIpPolicy>,
    pub secure_request_ids: bool,
}

pub struct Context {
    pub request: RequestView,
    params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
    body: BodyState,
    response: ResponseBuilder,
    pub errors: Vec<AppError>,
    pub id: String,
    pub started_at: Instant,
    client_ip_override: Option<IpAddr>,
    services: ContextServices,
    cancelled: CancellationToken,
}

impl Context {
    pub fn new(
        raw: RawRequest,
        params: Vec<(String, String)>,
        id: String,
        services: ContextServices,
        cancelled: CancellationToken,
    ) -> Self {
        let query = raw
            .uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let request = RequestView {
            method: raw.method,
            uri: raw.uri,
            headers: raw.headers,
            remote_addr: raw.remote.socket_addr.ip(),
            tls_peer_certificate: raw.remote.tls_peer_certificate,
        };

        Context {
            request,
            params,
            query,
            attributes: HashMap::new(),
            body: BodyState::Unread(raw.body),
            response: ResponseBuilder::new(),
            errors: Vec::new(),
            id,
            started_at: Instant::now(),
            client_ip_override: None,
            services,
            cancelled,
        }
    }

    // -- params -----------------------------------------------------------

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn must_get_param<T: FromStr>(&self, name: &str) -> Result<T, RequestError> {
        let raw = self
            .param(name)
            .ok_or_else(|| RequestError::MissingParam(name.to_string()))?;
        raw.parse::<T>().map_err(|_| RequestError::ParamDecode {
            name: name.to_string(),
            type_name: std::any::type_name::<T>(),
        })
    }

    // -- query --------------------------------------------------------------

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn query_all(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    // -- headers --------------------------------------------------------------

    pub fn header(&self, name: &str) -> String {
        self.request.header(name)
    }

    // -- body -----------------------------------------------------------------

    pub async fn body_bytes(&mut self) -> Result<Bytes, RequestError> {
        match std::mem::replace(&mut self.body, BodyState::Consumed) {
            BodyState::Unread(body) => body
                .collect()
                .await
                .map_err(|_| RequestError::BodyAlreadyConsumed),
            BodyState::Consumed => Err(RequestError::BodyAlreadyConsumed),
        }
    }

    pub async fn body_string(&mut self) -> Result<String, RequestError> {
        let bytes = self.body_bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| RequestError::BodyAlreadyConsumed)
    }

    /// Take the raw body stream, marking it consumed. Fails if already read.
    pub fn body_stream(&mut self) -> Result<Body, RequestError> {
        match std::mem::replace(&mut self.body, BodyState::Consumed) {
            BodyState::Unread(body) => Ok(body),
            BodyState::Consumed => Err(RequestError::BodyAlreadyConsumed),
        }
    }

    /// Whether the body is still sitting unread (the dispatcher drains it
    /// after the chain completes if so).
    pub fn body_is_unread(&self) -> bool {
        matches!(self.body, BodyState::Unread(_))
    }

    pub(crate) fn take_body_for_drain(&mut self) -> Option<Body> {
        match std::mem::replace(&mut self.body, BodyState::Consumed) {
            BodyState::Unread(body) => Some(body),
            BodyState::Consumed => None,
        }
    }

    // -- response ---------------------------------------------------------

    pub fn status(&mut self, code: u16) -> Result<(), RequestError> {
        let status = StatusCode::from_u16(code).map_err(|_| RequestError::InvalidStatusCode(code))?;
        self.response.set_status(status)
    }

    pub fn json<T: serde::Serialize>(
        &mut self,
        value: &T,
        status: Option<u16>,
    ) -> Result<(), RequestError> {
        if let Some(code) = status {
            self.status(code)?;
        }
        self.response
            .set_header(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"))?;
        let bytes = serde_json::to_vec(value).map_err(|e| RequestError::Serialization(e.to_string()))?;
        self.response.write(&bytes)
    }

    pub fn string(&mut self, text: &str, status: Option<u16>) -> Result<(), RequestError> {
        if let Some(code) = status {
            self.status(code)?;
        }
        self.response.set_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )?;
        self.response.write(text.as_bytes())
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), RequestError> {
        self.response.write(bytes)
    }

    /// `301` default for GET/HEAD, `307`/`308` otherwise, unless the caller
    /// passes an explicit status (e.g. `303` for a POST→GET redirect).
    pub fn redirect(&mut self, location: &str, status: Option<u16>) -> Result<(), RequestError> {
        let default = match self.request.method {
            Method::GET | Method::HEAD => StatusCode::MOVED_PERMANENTLY,
            _ => StatusCode::TEMPORARY_REDIRECT,
        };
        let status = status
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(default);
        self.response.set_status(status)?;
        let value = HeaderValue::from_str(location)
            .map_err(|_| RequestError::InvalidRedirectLocation(location.to_string()))?;
        self.response.set_header(http::header::LOCATION, value)?;
        self.response.mark_flushed();
        Ok(())
    }

    pub fn response_status(&self) -> StatusCode {
        self.response.status_code()
    }

    pub fn response_headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    pub fn response_is_closed(&self) -> bool {
        self.response.is_closed()
    }

    pub fn response_is_flushed(&self) -> bool {
        self.response.is_flushed()
    }

    pub fn close_response(&mut self) {
        self.response.close();
    }

    pub(crate) fn into_raw_response(self) -> RawResponse {
        self.response.into_raw()
    }

    // -- attributes ---------------------------------------------------------

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.attributes.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    // -- client IP ------------------------------------------------------------

    pub fn client_ip(&self) -> IpAddr {
        if let Some(ip) = self.client_ip_override {
            return ip;
        }
        self.services
            .client_ip_policy
            .resolve(self.request.remote_addr, &self.request.headers)
    }

    pub fn override_client_ip(&mut self, ip: IpAddr) {
        self.client_ip_override = Some(ip);
    }

    // -- errors / cancellation ------------------------------------------------

    pub fn push_error(&mut self, error: AppError) {
        self.errors.push(error);
    }

    pub fn cancelled(&self) -> &CancellationToken {
        &self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routed_http::RemoteInfo;

    fn services() -> ContextServices {
        ContextServices {
            client_ip_policy: Arc::new(ClientIpPolicy::default()),
            secure_request_ids: false,
        }
    }

    fn ctx(path: &str) -> Context {
        let remote = RemoteInfo::new("127.0.0.1:1234".parse().unwrap());
        let req = RawRequest::new(Method::GET, path.parse().unwrap(), remote);
        Context::new(req, vec![], "req-1".into(), services(), CancellationToken::new())
    }

    #[test]
    fn query_params_are_parsed_from_uri() {
        let context = ctx("/search?q=rust&tag=web&tag=http");
        assert_eq!(context.query("q"), Some("rust"));
        assert_eq!(context.query_all("tag"), vec!["web", "http"]);
    }

    #[tokio::test]
    async fn body_can_only_be_read_once() {
        let mut context = ctx("/echo");
        let _ = context.body_bytes().await.unwrap();
        let second = context.body_bytes().await;
        assert!(matches!(second, Err(RequestError::BodyAlreadyConsumed)));
    }

    #[test]
    fn must_get_param_fails_when_missing() {
        let context = ctx("/users");
        let result = context.must_get_param::<String>("id");
        assert!(matches!(result, Err(RequestError::MissingParam(_))));
    }

    #[test]
    fn redirect_defaults_to_301_for_get() {
        let mut context = ctx("/old");
        context.redirect("/new", None).unwrap();
        assert_eq!(context.response_status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn redirect_flushes_the_response() {
        let mut context = ctx("/old");
        assert!(!context.response_is_flushed());
        context.redirect("/new", None).unwrap();
        assert!(context.response_is_flushed());
    }

    #[test]
    fn status_rejects_out_of_range_code() {
        let mut context = ctx("/");
        let result = context.status(1000);
        assert!(matches!(result, Err(RequestError::InvalidStatusCode(1000))));
    }

    #[test]
    fn attribute_bag_roundtrips_typed_values() {
        let mut context = ctx("/");
        context.set("count", 42i32);
        assert_eq!(context.get::<i32>("count"), Some(&42));
        assert_eq!(context.get::<String>("count"), None);
    }
}

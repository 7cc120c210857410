//! Request IDs, per-request scoped values, and the error-observer registry.
//!
//! Scoped values are a plain struct threaded explicitly through the request
//! and into `tracing`'s span machinery, not task-local or other ambient
//! state — callers always pass `&RequestScope` rather than reaching for an
//! implicit current-request global.

use crate::context::Context;
use crate::error::AppError;
use uuid::Uuid;

/// Mint a request ID. The "secure variant" is a UUIDv4 (unguessable); the
/// plain variant is a shorter, cheaper monotonic-looking token suitable for
/// log correlation where unguessability doesn't matter.
pub fn generate_request_id(secure: bool) -> String {
    if secure {
        Uuid::new_v4().to_string()
    } else {
        format!("{:x}", Uuid::new_v4().as_u128() & 0xffff_ffff_ffff)
    }
}

/// Per-request values pushed before chain execution so logging and other
/// collaborators can read them without threading a parameter through every
/// handler/middleware signature.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub route_name: Option<String>,
}

impl RequestScope {
    /// Emit the `tracing` span used for the lifetime of a request's
    /// dispatch: request id, method, path, and (once matched) route name.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            route = self.route_name.as_deref().unwrap_or("-"),
        )
    }
}

/// A callback invoked whenever an error reaches the dispatcher. Observer
/// failures are swallowed — a broken observer must never prevent the
/// dispatcher from writing a response.
pub trait ErrorObserver: Send + Sync + 'static {
    fn on_error(&self, ctx: &Context, error: &AppError);
}

/// The default observer: structured `tracing::error!` logging.
pub struct TracingErrorObserver;

impl ErrorObserver for TracingErrorObserver {
    fn on_error(&self, ctx: &Context, error: &AppError) {
        tracing::error!(
            request_id = %ctx.id,
            path = %ctx.request.uri.path(),
            error = %error,
            "unhandled error reached the dispatcher"
        );
    }
}

#[derive(Default)]
pub struct ErrorObserverRegistry {
    observers: Vec<Box<dyn ErrorObserver>>,
}

impl ErrorObserverRegistry {
    pub fn register(&mut self, observer: impl ErrorObserver) {
        self.observers.push(Box::new(observer));
    }

    pub fn notify(&self, ctx: &Context, error: &AppError) {
        for observer in &self.observers {
            observer.on_error(ctx, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_request_ids_are_canonical_uuids() {
        let id = generate_request_id(true);
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn plain_request_ids_are_shorter() {
        let id = generate_request_id(false);
        assert!(id.len() < 36);
    }
}

//! Optional built-in middleware: request logging and request timeouts.
//!
//! `RequestLogger` logs entry/exit plus elapsed time for a request, collapsed
//! into a single middleware shaped for the request/response lifecycle.
//! `Timeout` is grounded on `tokio::time::timeout`, the way the rest of this
//! crate already leans on `tokio`.

use crate::context::Context;
use crate::error::AppError;
use crate::middleware::Next;
use routed_http::StatusCode;
use std::time::Duration;

/// Logs request start/finish and elapsed time via `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl RequestLogger {
    pub fn new() -> Self {
        RequestLogger
    }
}

impl crate::middleware::Middleware for RequestLogger {
    fn call<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next,
    ) -> crate::middleware::BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            let method = ctx.request.method.clone();
            let path = ctx.request.uri.path().to_string();
            tracing::info!(%method, %path, "request started");
            let start = std::time::Instant::now();
            let result = next.run(ctx).await;
            let elapsed_ms = start.elapsed().as_millis();
            tracing::info!(
                %method,
                %path,
                status = ctx.response_status().as_u16(),
                elapsed_ms,
                "request finished"
            );
            result
        })
    }
}

/// Bounds how long the rest of the chain may run. On expiry, cancels
/// [`Context::cancelled`] and writes a `504` if the response hasn't already
/// flushed headers.
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Timeout { duration }
    }

    pub fn secs(seconds: u64) -> Self {
        Timeout::new(Duration::from_secs(seconds))
    }
}

impl crate::middleware::Middleware for Timeout {
    fn call<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next,
    ) -> crate::middleware::BoxFuture<'a, Result<(), AppError>> {
        let duration = self.duration;
        Box::pin(async move {
            match tokio::time::timeout(duration, next.run(ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    ctx.cancelled().cancel();
                    if !ctx.response_is_flushed() {
                        let _ = ctx.status(StatusCode::GATEWAY_TIMEOUT.as_u16());
                        let _ = ctx.string("request timed out", None);
                    }
                    Ok(())
                }
            }
        })
    }
}

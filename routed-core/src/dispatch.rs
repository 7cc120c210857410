//! The per-request dispatch loop.

use crate::context::{Context, ContextServices};
use crate::engine::EngineRuntime;
use crate::observability::{generate_request_id, RequestScope};
use crate::route::MatchOutcome;
use routed_http::{HeaderValue, RawRequest, RawResponse, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Handle one accepted request end-to-end: look up the route, short-circuit
/// on redirect/405/404, otherwise build a `Context`, run the pre-folded
/// middleware chain, recover from uncaught errors, drain any unread body,
/// and return the response to flush.
pub async fn dispatch(runtime: &EngineRuntime, raw: RawRequest) -> RawResponse {
    let path = raw.uri.path().to_string();
    let method = raw.method.clone();

    let outcome = runtime
        .route_table
        .lookup(&method, &path, runtime.config.redirect_trailing_slash);

    let route = match outcome {
        MatchOutcome::Match { route, params } => (route, params),
        MatchOutcome::Redirect { location, status } => {
            return redirect_response(&raw, &location, status);
        }
        MatchOutcome::MethodNotAllowed { allow } => {
            if runtime.config.handle_method_not_allowed {
                return method_not_allowed_response(&allow);
            }
            return not_found_response();
        }
        MatchOutcome::NotFound => {
            return not_found_response();
        }
    };
    let (matched_route, params) = route;

    let request_id = generate_request_id(runtime.config.features.enable_secure_request_ids);
    let scope = RequestScope {
        request_id: request_id.clone(),
        method: method.to_string(),
        path: path.clone(),
        route_name: matched_route.name.clone(),
    };
    let span = scope.span();

    async move {
        let services = ContextServices {
            client_ip_policy: runtime.client_ip_policy.clone(),
            secure_request_ids: runtime.config.features.enable_secure_request_ids,
        };

        let mut ctx = Context::new(raw, params, request_id, services, CancellationToken::new());

        let chain_result = (matched_route.chain)(&mut ctx).await;

        if let Err(error) = chain_result {
            runtime.observers.notify(&ctx, &error);
            if !ctx.response_is_flushed() {
                let (status, message) = error.status_and_message();
                let _ = ctx.status(status.as_u16());
                let body = serde_json::json!({ "error": message });
                if let Ok(bytes) = serde_json::to_vec(&body) {
                    let _ = ctx.write(&bytes);
                }
            }
        }

        if ctx.body_is_unread() {
            if let Some(body) = ctx.take_body_for_drain() {
                let _ = body.collect().await;
            }
        }

        tracing::info!(status = ctx.response_status().as_u16(), "request complete");
        ctx.into_raw_response()
    }
    .instrument(span)
    .await
}

fn redirect_response(raw: &RawRequest, location: &str, status: StatusCode) -> RawResponse {
    let mut target = location.to_string();
    if let Some(query) = raw.uri.query() {
        target.push('?');
        target.push_str(query);
    }
    let mut response = RawResponse::new(status);
    if let Ok(value) = HeaderValue::from_str(&target) {
        response.headers.insert(http::header::LOCATION, value);
    }
    response
}

fn method_not_allowed_response(allow: &[routed_http::Method]) -> RawResponse {
    let mut response = RawResponse::new(StatusCode::METHOD_NOT_ALLOWED);
    let allow_value = allow
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow_value) {
        response.headers.insert(http::header::ALLOW, value);
    }
    response
}

fn not_found_response() -> RawResponse {
    RawResponse::new(StatusCode::NOT_FOUND)
}

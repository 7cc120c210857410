//! The error taxonomy: kinds, not type names.
//!
//! `ConfigurationError` is raised (and only raised) during `Engine::build`;
//! the other three surface during dispatch and are turned into responses by
//! [`AppError::into_response_parts`].

use routed_http::StatusCode;

/// Malformed path, duplicate param, invalid constraint regex, unresolved
/// middleware name, unparseable trusted-proxy entry. Fatal at `build()`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("duplicate parameter name {name:?} in pattern {pattern:?}")]
    DuplicateParam { pattern: String, name: String },

    #[error("wildcard segment must be last in pattern {pattern:?}")]
    WildcardNotLast { pattern: String },

    #[error("constraint regex for {name:?} failed to compile: {source}")]
    InvalidConstraint {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("unresolved named middleware reference {0:?}")]
    UnresolvedMiddleware(String),

    #[error("unresolved custom type tag {0:?}; register it with Engine::register_type first")]
    UnresolvedCustomType(String),

    #[error("unparseable trusted-proxy entry {0:?}")]
    InvalidTrustedProxy(String),

    #[error("engine already built")]
    AlreadyBuilt,
}

/// Body already consumed, body over size limit, header mutation after
/// flush, double-`next` invocation. Surfaced to the middleware stack.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request body already consumed")]
    BodyAlreadyConsumed,

    #[error("request body exceeds the configured maximum of {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("response headers already flushed")]
    HeadersAlreadyFlushed,

    #[error("next() called more than once by the same middleware")]
    NextCalledTwice,

    #[error("missing required parameter {0:?}")]
    MissingParam(String),

    #[error("parameter {name:?} could not be decoded as {type_name}")]
    ParamDecode { name: String, type_name: &'static str },

    #[error("{0} is not a valid HTTP status code")]
    InvalidStatusCode(u16),

    #[error("failed to serialize response body: {0}")]
    Serialization(String),

    #[error("redirect location {0:?} is not a valid header value")]
    InvalidRedirectLocation(String),
}

/// Any uncaught error from a handler or middleware.
#[derive(Debug, thiserror::Error)]
#[error("handler error: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }
}

/// Domain-level "resource missing", thrown from inside a handler.
#[derive(Debug, thiserror::Error)]
#[error("not found: {0}")]
pub struct NotFoundError(pub String);

/// The umbrella error type threaded through the middleware chain.
///
/// Handlers and middleware return `Result<(), AppError>`; the dispatcher
/// maps whatever reaches it to a status code and JSON body unless the
/// response has already been flushed, in which case the connection is just
/// truncated.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error("{status}: {message}")]
    Custom {
        status: StatusCode,
        message: String,
    },
}

impl AppError {
    pub fn custom(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Custom {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(NotFoundError(message.into()))
    }

    pub fn handler(message: impl Into<String>) -> Self {
        AppError::Handler(HandlerError(message.into()))
    }

    /// Map to the status/message pair the dispatcher writes when it catches
    /// an error that reached it with the response still unflushed.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Configuration(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Request(RequestError::MissingParam(_))
            | AppError::Request(RequestError::ParamDecode { .. })
            | AppError::Request(RequestError::InvalidStatusCode(_))
            | AppError::Request(RequestError::Serialization(_))
            | AppError::Request(RequestError::InvalidRedirectLocation(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Request(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Handler(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.0.clone()),
            AppError::NotFound(e) => (StatusCode::NOT_FOUND, e.0.clone()),
            AppError::Custom { status, message } => (*status, message.clone()),
        }
    }
}

/// Generate `From<E> for AppError` implementations that map a collaborator's
/// error type to a specific `AppError` variant.
///
/// ```ignore
/// routed_core::map_error! {
///     std::num::ParseIntError => handler,
/// }
/// ```
#[macro_export]
macro_rules! map_error {
    ( $( $err_ty:ty => $ctor:ident ),* $(,)? ) => {
        $(
            impl From<$err_ty> for $crate::error::AppError {
                fn from(err: $err_ty) -> Self {
                    $crate::error::AppError::$ctor(err.to_string())
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::not_found("widget missing");
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "widget missing");
    }

    #[test]
    fn request_error_maps_to_400() {
        let err = AppError::from(RequestError::BodyAlreadyConsumed);
        let (status, _) = err.status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn custom_status_is_preserved() {
        let err = AppError::custom(StatusCode::IM_A_TEAPOT, "teapot");
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(message, "teapot");
    }

    #[test]
    fn configuration_error_never_reaches_dispatch_is_internal_if_it_did() {
        let err = AppError::from(ConfigurationError::AlreadyBuilt);
        let (status, _) = err.status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

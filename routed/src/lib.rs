//! `routed`: a radix-tree-style router, composable middleware pipeline, and
//! typed request/response context for building HTTP services.
//!
//! This crate is a thin facade over `routed-core` (router/middleware/context/
//! engine) and `routed-http` (the hyper-backed transport). Most applications
//! only need `routed::prelude::*`.

pub use routed_core::{
    builtin, init_tracing, AppError, ClientIpPolicy, ConfigError, ConfigValue, Context,
    ContextServices, CustomValidator, Engine, EngineConfig, EngineRuntime, EngineState,
    ErrorObserver, ErrorObserverRegistry, FeatureFlags, Handler, MatchOutcome, Middleware,
    MiddlewareRegistry, MiddlewareSlot, Next, PathPattern, RawConfig, RegisteredRoute,
    RequestScope, RequestView, Route, Router, RouteTable, ReverseRouteError, TracingErrorObserver,
    TypeRegistry,
};
pub use routed_core::{AppError as Error, ConfigurationError, HandlerError, NotFoundError, RequestError};

pub use routed_http::{
    Body, BodyError, ConnectionError, HeaderMap, HeaderName, HeaderValue, Method, RawRequest,
    RawResponse, RemoteInfo, StatusCode, Uri, Version,
};

pub mod prelude {
    pub use crate::{AppError, Context, Engine, EngineConfig, Handler, Middleware, Next, Route, Router};
    pub use routed_core::builtin::{RequestLogger, Timeout};
}

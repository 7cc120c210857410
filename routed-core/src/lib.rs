//! Core runtime: router, middleware chain, per-request context, and engine
//! lifecycle. `routed-http` is the only crate in the workspace that knows
//! about hyper; everything here speaks `RawRequest`/`RawResponse`.

pub mod builtin;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod observability;
pub mod pattern;
pub mod proxy;
pub mod route;
pub mod router;

mod engine;

pub use config::{ConfigError, ConfigValue, EngineConfig, FeatureFlags, RawConfig};
pub use context::{Context, ContextServices, RequestView};
pub use engine::{Engine, EngineRuntime, EngineState};
pub use error::{AppError, ConfigurationError, HandlerError, NotFoundError, RequestError};
pub use logging::init_tracing;
pub use middleware::{Handler, Middleware, Next};
pub use observability::{ErrorObserver, ErrorObserverRegistry, RequestScope, TracingErrorObserver};
pub use pattern::{CustomValidator, PathPattern, TypeRegistry};
pub use proxy::ClientIpPolicy;
pub use route::{MatchOutcome, RegisteredRoute, ReverseRouteError, RouteTable};
pub use router::{MiddlewareRegistry, MiddlewareSlot, Route, Router};

pub mod prelude {
    pub use crate::{
        AppError, Context, Engine, EngineConfig, Handler, Middleware, Next, Route, Router,
    };
}

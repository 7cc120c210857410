//! Engine lifecycle: `Configuring → Built → Serving → ShuttingDown → Stopped`.

use crate::config::EngineConfig;
use crate::error::ConfigurationError;
use crate::middleware::Middleware;
use crate::observability::{ErrorObserver, ErrorObserverRegistry, TracingErrorObserver};
use crate::pattern::TypeRegistry;
use crate::proxy::ClientIpPolicy;
use crate::route::{ReverseRouteError, RegisteredRoute, RouteTable};
use crate::router::{MiddlewareRegistry, MiddlewareSlot, Router};
use routed_http::serve as serve_connections;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Configuring,
    Built,
    Serving,
    ShuttingDown,
    Stopped,
}

#[derive(Clone)]
struct Mount {
    prefix: String,
    middlewares: Vec<MiddlewareSlot>,
    router: Router,
}

/// The frozen, immutable product of `build()`: route table plus whatever
/// the dispatch loop reads on every request. Shared via `Arc` so the
/// listener's dispatch closure doesn't borrow from `Engine` — a context only
/// needs this snapshot for the duration of one request.
pub struct EngineRuntime {
    pub route_table: RouteTable,
    pub config: EngineConfig,
    pub client_ip_policy: Arc<ClientIpPolicy>,
    pub observers: ErrorObserverRegistry,
}

/// The top-level dispatcher owning configuration, the merged route table,
/// and (once serving) the listening socket.
pub struct Engine {
    state: EngineState,
    config: EngineConfig,
    engine_middlewares: Vec<MiddlewareSlot>,
    mounts: Vec<Mount>,
    middleware_registry: MiddlewareRegistry,
    type_registry: TypeRegistry,
    observers: ErrorObserverRegistry,
    runtime: Option<Arc<EngineRuntime>>,
    shutdown: CancellationToken,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut observers = ErrorObserverRegistry::default();
        observers.register(TracingErrorObserver);
        Engine {
            state: EngineState::Configuring,
            config: EngineConfig::default(),
            engine_middlewares: Vec::new(),
            mounts: Vec::new(),
            middleware_registry: MiddlewareRegistry::default(),
            type_registry: TypeRegistry::default(),
            observers,
            runtime: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.engine_middlewares.push(MiddlewareSlot::Direct(Arc::new(mw)));
        self
    }

    /// Register a named middleware, resolved when an `MiddlewareSlot::Named`
    /// reference to it is hit during `build()`.
    pub fn register_middleware(&mut self, name: impl Into<String>, mw: impl Middleware) {
        self.middleware_registry.register(name, mw);
    }

    /// Register a `{name:tag}` custom type validator, resolved against any
    /// route pattern using that tag when `build()` runs.
    pub fn register_type(
        &mut self,
        name: impl Into<String>,
        validator: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) {
        self.type_registry.register(name, validator);
    }

    pub fn register_observer(&mut self, observer: impl ErrorObserver) {
        self.observers.register(observer);
    }

    /// Mount `router` under `mount_prefix` with `mount_middlewares` applied
    /// before the router's own, wrapping the whole tree with a mount prefix
    /// and mount-level middleware.
    pub fn mount(mut self, mount_prefix: impl Into<String>, router: Router) -> Self {
        self.mounts.push(Mount {
            prefix: mount_prefix.into(),
            middlewares: Vec::new(),
            router,
        });
        self.state = EngineState::Configuring;
        self.runtime = None;
        self
    }

    pub fn mount_with_middleware(
        mut self,
        mount_prefix: impl Into<String>,
        mount_middlewares: Vec<MiddlewareSlot>,
        router: Router,
    ) -> Self {
        self.mounts.push(Mount {
            prefix: mount_prefix.into(),
            middlewares: mount_middlewares,
            router,
        });
        self.state = EngineState::Configuring;
        self.runtime = None;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Walk mounted routers, populate the route table, resolve named
    /// middleware references, and freeze the configuration. Idempotent:
    /// calling `build()` again after a successful build is a no-op that
    /// produces the same table.
    pub fn build(&mut self) -> Result<(), ConfigurationError> {
        if matches!(self.state, EngineState::Built | EngineState::Serving) {
            return Ok(());
        }

        let mut table_builder = RouteTable::builder();

        for mount in &self.mounts {
            let mut middlewares = self.engine_middlewares.clone();
            middlewares.extend(mount.middlewares.iter().cloned());
            mount.router.clone().build(
                &mount.prefix,
                &[],
                &middlewares,
                &self.middleware_registry,
                &self.type_registry,
                &mut table_builder,
            )?;
        }

        let route_table = table_builder.build();
        let client_ip_policy = Arc::new(self.config.client_ip_policy()?);

        self.runtime = Some(Arc::new(EngineRuntime {
            route_table,
            config: self.config.clone(),
            client_ip_policy,
            observers: std::mem::take(&mut self.observers),
        }));
        self.state = EngineState::Built;
        tracing::debug!("engine build complete");
        Ok(())
    }

    pub fn get_all_routes(&self) -> Vec<Arc<RegisteredRoute>> {
        self.runtime
            .as_ref()
            .map(|rt| rt.route_table.all_routes())
            .unwrap_or_default()
    }

    pub fn resolve_named(
        &self,
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, ReverseRouteError> {
        self.runtime
            .as_ref()
            .map(|rt| rt.route_table.resolve_named(name, params))
            .unwrap_or_else(|| Err(ReverseRouteError::UnknownName(name.to_string())))
    }

    /// Run one request through the built route table and middleware chain
    /// without a socket — the same dispatch path `serve` uses per connection,
    /// exposed directly for embedding behind a non-TCP host (e.g. a
    /// serverless adapter) and for driving the engine in tests.
    pub async fn dispatch_request(
        &mut self,
        raw: routed_http::RawRequest,
    ) -> Result<routed_http::RawResponse, ConfigurationError> {
        self.build()?;
        let runtime = self.runtime.clone().expect("build() guarantees runtime is set");
        Ok(crate::dispatch::dispatch(&runtime, raw).await)
    }

    /// Bind `addr` and enter the dispatch loop. Calls `build()` implicitly
    /// if not yet built.
    pub async fn serve(&mut self, addr: SocketAddr) -> std::io::Result<()> {
        self.build().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let runtime = self.runtime.clone().expect("build() guarantees runtime is set");

        self.state = EngineState::Serving;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "engine serving");

        let dispatch: routed_http::Dispatch = Arc::new(move |raw| {
            let runtime = runtime.clone();
            Box::pin(async move { crate::dispatch::dispatch(&runtime, raw).await })
        });

        serve_connections(listener, dispatch, self.shutdown.clone()).await
    }

    /// Stop accepting new connections, wait up to
    /// `graceful_shutdown_grace_period_secs` for in-flight requests to
    /// finish, then mark the engine stopped.
    pub async fn close(&mut self) {
        self.state = EngineState::ShuttingDown;
        self.shutdown.cancel();
        let grace = self
            .runtime
            .as_ref()
            .map(|rt| rt.config.graceful_shutdown_grace_period_secs)
            .unwrap_or(30);
        tokio::time::sleep(Duration::from_secs(grace)).await;
        self.state = EngineState::Stopped;
        tracing::info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::router::Route;

    fn noop(_ctx: &mut Context) -> crate::middleware::BoxFuture<'_, Result<(), crate::error::AppError>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn build_is_idempotent() {
        let router = Router::new("/api").push(Route::get("/health", noop).named("health"));
        let mut engine = Engine::new().mount("", router);
        engine.build().unwrap();
        let routes_first = engine.get_all_routes().len();
        engine.build().unwrap();
        let routes_second = engine.get_all_routes().len();
        assert_eq!(routes_first, routes_second);
        assert_eq!(engine.state(), EngineState::Built);
    }

    #[test]
    fn resolve_named_before_build_is_unknown_name() {
        let engine = Engine::new();
        let result = engine.resolve_named("missing", &HashMap::new());
        assert!(matches!(result, Err(ReverseRouteError::UnknownName(_))));
    }
}

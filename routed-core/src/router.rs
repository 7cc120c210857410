//! Router tree builder and the `build()` resolution algorithm.
//!
//! `Router` is a pure builder — it never holds a back-reference to the
//! engine that eventually mounts it. `Route` is the leaf: a method, a path, a
//! handler, and whatever name/constraints/middleware apply to just that
//! route. Both are consumed by value and rebuilt on every chained call,
//! which is what makes `build()` idempotent over an otherwise-frozen tree.

use crate::error::ConfigurationError;
use crate::middleware::{Handler, Middleware};
use crate::pattern::{PathPattern, TypeRegistry};
use crate::route::{RegisteredRoute, RouteMethod, RouteTableBuilder};
use routed_http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// A middleware attached either directly or by a name resolved later, at
/// `build()`.
#[derive(Clone)]
pub enum MiddlewareSlot {
    Direct(Arc<dyn Middleware>),
    Named(String),
}

/// A registry of middlewares registered under a name, consulted when
/// resolving `MiddlewareSlot::Named` during `build()`.
#[derive(Default, Clone)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn register(&mut self, name: impl Into<String>, middleware: impl Middleware) {
        self.entries.insert(name.into(), Arc::new(middleware));
    }

    fn resolve(&self, slot: &MiddlewareSlot) -> Result<Arc<dyn Middleware>, ConfigurationError> {
        match slot {
            MiddlewareSlot::Direct(mw) => Ok(mw.clone()),
            MiddlewareSlot::Named(name) => self
                .entries
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigurationError::UnresolvedMiddleware(name.clone())),
        }
    }
}

/// One leaf route registration, independent of whatever `Router`/`Group`
/// it's eventually pushed into.
#[derive(Clone)]
pub struct Route {
    method: RouteMethod,
    path: String,
    handler: Arc<dyn Handler>,
    name: Option<String>,
    constraints: HashMap<String, String>,
    middlewares: Vec<MiddlewareSlot>,
}

impl Route {
    pub fn new(method: RouteMethod, path: impl Into<String>, handler: impl Handler) -> Self {
        Route {
            method,
            path: path.into(),
            handler: Arc::new(handler),
            name: None,
            constraints: HashMap::new(),
            middlewares: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Exact(Method::GET), path, handler)
    }
    pub fn post(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Exact(Method::POST), path, handler)
    }
    pub fn put(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Exact(Method::PUT), path, handler)
    }
    pub fn patch(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Exact(Method::PATCH), path, handler)
    }
    pub fn delete(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Exact(Method::DELETE), path, handler)
    }
    pub fn head(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Exact(Method::HEAD), path, handler)
    }
    pub fn options(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Exact(Method::OPTIONS), path, handler)
    }
    pub fn any(path: impl Into<String>, handler: impl Handler) -> Self {
        Route::new(RouteMethod::Any, path, handler)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn constrain(mut self, param: impl Into<String>, regex: impl Into<String>) -> Self {
        self.constraints.insert(param.into(), regex.into());
        self
    }

    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middlewares.push(MiddlewareSlot::Direct(Arc::new(mw)));
        self
    }

    pub fn middleware_ref(mut self, name: impl Into<String>) -> Self {
        self.middlewares.push(MiddlewareSlot::Named(name.into()));
        self
    }
}

#[derive(Clone)]
enum Node {
    Group(Router),
    Route(Route),
}

/// A builder grouping routes under a shared prefix, name, and middleware
/// stack. `group()` nests a child `Router`; `push()` registers a leaf.
///
/// Cloneable so `Engine::build()` can re-walk a mounted tree on every call
/// without consuming the caller's original — `build()` is idempotent.
#[derive(Clone)]
pub struct Router {
    prefix: String,
    name: Option<String>,
    middlewares: Vec<MiddlewareSlot>,
    children: Vec<Node>,
}

impl Router {
    pub fn new(prefix: impl Into<String>) -> Self {
        Router {
            prefix: prefix.into(),
            name: None,
            middlewares: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middlewares.push(MiddlewareSlot::Direct(Arc::new(mw)));
        self
    }

    pub fn middleware_ref(mut self, name: impl Into<String>) -> Self {
        self.middlewares.push(MiddlewareSlot::Named(name.into()));
        self
    }

    pub fn push(mut self, route: Route) -> Self {
        self.children.push(Node::Route(route));
        self
    }

    /// Nest a child router at `prefix`. `build` receives a fresh `Router`
    /// for `prefix` and returns the configured group.
    pub fn group(mut self, prefix: impl Into<String>, build: impl FnOnce(Router) -> Router) -> Self {
        let child = build(Router::new(prefix));
        self.children.push(Node::Group(child));
        self
    }

    /// Depth-first walk emitting a `RegisteredRoute` per leaf. `inherited_*`
    /// are whatever the engine mount contributed (enginePrefix + mountPrefix,
    /// engine/mount name fragments, engineMW ++ mountMW).
    pub(crate) fn build(
        self,
        inherited_path: &str,
        inherited_name: &[String],
        inherited_middlewares: &[MiddlewareSlot],
        registry: &MiddlewareRegistry,
        types: &TypeRegistry,
        out: &mut RouteTableBuilder,
    ) -> Result<(), ConfigurationError> {
        let path = join_path(inherited_path, &self.prefix);

        let mut name = inherited_name.to_vec();
        if let Some(n) = &self.name {
            if !n.is_empty() {
                name.push(n.clone());
            }
        }

        let mut middlewares = inherited_middlewares.to_vec();
        middlewares.extend(self.middlewares.iter().cloned());

        for child in self.children {
            match child {
                Node::Group(router) => {
                    router.build(&path, &name, &middlewares, registry, types, out)?;
                }
                Node::Route(route) => {
                    emit_route(route, &path, &name, &middlewares, registry, types, out)?;
                }
            }
        }

        Ok(())
    }
}

fn emit_route(
    route: Route,
    base_path: &str,
    base_name: &[String],
    base_middlewares: &[MiddlewareSlot],
    registry: &MiddlewareRegistry,
    types: &TypeRegistry,
    out: &mut RouteTableBuilder,
) -> Result<(), ConfigurationError> {
    let full_path = join_path(base_path, &route.path);

    let mut name_fragments = base_name.to_vec();
    if let Some(n) = &route.name {
        if !n.is_empty() {
            name_fragments.push(n.clone());
        }
    }
    let full_name = if name_fragments.is_empty() {
        None
    } else {
        Some(name_fragments.join("."))
    };

    let mut slots = base_middlewares.to_vec();
    slots.extend(route.middlewares.iter().cloned());
    let middlewares = slots
        .iter()
        .map(|slot| registry.resolve(slot))
        .collect::<Result<Vec<_>, _>>()?;

    let mut pattern = PathPattern::parse(&full_path, &route.constraints)?;
    pattern.resolve_custom_types(types)?;
    let chain = crate::middleware::build_chain(route.handler.clone(), &middlewares);

    out.push(RegisteredRoute {
        method: route.method,
        pattern,
        name: full_name,
        constraints: route.constraints,
        middlewares,
        handler: route.handler,
        chain,
    });

    Ok(())
}

/// Concatenate two path fragments, collapsing duplicate `/` at the join
/// point but preserving a trailing slash on `suffix`.
fn join_path(base: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return normalize(base);
    }
    let base_trimmed = base.trim_end_matches('/');
    let suffix_trimmed = suffix.trim_start_matches('/');
    if suffix_trimmed.is_empty() {
        return normalize(&format!("{base_trimmed}/"));
    }
    normalize(&format!("{base_trimmed}/{suffix_trimmed}"))
}

fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    if !path.starts_with('/') {
        return format!("/{path}");
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::route::RouteTable;

    fn noop(_ctx: &mut Context) -> crate::middleware::BoxFuture<'_, Result<(), crate::error::AppError>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn nested_group_produces_joined_path_and_name() {
        let router = Router::new("/base").named("api").group("/v1", |g| {
            g.named("v1").push(Route::get("/health", noop).named("health"))
        });

        let mut table_builder = RouteTable::builder();
        router
            .build("", &[], &[], &MiddlewareRegistry::default(), &TypeRegistry::default(), &mut table_builder)
            .unwrap();
        let table = table_builder.build();

        let route = table.get("api.v1.health").expect("route should be registered");
        assert_eq!(route.pattern.raw, "/base/v1/health");
    }

    #[test]
    fn middleware_order_is_outer_to_inner() {
        use crate::middleware::Next;
        use std::sync::Mutex;

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let make_mw = |label: &'static str, order: Arc<Mutex<Vec<&'static str>>>| {
            move |ctx: &mut Context, next: Next| {
                let order = order.clone();
                Box::pin(async move {
                    order.lock().unwrap().push(label);
                    next.run(ctx).await
                }) as crate::middleware::BoxFuture<'_, Result<(), crate::error::AppError>>
            }
        };

        let router = Router::new("/api")
            .middleware(make_mw("A", order.clone()))
            .group("/v1", {
                let order = order.clone();
                move |g| {
                    g.middleware(make_mw("C", order.clone())).push(
                        Route::get("/x", {
                            let order = order.clone();
                            move |_ctx: &mut Context| {
                                let order = order.clone();
                                Box::pin(async move {
                                    order.lock().unwrap().push("handler");
                                    Ok(())
                                }) as crate::middleware::BoxFuture<'_, Result<(), crate::error::AppError>>
                            }
                        })
                        .middleware(make_mw("E", order.clone())),
                    )
                }
            });

        let mut table_builder = RouteTable::builder();
        router
            .build("", &[], &[], &MiddlewareRegistry::default(), &TypeRegistry::default(), &mut table_builder)
            .unwrap();
        let table = table_builder.build();

        let routes = table.all_routes();
        let route = &routes[0];
        assert_eq!(route.middlewares.len(), 3);
    }

    #[test]
    fn unresolved_named_middleware_fails_at_build() {
        let router = Router::new("/").push(Route::get("/x", noop).middleware_ref("auth"));
        let mut table_builder = RouteTable::builder();
        let result = router.build("", &[], &[], &MiddlewareRegistry::default(), &TypeRegistry::default(), &mut table_builder);
        assert!(matches!(result, Err(ConfigurationError::UnresolvedMiddleware(_))));
    }

    #[test]
    fn join_path_collapses_duplicate_slashes() {
        assert_eq!(join_path("/api/", "/v1"), "/api/v1");
        assert_eq!(join_path("/api", "v1/"), "/api/v1/");
    }
}

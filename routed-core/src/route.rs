//! Route table and matching algorithm.
//!
//! Routes are grouped by method (plus a separate `ANY` bucket) and, within
//! each group, ordered by pattern specificity so the first structural match
//! found while scanning is already the most specific one. A type-tag
//! mismatch on a candidate is not an error — the scan just continues to the
//! next route, which is how `/users/{id:int}` correctly falls through to
//! 404 for `/users/abc` instead of erroring.

use crate::middleware::{Chain, Handler, Middleware};
use crate::pattern::{PathPattern, PathSegment};
use routed_http::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

/// `method` on a `RegisteredRoute`: a concrete verb, or the `ANY` sentinel
/// consulted only when no method-specific route matches (see DESIGN.md for
/// why method-specific routes always win over `ANY`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    Exact(Method),
    Any,
}

/// A fully resolved, immutable route record emitted by `Engine::build`.
pub struct RegisteredRoute {
    pub method: RouteMethod,
    pub pattern: PathPattern,
    pub name: Option<String>,
    pub constraints: HashMap<String, String>,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub handler: Arc<dyn Handler>,
    pub chain: Chain,
}

impl std::fmt::Debug for RegisteredRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredRoute")
            .field("method", &self.method)
            .field("pattern", &self.pattern.raw)
            .field("name", &self.name)
            .finish()
    }
}

/// The tagged result of a route-table lookup.
pub enum MatchOutcome {
    Match {
        route: Arc<RegisteredRoute>,
        params: Vec<(String, String)>,
    },
    Redirect {
        location: String,
        status: StatusCode,
    },
    MethodNotAllowed {
        allow: Vec<Method>,
    },
    NotFound,
}

pub struct RouteTable {
    by_method: HashMap<Method, Vec<Arc<RegisteredRoute>>>,
    any_routes: Vec<Arc<RegisteredRoute>>,
    names: HashMap<String, Arc<RegisteredRoute>>,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn has_trailing_slash(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    pub fn lookup(&self, method: &Method, path: &str, redirect_trailing_slash: bool) -> MatchOutcome {
        let segments = split_path(path);
        let request_trailing = has_trailing_slash(path);

        let method_bucket = self.by_method.get(method).map(Vec::as_slice).unwrap_or(&[]);

        if let Some(outcome) = self.scan(method_bucket, &segments, request_trailing, redirect_trailing_slash, path) {
            return outcome;
        }
        if let Some(outcome) = self.scan(&self.any_routes, &segments, request_trailing, redirect_trailing_slash, path) {
            return outcome;
        }

        let allow = self.allowed_methods(&segments);
        if allow.is_empty() {
            MatchOutcome::NotFound
        } else {
            MatchOutcome::MethodNotAllowed { allow }
        }
    }

    /// Scan one ordered bucket for a structural match, honoring the
    /// trailing-slash policy. Routes are pre-sorted by specificity, so the
    /// first structural hit here is already the most specific candidate.
    fn scan(
        &self,
        bucket: &[Arc<RegisteredRoute>],
        segments: &[&str],
        request_trailing: bool,
        redirect_trailing_slash: bool,
        original_path: &str,
    ) -> Option<MatchOutcome> {
        let mut redirect_candidate: Option<&Arc<RegisteredRoute>> = None;

        for route in bucket {
            let Some(params) = route.pattern.matches(segments) else {
                continue;
            };

            if route.pattern.has_trailing_slash == request_trailing {
                return Some(MatchOutcome::Match {
                    route: route.clone(),
                    params,
                });
            }

            if redirect_candidate.is_none() {
                redirect_candidate = Some(route);
            }
        }

        if redirect_trailing_slash {
            if let Some(route) = redirect_candidate {
                let canonical = if route.pattern.has_trailing_slash {
                    format!("{original_path}/")
                } else {
                    original_path.trim_end_matches('/').to_string()
                };
                let status = match route.method {
                    RouteMethod::Exact(ref m) if *m == Method::GET || *m == Method::HEAD => {
                        StatusCode::MOVED_PERMANENTLY
                    }
                    _ => StatusCode::TEMPORARY_REDIRECT,
                };
                return Some(MatchOutcome::Redirect {
                    location: canonical,
                    status,
                });
            }
        }

        None
    }

    /// Stable-ordered (alphabetical) list of methods some registered route
    /// matches `segments` under, for the `Allow` header.
    fn allowed_methods(&self, segments: &[&str]) -> Vec<Method> {
        let mut methods: Vec<Method> = self
            .by_method
            .iter()
            .filter(|(_, bucket)| bucket.iter().any(|route| route.pattern.matches(segments).is_some()))
            .map(|(method, _)| method.clone())
            .collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredRoute>> {
        self.names.get(name)
    }

    pub fn all_routes(&self) -> Vec<Arc<RegisteredRoute>> {
        let mut routes: Vec<Arc<RegisteredRoute>> = self.by_method.values().flatten().cloned().collect();
        routes.extend(self.any_routes.iter().cloned());
        routes
    }

    /// Reverse a route name and parameter map into a concrete path. See
    /// DESIGN.md for the chosen failure mode.
    pub fn resolve_named(
        &self,
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, ReverseRouteError> {
        let route = self
            .names
            .get(name)
            .ok_or_else(|| ReverseRouteError::UnknownName(name.to_string()))?;

        let mut path = String::from("/");
        for segment in &route.pattern.segments {
            match segment {
                PathSegment::Literal(text) => {
                    path.push_str(text);
                    path.push('/');
                }
                PathSegment::Param { name: param_name, .. } | PathSegment::Wildcard(param_name) => {
                    let value = params.get(param_name).ok_or_else(|| {
                        ReverseRouteError::MissingParam(param_name.clone(), name.to_string())
                    })?;
                    path.push_str(value);
                    path.push('/');
                }
            }
        }

        if !route.pattern.has_trailing_slash && path.len() > 1 {
            path.pop();
        }
        Ok(path)
    }
}

/// Failure modes for [`RouteTable::resolve_named`].
#[derive(Debug, thiserror::Error)]
pub enum ReverseRouteError {
    #[error("no route named {0:?}")]
    UnknownName(String),
    #[error("missing parameter {0:?} required by route {1:?}")]
    MissingParam(String, String),
}

#[derive(Default)]
pub struct RouteTableBuilder {
    routes: Vec<Arc<RegisteredRoute>>,
}

impl RouteTableBuilder {
    pub fn push(&mut self, route: RegisteredRoute) {
        self.routes.push(Arc::new(route));
    }

    pub fn build(self) -> RouteTable {
        let mut by_method: HashMap<Method, Vec<Arc<RegisteredRoute>>> = HashMap::new();
        let mut any_routes = Vec::new();
        let mut names = HashMap::new();

        for route in self.routes {
            if let Some(name) = &route.name {
                if let Some(existing) = names.insert(name.clone(), route.clone()) {
                    tracing::warn!(
                        route_name = %name,
                        replaced_pattern = %existing.pattern.raw,
                        new_pattern = %route.pattern.raw,
                        "duplicate route name; later registration wins"
                    );
                }
            }
            match &route.method {
                RouteMethod::Exact(m) => by_method.entry(m.clone()).or_default().push(route),
                RouteMethod::Any => any_routes.push(route),
            }
        }

        for bucket in by_method.values_mut() {
            sort_by_specificity(bucket);
        }
        sort_by_specificity(&mut any_routes);

        RouteTable {
            by_method,
            any_routes,
            names,
        }
    }
}

fn sort_by_specificity(bucket: &mut [Arc<RegisteredRoute>]) {
    bucket.sort_by(|a, b| b.pattern.specificity_rank().cmp(&a.pattern.specificity_rank()));
}

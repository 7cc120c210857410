//! Route compilation, matching, and redirect/405/404 behavior end-to-end
//! through `Engine::dispatch_request`.

use routed_core::{AppError, Context, Engine, Route, Router};
use routed_http::{HeaderValue, Method, RawRequest, RemoteInfo, StatusCode};

fn ok(_ctx: &mut Context) -> routed_core::middleware::BoxFuture<'_, Result<(), AppError>> {
    Box::pin(async { Ok(()) })
}

fn request(method: Method, path: &str) -> RawRequest {
    let remote = RemoteInfo::new("127.0.0.1:9000".parse().unwrap());
    RawRequest::new(method, path.parse().unwrap(), remote)
}

#[tokio::test]
async fn nested_group_produces_joined_path_and_dotted_name() {
    let router = Router::new("/base").named("api").group("/v1", |g| {
        g.named("v1").push(Route::get("/health", ok).named("health"))
    });
    let mut engine = Engine::new().mount("", router);
    engine.build().unwrap();

    let routes = engine.get_all_routes();
    let route = routes.iter().find(|r| r.name.as_deref() == Some("api.v1.health"));
    assert!(route.is_some());
    assert_eq!(route.unwrap().pattern.raw, "/base/v1/health");
}

#[tokio::test]
async fn trailing_slash_redirect_301_for_get() {
    let router = Router::new("").push(Route::get("/path", ok));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::GET, "/path/"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers.get(http::header::LOCATION), Some(&HeaderValue::from_static("/path")));
}

#[tokio::test]
async fn trailing_slash_redirect_307_for_post() {
    let router = Router::new("").push(Route::post("/path2", ok));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::POST, "/path2/"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers.get(http::header::LOCATION), Some(&HeaderValue::from_static("/path2")));
}

#[tokio::test]
async fn trailing_slash_redirect_preserves_query_string() {
    let router = Router::new("").push(Route::get("/path", ok));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::GET, "/path/?q=1"))
        .await
        .unwrap();

    assert_eq!(
        response.headers.get(http::header::LOCATION),
        Some(&HeaderValue::from_static("/path?q=1"))
    );
}

#[tokio::test]
async fn method_not_allowed_lists_allow_header() {
    let router = Router::new("")
        .push(Route::get("/path", ok))
        .push(Route::post("/path", ok));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::PUT, "/path"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    let allow = response.headers.get(http::header::ALLOW).unwrap().to_str().unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("POST"));
}

#[tokio::test]
async fn method_not_allowed_disabled_yields_404() {
    use routed_core::EngineConfig;

    let router = Router::new("").push(Route::get("/path", ok));
    let mut config = EngineConfig::default();
    config.handle_method_not_allowed = false;
    let mut engine = Engine::new().with_config(config).mount("", router);

    let response = engine
        .dispatch_request(request(Method::POST, "/path"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let router = Router::new("").push(Route::get("/path", ok));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::GET, "/nowhere"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn typed_and_wildcard_params_are_extracted() {
    let handler = |ctx: &mut Context| {
        let name = ctx.param("name").unwrap().to_string();
        let last = ctx.param("last_name").unwrap().to_string();
        let wild = ctx.param("wild").unwrap().to_string();
        Box::pin(async move {
            ctx_write_params(name, last, wild);
            Ok(())
        }) as routed_core::middleware::BoxFuture<'_, Result<(), AppError>>
    };

    fn ctx_write_params(_name: String, _last: String, _wild: String) {}

    let router = Router::new("").push(Route::get("/test/{name}/{last_name}/{*wild}", handler));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::GET, "/test/john/smith/is/super/great"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn typed_int_param_falls_through_to_404_on_mismatch() {
    let router = Router::new("").push(Route::get("/users/{id:int}", ok));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::GET, "/users/abc"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn must_get_param_failure_maps_to_500() {
    let handler = |ctx: &mut Context| {
        let result = ctx.must_get_param::<String>("id");
        Box::pin(async move { result.map_err(AppError::from) })
            as routed_core::middleware::BoxFuture<'_, Result<(), AppError>>
    };
    let router = Router::new("").push(Route::get("/users", handler));
    let mut engine = Engine::new().mount("", router);

    let response = engine
        .dispatch_request(request(Method::GET, "/users"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn route_names_are_unique_latest_wins() {
    let router = Router::new("")
        .push(Route::get("/a", ok).named("dup"))
        .push(Route::get("/b", ok).named("dup"));
    let mut engine = Engine::new().mount("", router);
    engine.build().unwrap();

    let dup_routes: Vec<_> = engine
        .get_all_routes()
        .into_iter()
        .filter(|r| r.name.as_deref() == Some("dup"))
        .collect();
    assert_eq!(dup_routes.len(), 1);
    assert_eq!(dup_routes[0].pattern.raw, "/b");
}

#[tokio::test]
async fn named_route_resolves_back_to_its_path() {
    let router = Router::new("").push(Route::get("/users/{id:int}", ok).named("users.show"));
    let mut engine = Engine::new().mount("", router);
    engine.build().unwrap();

    let mut params = std::collections::HashMap::new();
    params.insert("id".to_string(), "42".to_string());
    let path = engine.resolve_named("users.show", &params).unwrap();
    assert_eq!(path, "/users/42");
}

#[tokio::test]
async fn registered_custom_type_gates_the_match() {
    let router = Router::new("").push(Route::get("/colors/{hex:hexcolor}", ok));
    let mut engine = Engine::new().mount("", router);
    engine.register_type("hexcolor", |v: &str| {
        v.len() == 6 && v.bytes().all(|b| b.is_ascii_hexdigit())
    });

    let ok_response = engine
        .dispatch_request(request(Method::GET, "/colors/ff00aa"))
        .await
        .unwrap();
    assert_eq!(ok_response.status, StatusCode::OK);

    let bad_response = engine
        .dispatch_request(request(Method::GET, "/colors/not-hex"))
        .await
        .unwrap();
    assert_eq!(bad_response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_custom_type_fails_at_build() {
    let router = Router::new("").push(Route::get("/colors/{hex:hexcolor}", ok));
    let mut engine = Engine::new().mount("", router);
    assert!(engine.build().is_err());
}

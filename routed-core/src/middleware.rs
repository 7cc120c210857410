//! Middleware chain construction and the `next()` contract.
//!
//! A [`Middleware`] is `(context, next) -> result` where `next` is a
//! single-use continuation; a [`Handler`] is the terminal `(context) ->
//! result`. [`build_chain`] right-folds a route's middleware list over its
//! handler exactly once, at route-build time, into a single `Chain` the
//! dispatcher invokes per request.
//!
//! `Next` is consumed by value on `run`, so calling it twice is a compile
//! error rather than something that has to be checked at runtime — the
//! ownership model gives us that guarantee for free.

use crate::context::Context;
use crate::error::AppError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The terminal handler for a matched route.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), AppError>>;
}

// Note: this blanket impl cannot be generic over a single associated `Fut:
// 'static` the way a naive `Fn(&mut Context) -> Fut` bound would suggest. A
// closure whose body awaits on `ctx` produces a future that borrows that
// `&'a mut Context` argument, so its type is tied to `'a`, not `'static` —
// there is no single `Fut` satisfying `for<'a> Fn(&'a mut Context) -> Fut`
// in that case. Requiring the closure to return the already-boxed,
// borrow-carrying future directly (via `for<'a> Fn(...) -> BoxFuture<'a,
// _>`) sidesteps the issue: callers write `|ctx| Box::pin(async move {
// ... })` instead of a bare async block.
impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), AppError>> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), AppError>> {
        self(ctx)
    }
}

/// A function wrapping a handler or another middleware, with an explicit
/// `next` continuation.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next) -> BoxFuture<'a, Result<(), AppError>>;
}

// See the note on the `Handler` blanket impl above — the same borrow-tied
// future shape rules out a generic `Fut` bound here too.
impl<F> Middleware for F
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, Result<(), AppError>> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next) -> BoxFuture<'a, Result<(), AppError>> {
        self(ctx, next)
    }
}

type ChainFn = dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), AppError>> + Send + Sync;

/// The pre-folded, cacheable invokable for one route.
pub type Chain = Arc<ChainFn>;

/// The continuation a middleware calls to delegate to the remainder of the
/// chain. Bound by the dispatcher when the chain is folded; user code never
/// constructs one directly.
pub struct Next {
    rest: Chain,
}

impl Next {
    fn new(rest: Chain) -> Self {
        Next { rest }
    }

    /// Invoke the remainder of the chain exactly once.
    pub async fn run(self, ctx: &mut Context) -> Result<(), AppError> {
        (self.rest)(ctx).await
    }
}

/// Fold `middlewares` over `handler`, right-to-left, into a single `Chain`:
/// `chain = mw[0] ∘ mw[1] ∘ … ∘ mw[k-1] ∘ handler`.
pub fn build_chain(handler: Arc<dyn Handler>, middlewares: &[Arc<dyn Middleware>]) -> Chain {
    let mut chain: Chain = Arc::new(move |ctx: &mut Context| handler.call(ctx));

    for mw in middlewares.iter().rev() {
        let mw = mw.clone();
        let rest = chain.clone();
        chain = Arc::new(move |ctx: &mut Context| {
            let next = Next::new(rest.clone());
            mw.call(ctx, next)
        });
    }

    chain
}

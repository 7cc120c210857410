//! The accept loop and per-connection HTTP/1.1 driver.
//!
//! This is the crate's one piece of genuinely async-runtime-shaped code: it
//! owns the `TcpListener`, spawns a task per connection, and feeds each
//! request through a caller-supplied dispatch closure. Everything else in
//! this crate is plain data.

use crate::request::{RawRequest, RemoteInfo};
use crate::response::RawResponse;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The function the host (`routed-core`'s engine) supplies to turn a raw
/// request into a raw response. Boxed and cloned per connection/request so
/// the listener doesn't need to know the dispatcher's concrete type.
pub type Dispatch = Arc<dyn Fn(RawRequest) -> BoxFuture<'static, RawResponse> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bind and serve, accepting connections until `shutdown` is cancelled.
///
/// Each accepted connection is handled on its own task. When `shutdown`
/// fires, the loop stops accepting new connections; in-flight connections
/// are left to finish on their own (the engine's drain grace period governs
/// how long the caller waits before giving up on them).
pub async fn serve(
    listener: TcpListener,
    dispatch: Dispatch,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("listener accept loop stopping");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let dispatch = dispatch.clone();
                let conn_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, peer_addr, dispatch, conn_shutdown).await {
                        tracing::warn!(error = %err, %peer_addr, "connection ended with an error");
                    }
                });
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    dispatch: Dispatch,
    shutdown: CancellationToken,
) -> Result<(), ConnectionError> {
    stream.set_nodelay(true).ok();
    let io = TokioIo::new(stream);
    let remote = RemoteInfo::new(peer_addr);

    let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        let dispatch = dispatch.clone();
        let remote = remote.clone();
        async move {
            let raw = RawRequest::from_hyper(req, remote);
            let response = dispatch(raw).await;
            Ok::<_, Infallible>(response.into_hyper())
        }
    });

    let conn = hyper::server::conn::http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result.map_err(ConnectionError::from),
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await.map_err(ConnectionError::from)
        }
    }
}

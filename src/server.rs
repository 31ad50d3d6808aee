//! HTTP server lifecycle and graceful shutdown.
//!
//! ```text
//! Server::bind ──► Created
//!      │ listen()            bind, spawn the accept loop, return at once
//!      ▼
//! Listening ─────────────── accepting; one task per connection
//!      │ shutdown()          or the Listening handle is dropped
//!      ▼
//! ShuttingDown ──────────── listener closed, open connections finish
//!      │                     their in-flight request, bounded by the grace period
//!      ▼
//! Stopped                    final; there is no restart
//! ```
//!
//! Set the grace period shorter than whatever will eventually kill the
//! process (Kubernetes' `terminationGracePeriodSeconds`, default 30 s).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;

/// Where the server is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

/// A configured, not yet listening server.
pub struct Server {
    addr: SocketAddr,
    grace: Duration,
    body: BodyLimits,
}

/// Bounds on buffering a request body before the pipeline runs.
#[derive(Clone, Copy, Debug)]
struct BodyLimits {
    max_bytes: usize,
    read_timeout: Duration,
}

impl Server {
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
    pub const DEFAULT_BODY_READ_TIMEOUT: Duration = Duration::from_secs(25);

    /// Configures the server to bind to `addr` when [`listen`](Server::listen)
    /// is called.
    ///
    /// ```rust
    /// use tally::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 8080).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self {
            addr,
            grace: Self::DEFAULT_GRACE,
            body: BodyLimits {
                max_bytes: Self::DEFAULT_MAX_BODY_BYTES,
                read_timeout: Self::DEFAULT_BODY_READ_TIMEOUT,
            },
        }
    }

    /// How long [`Listening::shutdown`] waits for open connections.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Larger request bodies are answered `413` without running the handler.
    pub fn max_body_bytes(mut self, max_bytes: usize) -> Self {
        self.body.max_bytes = max_bytes;
        self
    }

    /// A body that has not fully arrived by then is answered `408`.
    pub fn body_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.body.read_timeout = read_timeout;
        self
    }

    pub fn state(&self) -> State {
        State::Created
    }

    /// Binds the listener and starts accepting on a background task.
    ///
    /// Returns as soon as the socket is bound. A bind failure is returned as
    /// [`Error::Bind`] and nothing is spawned.
    pub async fn listen(self, router: Router) -> Result<Listening, Error> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| Error::Bind { addr: self.addr, source })?;
        let local_addr = listener.local_addr()?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(State::Listening);

        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::new(router),
            stop_rx,
            state_tx,
            self.grace,
            self.body,
        ));

        info!(addr = %local_addr, "server listening");
        Ok(Listening { local_addr, stop: stop_tx, state: state_rx, accept })
    }
}

/// Handle to a running server.
///
/// Dropping it stops the server the same way [`shutdown`](Listening::shutdown)
/// does, but nobody observes the outcome.
pub struct Listening {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
    state: watch::Receiver<State>,
    accept: JoinHandle<Result<(), Error>>,
}

impl Listening {
    /// The bound address; useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.state.clone()
    }

    /// Stops accepting, lets in-flight requests finish within the grace
    /// period, and waits for the server to reach [`State::Stopped`].
    pub async fn shutdown(self) -> Result<(), Error> {
        self.stop.send_replace(true);
        self.accept.await?
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    mut stop: watch::Receiver<bool>,
    state: watch::Sender<State>,
    grace: Duration,
    body: BodyLimits,
) -> Result<(), Error> {
    // JoinSet tracks every connection task so shutdown can wait for them.
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Check the stop signal first so no queued connection is accepted
            // once shutdown has begun.
            biased;

            () = stopped(&mut stop) => break,

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                tasks.spawn(serve_connection(stream, remote_addr, Arc::clone(&router), body, stop.clone()));
            }

            // Reap finished connection tasks so the set does not grow without bound.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    state.send_replace(State::ShuttingDown);
    info!(in_flight = tasks.len(), grace = ?grace, "shutting down, draining connections");

    let drain = async { while tasks.join_next().await.is_some() {} };
    let result = match tokio::time::timeout(grace, drain).await {
        Ok(()) => Ok(()),
        Err(_) => {
            let in_flight = tasks.len();
            warn!(in_flight, "grace period elapsed, aborting connections");
            tasks.shutdown().await;
            Err(Error::ShutdownTimeout { grace, in_flight })
        }
    };

    state.send_replace(State::Stopped);
    info!("server stopped");
    result
}

/// Serves one connection until the client closes it or shutdown asks it to
/// finish its in-flight request and close.
async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    router: Arc<Router>,
    body: BodyLimits,
    mut stop: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);

    // Called once per request on the connection, not once per connection.
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { dispatch(router, req, remote_addr, body).await }
    });

    // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever the client speaks.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(peer = %remote_addr, "connection error: {e}");
                }
                break;
            }
            () = stopped(&mut stop), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Resolves once shutdown is requested. A dropped [`Listening`] handle
/// counts as a request.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers one request, runs it through the router, and hands hyper the
/// response. Every failure is a response, so hyper never sees an error.
///
/// A body that is too large, too slow or broken is not handed to a route
/// handler, but the request still passes through the middleware chain so it
/// is logged under its request id like any other.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    limits: BodyLimits,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let collected = tokio::time::timeout(
        limits.read_timeout,
        Limited::new(body, limits.max_bytes).collect(),
    )
    .await;

    let rejection = match collected {
        Ok(Ok(collected)) => {
            let req = Request::from_http(http::Request::from_parts(parts, collected.to_bytes()), remote_addr);
            return Ok(router.handle(req).await.into_inner());
        }
        Ok(Err(e)) if e.is::<LengthLimitError>() => (Status::PayloadTooLarge, e.to_string()),
        Ok(Err(e)) => (Status::BadRequest, e.to_string()),
        Err(_) => (Status::RequestTimeout, format!("body not received within {:?}", limits.read_timeout)),
    };

    let (status, reason) = rejection;
    let req = Request::from_http(http::Request::from_parts(parts, Bytes::new()), remote_addr);
    warn!(request_id = req.context().request_id(), peer = %remote_addr, "failed to read request body: {reason}");
    Ok(router.reject(req, status).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGINT (Ctrl-C) or SIGTERM the process receives.
///
/// On Windows only Ctrl-C is available. If a handler cannot be installed the
/// failure is logged and that signal is never reported.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::handler::{self, ControlFlow, HandlerConfig};
use crate::pool::Pool;
use crate::query;
use crate::response::{self, Status};
use crate::store::STORE;
use crate::transport::{self, TransportError};

/// Client requests that carry this literal payload end the session without
/// being parsed as a query (spec.md §6).
const EXIT_CLIENT_SESSION: &[u8] = b"EXIT_CLIENT_SESSION";

/// How long `accept` blocks before the acceptor loop re-checks the
/// shutdown flag. Short enough that `stop()` returns promptly, long
/// enough not to busy-loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-connection receive timeout (spec.md §4.1/§5): a client that neither
/// sends a full frame nor disconnects within this window is torn down.
const SESSION_RECEIVE_TIMEOUT: Duration = Duration::from_secs(300);

/// The process-wide atomic stop signal (C11). Cloning shares the same
/// underlying flags and `watch` sender, so every session and the acceptor
/// observe the same shutdown state. `request` is idempotent via
/// compare-and-swap on `stop_initiated`, exactly as the original
/// `Server::stop`.
#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    stop_initiated: Arc<AtomicBool>,
    sender: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (
            Shutdown {
                flag: Arc::new(AtomicBool::new(false)),
                stop_initiated: Arc::new(AtomicBool::new(false)),
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    #[must_use]
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// A fresh `watch::Receiver` on this shutdown signal. Sessions
    /// subscribe once at the start of their loop so `request()` (called
    /// any time afterwards) wakes a session that is parked inside a
    /// receive, instead of leaving it blocked for the full per-call
    /// timeout.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn request(&self) {
        if self
            .stop_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.flag.store(true, Ordering::SeqCst);
            let _ = self.sender.send(true);
        }
    }
}

pub struct ServerBuilder {
    port: u16,
    addr: IpAddr,
    backlog: u32,
}

impl ServerBuilder {
    #[must_use]
    pub fn listen(mut self, addr: IpAddr) -> ServerBuilder {
        self.addr = addr;
        self
    }

    #[must_use]
    pub fn on(mut self, port: u16) -> ServerBuilder {
        self.port = port;
        self
    }

    /// Sets the listen backlog. Per spec.md §4.9 this is
    /// `max(5, 2*pool_size)`, clamped to whatever the OS accepts.
    #[must_use]
    pub fn backlog(mut self, backlog: u32) -> ServerBuilder {
        self.backlog = backlog;
        self
    }

    ///
    /// Build the server, binding and listening on the configured address
    ///
    /// # Errors
    /// If we fail to bind to the socket
    ///
    pub async fn build(self) -> std::io::Result<Server> {
        let address: SocketAddr = (self.addr, self.port).into();
        let socket = match address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(address)?;
        let listener = socket.listen(self.backlog)?;
        // Re-read the bound address rather than trusting the requested one:
        // a requested port of 0 (used by tests) is only resolved to its
        // actual ephemeral port once the socket is listening.
        let address = listener.local_addr()?;
        Ok(Server {
            listener: Arc::new(listener),
            address,
        })
    }
}

#[cfg_attr(any(debug_assertions, test), derive(Debug))]
pub struct Server {
    listener: Arc<TcpListener>,
    address: SocketAddr,
}

impl Server {
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            port: 12345,
            addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            backlog: 5,
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Runs the acceptor loop (C9): accept connections, hand each off to
    /// the worker pool (C8) as a session task, and watch `shutdown` between
    /// (and during) accepts so the server stops promptly.
    #[instrument(skip(self, shutdown), fields(addr = %self.address))]
    pub async fn run(&self, shutdown: Shutdown) {
        info!("listening");

        let pool_size = Config::get(|config| config.thread_pool_size).await;
        let mut pool = Pool::new(pool_size);

        loop {
            if shutdown.requested() {
                break;
            }

            match tokio::time::timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    if shutdown.requested() {
                        drop(stream);
                        break;
                    }
                    let session_shutdown = shutdown.clone();
                    let enqueued = pool.enqueue(async move {
                        if let Err(err) = run_session(stream, peer, session_shutdown).await {
                            warn!(%err, %peer, "session ended abnormally");
                        }
                    });
                    if !enqueued {
                        warn!(%peer, "pool is stopping, dropping accepted connection");
                        break;
                    }
                }
                Ok(Err(err)) => error!(%err, "accept failed"),
                Err(_) => continue,
            }
        }

        pool.stop().await;
        info!("acceptor stopped");
    }
}

/// Runs the per-connection read-parse-lock-dispatch-respond loop (C9's
/// session task). Transport failures (timeout, truncated frame, oversize
/// length, peer close) are not reported to the peer; they simply end the
/// session.
#[instrument(skip(stream, shutdown), fields(%peer))]
async fn run_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    shutdown: Shutdown,
) -> Result<(), TransportError> {
    let config = HandlerConfig {
        data_root: Config::get(|config| config.server_data_root_dir.clone()).await,
        subdir: None,
    };
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        if shutdown.requested() {
            break;
        }

        let payload = tokio::select! {
            result = transport::receive(&mut stream, SESSION_RECEIVE_TIMEOUT) => match result {
                Ok(payload) => payload,
                Err(err) => {
                    info!(%err, "closing session");
                    return Ok(());
                }
            },
            _ = shutdown_rx.changed() => {
                info!("shutdown requested, closing idle session");
                return Ok(());
            }
        };

        if payload == EXIT_CLIENT_SESSION {
            break;
        }

        let query = String::from_utf8_lossy(&payload).into_owned();
        let command = match query::parse(&query) {
            Ok(command) => command,
            Err(err) => {
                response::send_error(&mut stream, Status::BadRequest, err.to_string()).await?;
                continue;
            }
        };

        let flow = if handler::is_write_op(&command) {
            let mut store = STORE.write().await;
            handler::dispatch_write(&mut stream, &mut store, &config, command).await?;
            ControlFlow::Continue
        } else {
            let store = STORE.read().await;
            handler::dispatch_read(&mut stream, &store, command, &query).await?
        };

        if flow == ControlFlow::Break {
            break;
        }
    }

    Ok(())
}

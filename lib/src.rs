#![forbid(unsafe_code)]

use std::io;
use std::net::{IpAddr, Ipv6Addr};

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::server::{Server, Shutdown};

pub mod config;
pub mod date;
pub mod handler;
pub mod ip;
pub mod pool;
pub mod query;
pub mod response;
pub mod sandbox;
pub mod server;
pub mod store;
pub mod tariff;
pub mod transport;

/// Spawns the acceptor/session-loop server (C9) and returns a handle that
/// resolves once `shutdown` fires and the acceptor (and its worker pool)
/// have drained.
///
/// # Errors
/// If the configured port cannot be bound.
pub async fn spawn(shutdown: Shutdown) -> Result<JoinHandle<()>, io::Error> {
    let port = Config::get(|config| config.port).await;
    let pool_size = Config::get(|config| config.thread_pool_size).await;
    let backlog = (2 * pool_size as u32).max(5);

    let server = Server::builder()
        .listen(IpAddr::V6(Ipv6Addr::UNSPECIFIED))
        .on(port)
        .backlog(backlog)
        .build()
        .await?;

    info!(%port, %pool_size, %backlog, "starting server");

    if let Some(tariff_path) = Config::get(|config| config.tariff_file_path.clone()).await {
        if let Err(err) = tariff::load(&tariff_path).await {
            tracing::warn!(%err, path = %tariff_path, "failed to load tariff file at startup");
        }
    }

    Ok(tokio::spawn(async move { server.run(shutdown).await }))
}

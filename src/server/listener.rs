use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use tokio::net::TcpListener;
use tracing::{Instrument, info, info_span, warn};

use crate::config::ServerConfig;
use crate::engine::QueryEngine;
use crate::server::connection::handle_connection;
use crate::server::session::Session;

/// TCP server implementing PostgreSQL wire protocol.
pub struct Server<E: QueryEngine> {
    listener: TcpListener,
    next_pid: AtomicI32,
    engine: Arc<E>,
    config: Arc<ServerConfig>,
}

impl<E: QueryEngine> Server<E> {
    /// Creates a new server with a given listener and engine.
    pub fn new(listener: TcpListener, engine: Arc<E>, config: Arc<ServerConfig>) -> Self {
        Self {
            listener,
            next_pid: AtomicI32::new(1),
            engine,
            config,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts accepting connections and serving clients, one task each.
    pub async fn serve(self) -> Result<(), std::io::Error> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            let session = Session::new(pid, rand::random::<i32>());
            let engine = self.engine.clone();
            let config = self.config.clone();

            let span = info_span!("connection", pid, %peer);
            tokio::spawn(
                async move {
                    info!("accepted");
                    if let Err(e) = handle_connection(socket, session, engine, config).await {
                        warn!(error = %e, "connection error");
                    }
                    info!("closed");
                }
                .instrument(span),
            );
        }
    }
}

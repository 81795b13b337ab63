//! Web server for the shared file.

pub mod routes;

pub use routes::build_router;

use axum::Router;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Error starting server on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Server failed")]
    Serve(#[source] io::Error),

    #[error("Server task panicked: {0}")]
    Panicked(String),

    #[error("Server stopped unexpectedly")]
    Exited,
}

/// Configuration for the web server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on (defaults to all interfaces).
    pub bind_ip: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

/// Bind the listening socket.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = config.addr();
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Start serving `router` on `listener` in a background task.
pub fn spawn(listener: TcpListener, router: Router) -> io::Result<ServerHandle> {
    let local_addr = listener.local_addr()?;
    let task = tokio::spawn(async move { axum::serve(listener, router).await });
    tracing::debug!(%local_addr, "Server task started");
    Ok(ServerHandle {
        task,
        local_addr,
        finished: false,
    })
}

/// Owned handle to the running server task.
#[derive(Debug)]
pub struct ServerHandle {
    task: JoinHandle<io::Result<()>>,
    local_addr: SocketAddr,
    // A JoinHandle must not be polled again once it has yielded its output
    finished: bool,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolve once the server task ends, with the reason it ended.
    ///
    /// The serve loop only returns on failure. Cancel safe.
    pub async fn failed(&mut self) -> ServerError {
        if self.finished {
            return ServerError::Exited;
        }
        let result = (&mut self.task).await;
        self.finished = true;
        match result {
            Ok(Ok(())) => ServerError::Exited,
            Ok(Err(e)) => ServerError::Serve(e),
            Err(e) if e.is_panic() => ServerError::Panicked(panic_message(e.into_panic())),
            Err(_) => ServerError::Exited,
        }
    }

    /// Stop the server, dropping in-flight connections.
    pub async fn shutdown(self) {
        if self.finished {
            return;
        }
        self.task.abort();
        match self.task.await {
            Err(e) if e.is_cancelled() => tracing::debug!("Server task stopped"),
            Err(e) => tracing::warn!(error = %e, "Server task ended abnormally"),
            Ok(_) => tracing::debug!("Server task had already finished"),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precheck::ServeTarget;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn loopback(port: u16) -> ServerConfig {
        ServerConfig {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.addr().to_string(), "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_bind_busy_port_fails() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = held.local_addr().unwrap().port();

        match bind(&loopback(port)).await {
            Err(ServerError::Bind { addr, .. }) => assert_eq!(addr.port(), port),
            other => panic!("Expected Bind error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawned_server_answers_and_shuts_down() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"over the wire").unwrap();
        let target = Arc::new(ServeTarget::resolve(&path).unwrap());

        let listener = bind(&loopback(0)).await.unwrap();
        let handle = spawn(listener, build_router(target)).unwrap();
        let addr = handle.local_addr();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hello.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8_lossy(&raw);

        assert!(text.starts_with("HTTP/1.1 200"));
        assert!(text.ends_with("over the wire"));

        handle.shutdown().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }
}

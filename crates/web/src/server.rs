//! Server construction, transport selection and the accept loop.
//!
//! The configured address string selects the whole transport: a leading
//! `/` marks a filesystem path for a unix domain socket, anything else is
//! a `host:port` TCP address. Unix binds recover from stale socket files
//! left by an unclean shutdown; a socket held by a live process is fatal.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use wisp_http::connection::HttpConnection;
use wisp_http::handler::Handler;

use crate::lifecycle::{Lifecycle, spawn_signal_watcher};

/// The listening transport, selected from one configured address string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddr {
    /// Filesystem path of a unix domain socket.
    Unix(PathBuf),
    /// `host:port` TCP address.
    Tcp(String),
}

impl BindAddr {
    /// A leading path separator selects a unix socket, anything else TCP.
    pub fn parse(addr: &str) -> Self {
        if addr.starts_with('/') {
            Self::Unix(PathBuf::from(addr))
        } else {
            Self::Tcp(addr.to_string())
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix(_))
    }
}

impl std::fmt::Display for BindAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "{}", addr),
        }
    }
}

/// Unrecoverable startup errors; these abort the process.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("can't bind to {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("can't start server, {path:?} is already in use by a live listener")]
    AddressInUse { path: PathBuf },

    #[error("can't erase stale socket {path:?}: {source}")]
    StaleSocket { path: PathBuf, source: io::Error },

    #[error("can't set permissions on socket {path:?}: {source}")]
    SocketPermissions { path: PathBuf, source: io::Error },
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("handler must be set")]
    MissingHandler,
    #[error("address must be set")]
    MissingAddress,
}

pub struct ServerBuilder<H> {
    address: Option<String>,
    handler: Option<H>,
    lifecycle: Option<Arc<Lifecycle>>,
}

impl<H: Handler + 'static> ServerBuilder<H> {
    fn new() -> Self {
        Self { address: None, handler: None, lifecycle: None }
    }

    /// Sets the configured address string (`/path` or `host:port`).
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn build(self) -> Result<Server<H>, ServerBuildError> {
        let handler = self.handler.ok_or(ServerBuildError::MissingHandler)?;
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?;
        let lifecycle = self.lifecycle.unwrap_or_default();
        Ok(Server { address, handler: Arc::new(handler), lifecycle })
    }
}

pub struct Server<H> {
    address: String,
    handler: Arc<H>,
    lifecycle: Arc<Lifecycle>,
}

impl<H: Handler + 'static> Server<H> {
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder::new()
    }

    /// The lifecycle this server drives; register cleanups here.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Binds the configured transport and serves connections until the
    /// process is terminated by the signal watcher.
    pub async fn serve(self) -> Result<(), ServeError> {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

        let addr = BindAddr::parse(&self.address);
        info!("listening on {}", addr);

        // one-shot readiness: collaborators blocked on startup may
        // proceed as soon as the bind attempt begins
        self.lifecycle.signal_ready();

        spawn_signal_watcher(Arc::clone(&self.lifecycle), addr.clone());

        match addr {
            BindAddr::Unix(path) => {
                let listener = bind_unix(&path)?;
                loop {
                    let (stream, _remote_addr) = match listener.accept().await {
                        Ok(stream_and_addr) => stream_and_addr,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    };
                    serve_connection(stream, Arc::clone(&self.handler));
                }
            }
            BindAddr::Tcp(authority) => {
                let listener = TcpListener::bind(authority.as_str())
                    .await
                    .map_err(|source| ServeError::Bind { addr: authority.clone(), source })?;
                loop {
                    let (stream, _remote_addr) = match listener.accept().await {
                        Ok(stream_and_addr) => stream_and_addr,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    };
                    serve_connection(stream, Arc::clone(&self.handler));
                }
            }
        }
    }
}

fn serve_connection<H, S>(stream: S, handler: Arc<H>)
where
    H: Handler + 'static,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        let (reader, writer) = tokio::io::split(stream);
        let connection = HttpConnection::new(reader, writer);
        match connection.process(handler).await {
            Ok(()) => {
                info!("finished process, connection shutdown");
            }
            Err(e) => {
                error!("service has error, cause {}, connection shutdown", e);
            }
        }
    });
}

/// Binds a unix domain socket, recovering once from a stale socket file.
///
/// On bind failure the existing socket is probed with a client connect: a
/// successful probe means another live process holds it (fatal), a failed
/// probe means the file was left by an unclean shutdown, so it is erased
/// and the bind retried exactly once. Any successfully bound socket file
/// gets permission mode 0770.
fn bind_unix(path: &Path) -> Result<UnixListener, ServeError> {
    let listener = match UnixListener::bind(path) {
        Ok(listener) => listener,
        Err(bind_error) => match std::os::unix::net::UnixStream::connect(path) {
            Ok(_live) => {
                error!("can't start server, address {} is already in use", path.display());
                return Err(ServeError::AddressInUse { path: path.to_path_buf() });
            }
            Err(_) => {
                info!(cause = %bind_error, "the socket {} does not look consumed, erasing", path.display());
                fs::remove_file(path)
                    .map_err(|source| ServeError::StaleSocket { path: path.to_path_buf(), source })?;
                UnixListener::bind(path)
                    .map_err(|source| ServeError::Bind { addr: path.display().to_string(), source })?
            }
        },
    };

    fs::set_permissions(path, fs::Permissions::from_mode(0o770))
        .map_err(|source| ServeError::SocketPermissions { path: path.to_path_buf(), source })?;

    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_socket(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wisp-server-{}-{}.sock", label, std::process::id()))
    }

    #[test]
    fn leading_separator_selects_unix() {
        assert_eq!(BindAddr::parse("/var/run/app.sock"), BindAddr::Unix(PathBuf::from("/var/run/app.sock")));
        assert!(BindAddr::parse("/var/run/app.sock").is_unix());
    }

    #[test]
    fn anything_else_selects_tcp() {
        assert_eq!(BindAddr::parse("127.0.0.1:8080"), BindAddr::Tcp("127.0.0.1:8080".to_string()));
        assert_eq!(BindAddr::parse("localhost:80"), BindAddr::Tcp("localhost:80".to_string()));
    }

    #[tokio::test]
    async fn stale_socket_is_erased_and_rebound() {
        let path = temp_socket("stale");
        let _ = fs::remove_file(&path);

        // a listener that exits without cleanup leaves its file behind
        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());

        let listener = bind_unix(&path).unwrap();
        assert!(path.exists());

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o770);

        drop(listener);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn live_socket_is_fatal_and_left_untouched() {
        let path = temp_socket("live");
        let _ = fs::remove_file(&path);

        let live = UnixListener::bind(&path).unwrap();

        let result = bind_unix(&path);
        assert!(matches!(result, Err(ServeError::AddressInUse { .. })));
        assert!(path.exists());

        drop(live);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn fresh_bind_sets_socket_mode() {
        let path = temp_socket("fresh");
        let _ = fs::remove_file(&path);

        let listener = bind_unix(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o770);

        drop(listener);
        let _ = fs::remove_file(&path);
    }
}

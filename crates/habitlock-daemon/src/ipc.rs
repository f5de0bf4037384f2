use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use habitlock_proto::daemon::{read_request, write_line};
use habitlock_proto::{IpcRequest, IpcResponse, ProtoError};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::DaemonError;
use crate::trigger::RefreshSignal;

/// Local control socket. Requests only enqueue work; the answer never waits
/// for a cycle to run.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    signal: RefreshSignal,
    connection_timeout: Duration,
}

impl IpcServer {
    /// Bind the socket, replacing a stale one left by a previous run.
    pub async fn bind(
        socket_path: &Path,
        signal: RefreshSignal,
        connection_timeout: Duration,
    ) -> Result<Self, DaemonError> {
        if let Ok(meta) = fs::symlink_metadata(socket_path) {
            use std::os::unix::fs::FileTypeExt;
            if !meta.file_type().is_socket() {
                return Err(DaemonError::Config(format!(
                    "{} exists and is not a socket",
                    socket_path.display()
                )));
            }
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(DaemonError::Config(format!(
                    "another daemon is already listening on {}",
                    socket_path.display()
                )));
            }
            debug!("Removing stale socket {}", socket_path.display());
            fs::remove_file(socket_path).map_err(ProtoError::from)?;
        }

        let listener = UnixListener::bind(socket_path).map_err(|e| {
            DaemonError::Config(format!("failed to bind socket {}: {}", socket_path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))
                .map_err(ProtoError::from)?;
        }

        info!("Listening for requests on {}", socket_path.display());
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            signal,
            connection_timeout,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until shutdown, then remove the socket file.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let signal = self.signal.clone();
                            let limit = self.connection_timeout;
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &signal, limit).await {
                                    debug!("Client connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => warn!("Accept error: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        if let Err(e) = fs::remove_file(&self.socket_path) {
            warn!("Failed to remove socket {}: {}", self.socket_path.display(), e);
        }
        debug!("Control socket closed");
    }
}

/// Map a request to its answer, enqueueing a cycle where one is asked for.
pub fn dispatch(request: IpcRequest, signal: &RefreshSignal) -> IpcResponse {
    match request {
        IpcRequest::Ping => {}
        IpcRequest::Refresh => {
            info!("Refresh requested over socket");
            signal.request();
        }
        IpcRequest::Reset => {
            info!("Reset requested over socket");
            signal.request_reset();
        }
    }
    request.success_response()
}

async fn handle_connection(
    mut stream: UnixStream,
    signal: &RefreshSignal,
    limit: Duration,
) -> Result<(), ProtoError> {
    let exchange = async {
        let (mut reader, mut writer) = stream.split();
        let response = match read_request(&mut reader).await {
            Ok(request) => dispatch(request, signal),
            Err(e) => {
                debug!("Rejected request: {}", e);
                IpcResponse::Error
            }
        };
        write_line(&mut writer, response.as_str()).await
    };

    tokio::time::timeout(limit, exchange).await.map_err(|_| ProtoError::Timeout(limit))?
}

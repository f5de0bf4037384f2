use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use habitlock_proto::{send_request, IpcRequest, IpcResponse};

pub async fn send(socket: &Path, request: IpcRequest, timeout: Duration) -> Result<()> {
    let response = send_request(socket, request, timeout)
        .await
        .with_context(|| format!("Failed to reach daemon at {}", socket.display()))?;

    match response {
        IpcResponse::Pong => println!("pong"),
        IpcResponse::Ok if request == IpcRequest::Reset => {
            println!("✓ Reset queued, blocking will be removed")
        }
        IpcResponse::Ok => println!("✓ Refresh queued"),
        IpcResponse::Error => bail!("Daemon rejected request '{}'", request),
    }

    Ok(())
}

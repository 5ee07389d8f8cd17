//! UDS JSON-RPC control socket: minimal hand-rolled implementation,
//! connection-per-request, newline-delimited JSON. Not started unless
//! `fleetd daemon --control-socket` is passed.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use fleet_daemon::{Activator, RotationCtx};

use crate::snapshot::build_snapshot;

pub async fn run_server(
    socket_path: &Path,
    ctx: RotationCtx,
    activator: Activator,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let socket_dir = socket_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;
    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if socket_path.exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!(path = %socket_path.display(), "removed stale control socket");
        } else {
            anyhow::bail!("another fleetd is already listening on {}", socket_path.display());
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(path = %socket_path.display(), "control socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let ctx = ctx.clone();
                let activator = activator.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx, activator).await {
                        tracing::debug!(error = %e, "control socket connection error");
                    }
                });
            }
            _ = cancel.cancelled() => {
                let _ = std::fs::remove_file(socket_path);
                return Ok(());
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: RotationCtx, activator: Activator) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let result = match method {
        "status" => match build_snapshot(&ctx.store) {
            Ok(snapshot) => serde_json::to_value(snapshot)?,
            Err(e) => {
                return write_error(&mut writer, id, -32000, &e.to_string()).await;
            }
        },
        "activate" => match activator.activate().await {
            Ok(outcome) => serde_json::to_value(outcome)?,
            Err(e) => serde_json::to_value(e.into_outcome())?,
        },
        _ => {
            return write_error(&mut writer, id, -32601, "method not found").await;
        }
    };

    write_response(&mut writer, id, result).await
}

async fn write_response(
    writer: &mut (impl AsyncWriteExt + Unpin),
    id: serde_json::Value,
    result: serde_json::Value,
) -> anyhow::Result<()> {
    let response = serde_json::json!({"jsonrpc": "2.0", "result": result, "id": id});
    let mut body = serde_json::to_string(&response)?;
    body.push('\n');
    writer.write_all(body.as_bytes()).await?;
    Ok(())
}

async fn write_error(
    writer: &mut (impl AsyncWriteExt + Unpin),
    id: serde_json::Value,
    code: i64,
    message: &str,
) -> anyhow::Result<()> {
    let response = serde_json::json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    });
    let mut body = serde_json::to_string(&response)?;
    body.push('\n');
    writer.write_all(body.as_bytes()).await?;
    Ok(())
}

//! Newline-delimited JSON-RPC over stdio. Stdout carries protocol frames
//! only; logs go to stderr.

use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handlers::{self, GatewayState};
use crate::rpc::{RpcRequest, RpcResponse, INVALID_REQUEST, JSONRPC_VERSION};

/// Handle one inbound line. `None` when nothing should be written back.
pub fn handle_line(state: &GatewayState, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let response = match serde_json::from_str::<RpcRequest>(line) {
        Err(e) => {
            debug!(error = %e, "unparseable frame");
            Some(RpcResponse::parse_error())
        }
        Ok(request) if request.jsonrpc.as_deref() != Some(JSONRPC_VERSION) => request
            .id
            .map(|id| RpcResponse::error(Some(id), INVALID_REQUEST, "jsonrpc must be \"2.0\"")),
        Ok(request) => {
            let params = request.params.unwrap_or_else(|| json!({}));
            handlers::dispatch(state, &request.method, &params, request.id)
        }
    }?;

    match serde_json::to_string(&response) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "response serialization failed");
            None
        }
    }
}

/// Serve until `reader` reaches EOF.
pub async fn serve<R, W>(state: &GatewayState, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(frame) = handle_line(state, &line) {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    Ok(())
}

/// Serve the MCP protocol on this process's stdin/stdout.
pub async fn run_stdio(state: GatewayState) -> Result<()> {
    info!(base = %state.guard.base().display(), "mcp gateway started");
    serve(&state, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    info!("mcp gateway stdin closed");
    Ok(())
}

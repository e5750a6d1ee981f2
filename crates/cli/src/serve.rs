//! Daemon mode – line-delimited JSON requests over a Unix socket.
//!
//! Methods: `call` (`{"cmd", "args"}`), `probe` (`{"target"}`) and
//! `commands`. One context is shared by every connection, so a login over
//! one connection is visible to the next.

use anyhow::{Context, Result};
use engine::types::*;
use engine::{AppContext, CommandRegistry};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

pub async fn run_daemon(
    socket_path: PathBuf,
    ctx: AppContext,
    registry: CommandRegistry,
) -> Result<()> {
    // Remove stale socket if it exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("cannot bind socket {}", socket_path.display()))?;

    tracing::info!(socket = %socket_path.display(), "maintctl daemon listening");

    let shared = Arc::new((ctx, registry));
    loop {
        let (stream, _addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let shared = shared.clone();
        tokio::spawn(async move {
            let (ctx, registry) = &*shared;
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let response = handle_request(&line, ctx, registry).await;
                let mut resp_json =
                    serde_json::to_string(&response).unwrap_or_else(|_| "{}".into());
                resp_json.push('\n');
                if writer.write_all(resp_json.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
    }

    let _ = std::fs::remove_file(&socket_path);
    tracing::info!("maintctl daemon stopped");
    Ok(())
}

async fn handle_request(
    line: &str,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> DaemonResponse {
    let req: DaemonRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return DaemonResponse::rejected("unknown".into(), format!("invalid JSON request: {}", e)),
    };
    tracing::debug!(id = %req.id, method = %req.method, "daemon request");

    let result = match req.method.as_str() {
        "call" => {
            let cmd_name = req.params.get("cmd").and_then(|v| v.as_str()).unwrap_or("");
            let args = req
                .params
                .get("args")
                .cloned()
                .unwrap_or(Value::Object(Default::default()));
            registry.execute(cmd_name, args, ctx).await
        }
        "probe" => {
            let target = req
                .params
                .get("target")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            engine::probes::run_probe(target, ctx).await
        }
        "commands" => {
            let listing: serde_json::Map<String, Value> = registry
                .list()
                .into_iter()
                .map(|name| {
                    let role = registry
                        .min_role(name)
                        .map(|r| Value::String(r.to_string()))
                        .unwrap_or(Value::Null);
                    (name.to_string(), role)
                })
                .collect();
            Run::start("daemon", "commands").pass().with_data(Value::Object(listing))
        }
        other => return DaemonResponse::rejected(req.id, format!("unknown method: {}", other)),
    };

    DaemonResponse::answered(req.id, result)
}

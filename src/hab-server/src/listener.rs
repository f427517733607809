// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-TCP listener for habd.
//!
//! Accepts client connections speaking the `ClientEnvelope`/`ClientResponse`
//! protocol defined in `hab-protocol`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use hab_core::{ThingCommand, ThingRequest};
use hab_protocol::{
    client_command_to_route, encode_response, parse_envelope, ClientResponse, Route,
    TokenValidator,
};

use crate::thing_handle::ThingHandle;
use crate::thing_task::wait_for_shutdown;

/// Shared state every client connection needs.
#[derive(Clone)]
pub struct ListenerContext {
    pub things: Arc<HashMap<String, ThingHandle>>,
    pub thing_types: Arc<Vec<String>>,
    pub validator: Arc<dyn TokenValidator>,
}

/// Run the JSON TCP listener, accepting client connections until shutdown.
pub async fn run_listener(
    addr: SocketAddr,
    ctx: ListenerContext,
    shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = wait_for_shutdown(shutdown_rx.clone()) => {
                info!("Listener on {} shutting down", addr);
                return Ok(());
            }
        };
        info!("Client connected: {}", peer);

        let ctx = ctx.clone();
        let client_shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = handle_client(socket, peer, ctx) => {
                    if let Err(e) = result {
                        error!("Client {} error: {:?}", peer, e);
                    }
                }
                _ = wait_for_shutdown(client_shutdown_rx) => {}
            }
        });
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    ctx: ListenerContext,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("Client {} disconnected", addr);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let resp = handle_line(trimmed, addr, &ctx).await;
        writer.write_all(encode_response(&resp).as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Answer one request line.
pub async fn handle_line(line: &str, addr: SocketAddr, ctx: &ListenerContext) -> ClientResponse {
    let envelope = match parse_envelope(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!("Invalid JSON from {}: {} / {:?}", addr, line, e);
            return ClientResponse::error(None, format!("Invalid JSON: {}", e));
        }
    };

    if let Err(err) = ctx.validator.validate(envelope.token.as_deref()) {
        warn!("Rejected request from {}: {}", addr, err);
        return ClientResponse::error(None, err.to_string());
    }

    let route = match client_command_to_route(envelope.cmd) {
        Ok(route) => route,
        Err(msg) => return ClientResponse::error(Some(hab_core::ErrorKind::InvalidCommand), msg),
    };

    let (uid, cmd) = match route {
        Route::ListThings => {
            let mut snapshots: Vec<_> = ctx.things.values().map(ThingHandle::snapshot).collect();
            snapshots.sort_by(|a, b| a.uid.cmp(&b.uid));
            return ClientResponse::things(snapshots);
        }
        Route::ListThingTypes => return ClientResponse::thing_types(ctx.thing_types.to_vec()),
        Route::Thing { uid, cmd } => (uid, cmd),
    };

    let Some(handle) = ctx.things.get(&uid) else {
        return ClientResponse::error(None, format!("Unknown thing '{}'", uid));
    };

    // Fast path: serve snapshots directly from the watch channel so clients
    // get a response even while the thing task is busy with the device.
    if matches!(cmd, ThingCommand::GetSnapshot) {
        return ClientResponse::thing(handle.snapshot());
    }

    let (resp_tx, resp_rx) = oneshot::channel();
    let req = ThingRequest {
        cmd,
        respond_to: resp_tx,
    };

    if let Err(e) = handle.tx.send(req).await {
        error!("Failed to send request to thing task {}: {:?}", uid, e);
        return ClientResponse::error(None, "Internal error: thing task not available");
    }

    match resp_rx.await {
        Ok(Ok(snapshot)) => ClientResponse::thing(snapshot),
        Ok(Err(err)) => ClientResponse::from(err),
        Err(e) => {
            error!("Thing response oneshot recv error: {:?}", e);
            ClientResponse::error(None, "Internal error waiting for thing response")
        }
    }
}

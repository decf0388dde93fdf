// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clud send`/`clud attach` (§6.1).
//!
//! `send` proxies straight to `DaemonClient::send`. `attach` has no
//! counterpart in the teacher's IPC protocol -- `oj`'s equivalent is a
//! tmux `peek`/attach against a locally-held session, not a network
//! subscribe -- so the frame semantics here are grounded on `http.rs`'s own
//! WebSocket server half instead: one binary frame per publish, snapshot
//! first, then the live tail until the server closes the socket.

use crate::client::DaemonClient;
use anyhow::{anyhow, Result};
use futures::StreamExt;
use std::io::Write;
use tokio_tungstenite::tungstenite::Message;

pub async fn send(client: &DaemonClient, session_id: &str, text: &str) -> Result<()> {
    client.send(session_id, text).await?;
    Ok(())
}

pub async fn attach(client: &DaemonClient, session_id: &str) -> Result<()> {
    let url = client.stream_url(session_id);
    let (mut ws, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| anyhow!("failed to attach to session {session_id:?}: {e}"))?;

    let mut stdout = std::io::stdout();
    while let Some(message) = ws.next().await {
        match message? {
            Message::Binary(chunk) => {
                stdout.write_all(&chunk)?;
                stdout.flush()?;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

//! Test WebSocket client.
//!
//! Drives a roomcast server over a real WebSocket and asserts on received
//! envelopes.

#![allow(dead_code)]

use anyhow::{Context, anyhow, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A test chat client.
pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (stream, _response) = connect_async(url).await.context("websocket connect")?;
        Ok(Self { stream })
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .context("websocket send")
    }

    /// Send a `{type, payload}` command envelope.
    pub async fn command(&mut self, kind: &str, payload: Value) -> anyhow::Result<()> {
        self.send_text(&json!({"type": kind, "payload": payload}).to_string())
            .await
    }

    /// Receive the next JSON envelope, skipping transport control frames.
    pub async fn recv_json(&mut self) -> anyhow::Result<Value> {
        loop {
            let frame = timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .context("timed out waiting for a frame")?
                .ok_or_else(|| anyhow!("connection closed"))?
                .context("websocket read")?;
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(&text).context("parse server envelope");
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => bail!("connection closed"),
                other => bail!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Receive envelopes until one has the given `type`, returning it.
    /// Envelopes of other types are collected and returned alongside.
    pub async fn recv_until_type(&mut self, kind: &str) -> anyhow::Result<(Value, Vec<Value>)> {
        let mut skipped = Vec::new();
        loop {
            let value = self.recv_json().await?;
            if value["type"] == kind {
                return Ok((value, skipped));
            }
            skipped.push(value);
        }
    }

    /// Assert the server closes this connection without sending any further
    /// JSON envelope.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            let frame = match timeout(RECV_TIMEOUT, self.stream.next()).await {
                Err(_) => bail!("timed out waiting for close"),
                Ok(None) => return Ok(()),
                Ok(Some(Err(_))) => return Ok(()),
                Ok(Some(Ok(frame))) => frame,
            };
            match frame {
                Message::Close(_) => return Ok(()),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Text(text) => bail!("expected close, got envelope: {text}"),
                other => bail!("expected close, got frame: {other:?}"),
            }
        }
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.stream.close(None).await.context("websocket close")
    }
}

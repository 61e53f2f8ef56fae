//! The PHD2 transport (§4.5): one persistent, line-framed JSON-RPC
//! connection, a single reader task, and a pending-request table keyed by
//! RPC id.

use crate::phd2::error::Phd2Error;
use crate::phd2::events::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i32,
    message: String,
}

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, Phd2Error>>>;

/// One persistent PHD2 connection (§4.5 state machine: `Disconnected ->
/// Connecting -> Connected -> Disconnecting -> Disconnected`, collapsed
/// here to "has a live writer or not" since the intermediate states are
/// momentary).
pub(crate) struct Transport {
    writer: Mutex<Option<OwnedWriteHalf>>,
    next_id: AtomicU64,
    pending: Mutex<PendingMap>,
    events: broadcast::Sender<Event>,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

impl Transport {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        let (connected_tx, connected_rx) = watch::channel(false);
        Self {
            writer: Mutex::new(None),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            events,
            connected_tx,
            connected_rx,
            reader: Mutex::new(None),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub(crate) fn connected_watch(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    pub(crate) fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Dials `host:port` within `timeout` and spawns the sole reader task
    /// (§4.5: "the reader task is the sole mutator of connection-level
    /// state").
    pub(crate) async fn connect(
        self: &Arc<Self>,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), Phd2Error> {
        let addr = format!("{host}:{port}");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Phd2Error::Timeout(format!("connect to {addr}")))?
            .map_err(|err| Phd2Error::ConnectionFailed(addr.clone(), err.to_string()))?;

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        let _ignored = self.connected_tx.send(true);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.read_loop(read_half).await });
        *self.reader.lock().await = Some(handle);
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, read_half: OwnedReadHalf) {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        self.dispatch_line(trimmed).await;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        self.fail_all_pending().await;
        let _ignored = self.connected_tx.send(false);
    }

    async fn dispatch_line(&self, line: &str) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            tracing::debug!(line, "dropping malformed PHD2 message");
            return;
        };

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            let sender = self.pending.lock().await.remove(&id);
            if let Some(sender) = sender {
                let outcome = match serde_json::from_value::<RpcResponse>(value) {
                    Ok(response) => response.error.map_or_else(
                        || Ok(response.result.unwrap_or(Value::Null)),
                        |error| {
                            Err(Phd2Error::Rpc {
                                code: error.code,
                                message: error.message,
                            })
                        },
                    ),
                    Err(_) => Err(Phd2Error::Parse(line.to_owned())),
                };
                let _ignored = sender.send(outcome);
                return;
            }
        }

        if value.get("Event").is_some() {
            match serde_json::from_value::<Event>(value) {
                Ok(event) => {
                    let _ignored = self.events.send(event);
                }
                Err(_) => tracing::debug!(line, "unrecognized PHD2 event shape"),
            }
            return;
        }

        tracing::debug!(line, "dropping unclassified PHD2 message");
    }

    /// §4.5: "no orphans after disconnect" — every pending RPC resolves,
    /// here with a connection-error status.
    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ignored = sender.send(Err(Phd2Error::ConnectionFailed(
                "PHD2".to_owned(),
                "connection closed".to_owned(),
            )));
        }
    }

    pub(crate) async fn disconnect(&self) {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ignored = writer.shutdown().await;
        }
        self.fail_all_pending().await;
        let _ignored = self.connected_tx.send(false);
    }

    /// Allocates an id, writes the request line, and waits for the
    /// matching response or `timeout` (§4.5 "Outbound").
    pub(crate) async fn send_rpc(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, Phd2Error> {
        if !self.is_connected() {
            return Err(Phd2Error::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest { method, params, id };
        let mut line =
            serde_json::to_string(&request).map_err(|err| Phd2Error::Parse(err.to_string()))?;
        line.push('\n');

        let (sender, receiver) = oneshot::channel();
        self.pending.lock().await.insert(id, sender);

        {
            let mut writer_guard = self.writer.lock().await;
            let Some(writer) = writer_guard.as_mut() else {
                self.pending.lock().await.remove(&id);
                return Err(Phd2Error::NotConnected);
            };
            if writer.write_all(line.as_bytes()).await.is_err() {
                self.pending.lock().await.remove(&id);
                return Err(Phd2Error::ConnectionFailed(
                    "PHD2".to_owned(),
                    "write failed".to_owned(),
                ));
            }
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Phd2Error::ConnectionFailed(
                "PHD2".to_owned(),
                "response channel closed".to_owned(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Phd2Error::Timeout(method.to_owned()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_rpc_resolves_on_matching_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.split();
            let mut lines = BufReader::new(read_half).lines();
            let _request = lines.next_line().await.unwrap().unwrap();
            write_half
                .write_all(b"{\"result\":2000,\"id\":1}\n")
                .await
                .unwrap();
        });

        let transport = Arc::new(Transport::new());
        transport
            .connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .await
            .unwrap();

        let result = transport
            .send_rpc("get_exposure", None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(2000));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn send_rpc_without_connection_fails_fast() {
        let transport = Transport::new();
        let err = transport
            .send_rpc("get_exposure", None, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Phd2Error::NotConnected));
    }
}

//! Websocket-backed broker library capability.
//!
//! Default implementation of [`BrokerLibrary`] speaking a small
//! tagged-JSON request/response protocol over the broker's local
//! websocket. The trust handshake sends the certificate PEM, its SHA-512
//! hex fingerprint, and the signature algorithm id; the broker answers
//! with an accept/reject frame before any call is allowed.
//!
//! The loader probes the broker port with a bounded TCP connect before
//! handing out the capability — a missing broker process surfaces as a
//! load failure, not a hung connect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerLibrary, BrokerLoader, JobConfig, JobEntry, TrustConfig};
use crate::error::{PrintError, PrintResult};

/// Default local endpoint of the broker process.
pub const DEFAULT_BROKER_URL: &str = "ws://127.0.0.1:8182";

/// Bound on the reachability probe during load.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
/// Bound on a single request/response round trip.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Wire frames exchanged with the broker.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum BrokerFrame {
    /// Client → broker: trust handshake.
    #[serde(rename_all = "camelCase")]
    Hello {
        certificate: String,
        fingerprint: String,
        signature_algorithm: String,
    },
    /// Broker → client: handshake outcome.
    #[serde(rename_all = "camelCase")]
    Welcome {
        accepted: bool,
        #[serde(default)]
        message: Option<String>,
    },
    /// Client → broker: one call.
    #[serde(rename_all = "camelCase")]
    Request {
        id: String,
        call: String,
        #[serde(default)]
        params: Value,
    },
    /// Broker → client: call outcome, correlated by id.
    #[serde(rename_all = "camelCase")]
    Response {
        id: String,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
}

/// SHA-512 fingerprint of the certificate, hex encoded.
fn sha512_fingerprint(pem: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(pem.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract `host:port` from a ws:// or wss:// URL, defaulting the port.
fn host_port(url: &str) -> PrintResult<String> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .ok_or_else(|| PrintError::ScriptLoad(format!("invalid broker URL: {url}")))?;
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        return Err(PrintError::ScriptLoad(format!("invalid broker URL: {url}")));
    }
    if authority.contains(':') {
        Ok(authority.to_string())
    } else {
        Ok(format!("{authority}:8182"))
    }
}

/// [`BrokerLibrary`] over the broker's local websocket.
pub struct WsBrokerLibrary {
    url: String,
    stream: tokio::sync::Mutex<Option<WsStream>>,
    active: AtomicBool,
}

impl WsBrokerLibrary {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            stream: tokio::sync::Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    fn mark_inactive(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Send one request and wait for its correlated response. Unrelated
    /// frames are skipped.
    async fn call(&self, call: &str, params: Value) -> PrintResult<Value> {
        let mut guard = self.stream.lock().await;
        let ws = guard
            .as_mut()
            .ok_or_else(|| PrintError::Dispatch("broker connection not established".to_string()))?;

        let id = Uuid::new_v4().to_string();
        let frame = BrokerFrame::Request {
            id: id.clone(),
            call: call.to_string(),
            params,
        };
        let text = serde_json::to_string(&frame)
            .map_err(|e| PrintError::Dispatch(format!("encode {call}: {e}")))?;

        if let Err(e) = ws.send(Message::Text(text)).await {
            self.mark_inactive();
            return Err(PrintError::Dispatch(format!("send {call}: {e}")));
        }

        loop {
            let msg = match time::timeout(CALL_TIMEOUT, ws.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    self.mark_inactive();
                    return Err(PrintError::Dispatch(format!("receive {call}: {e}")));
                }
                Ok(None) => {
                    self.mark_inactive();
                    return Err(PrintError::Dispatch(format!(
                        "broker closed the connection during {call}"
                    )));
                }
                Err(_) => {
                    self.mark_inactive();
                    return Err(PrintError::Dispatch(format!(
                        "{call} timed out after {}s",
                        CALL_TIMEOUT.as_secs()
                    )));
                }
            };

            let raw = match msg {
                Message::Text(raw) => raw,
                Message::Close(_) => {
                    self.mark_inactive();
                    return Err(PrintError::Dispatch(format!(
                        "broker closed the connection during {call}"
                    )));
                }
                _ => continue,
            };

            match serde_json::from_str::<BrokerFrame>(&raw) {
                Ok(BrokerFrame::Response {
                    id: response_id,
                    result,
                    error,
                }) if response_id == id => {
                    return match error {
                        Some(message) => Err(PrintError::Dispatch(message)),
                        None => Ok(result),
                    };
                }
                Ok(_) => {
                    debug!("skipping unrelated broker frame while awaiting {call}");
                }
                Err(e) => {
                    debug!("skipping unparseable broker frame: {e}");
                }
            }
        }
    }
}

#[async_trait]
impl BrokerLibrary for WsBrokerLibrary {
    async fn connect(&self, trust: &TrustConfig) -> PrintResult<()> {
        self.mark_inactive();

        let (mut ws, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            PrintError::ConnectionRejected(format!("websocket connect to {} failed: {e}", self.url))
        })?;

        let hello = BrokerFrame::Hello {
            certificate: trust.certificate_pem.clone(),
            fingerprint: sha512_fingerprint(&trust.certificate_pem),
            signature_algorithm: trust.signature_algorithm.as_str().to_string(),
        };
        let text = serde_json::to_string(&hello)
            .map_err(|e| PrintError::ConnectionRejected(format!("encode handshake: {e}")))?;
        ws.send(Message::Text(text))
            .await
            .map_err(|e| PrintError::ConnectionRejected(format!("send handshake: {e}")))?;

        loop {
            let msg = match time::timeout(CALL_TIMEOUT, ws.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    return Err(PrintError::ConnectionRejected(format!("handshake: {e}")))
                }
                Ok(None) => {
                    return Err(PrintError::ConnectionRejected(
                        "broker closed the connection during the handshake".to_string(),
                    ))
                }
                Err(_) => {
                    return Err(PrintError::ConnectionRejected(format!(
                        "handshake timed out after {}s",
                        CALL_TIMEOUT.as_secs()
                    )))
                }
            };

            let raw = match msg {
                Message::Text(raw) => raw,
                Message::Close(_) => {
                    return Err(PrintError::ConnectionRejected(
                        "broker closed the connection during the handshake".to_string(),
                    ))
                }
                _ => continue,
            };

            match serde_json::from_str::<BrokerFrame>(&raw) {
                Ok(BrokerFrame::Welcome { accepted: true, .. }) => {
                    *self.stream.lock().await = Some(ws);
                    self.active.store(true, Ordering::SeqCst);
                    info!(url = %self.url, "broker trust handshake accepted");
                    return Ok(());
                }
                Ok(BrokerFrame::Welcome {
                    accepted: false,
                    message,
                }) => {
                    return Err(PrintError::ConnectionRejected(
                        message.unwrap_or_else(|| "certificate rejected by broker".to_string()),
                    ));
                }
                Ok(_) | Err(_) => {
                    debug!("skipping frame while awaiting handshake outcome");
                }
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn default_printer(&self) -> PrintResult<Option<String>> {
        let result = self.call("printers.getDefault", Value::Null).await?;
        Ok(result.as_str().map(str::to_string))
    }

    async fn find_printers(&self) -> PrintResult<Vec<String>> {
        let result = self.call("printers.find", Value::Null).await?;
        Ok(result
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn print(&self, config: &JobConfig, entries: &[JobEntry]) -> PrintResult<()> {
        let params = json!({ "config": config, "data": entries });
        self.call("print", params).await?;
        Ok(())
    }
}

/// Obtains a [`WsBrokerLibrary`] after verifying the broker is reachable.
pub struct WsBrokerLoader {
    url: String,
}

impl WsBrokerLoader {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

impl Default for WsBrokerLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_URL)
    }
}

#[async_trait]
impl BrokerLoader for WsBrokerLoader {
    async fn load(&self) -> PrintResult<Arc<dyn BrokerLibrary>> {
        let addr = host_port(&self.url)?;
        match time::timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => {
                info!(addr = %addr, "broker process reachable");
                Ok(Arc::new(WsBrokerLibrary::new(&self.url)))
            }
            Ok(Err(e)) => {
                warn!(addr = %addr, "broker not reachable: {e}");
                Err(PrintError::ScriptLoad(format!(
                    "broker not reachable at {addr}: {e}"
                )))
            }
            Err(_) => Err(PrintError::ScriptLoad(format!(
                "broker probe timed out at {addr}"
            ))),
        }
    }
}

//! Print-broker client.
//!
//! Manages the trust handshake and persistent connection to the locally
//! installed print broker, resolves a target printer, and dispatches jobs.
//! The client is an explicit singleton object owning its state machine —
//! Unloaded → Loaded/Disconnected → Connecting → Connected — with all
//! transitions guarded synchronously before any await point, so
//! concurrent connect attempts coalesce onto one in-flight handshake.
//!
//! The broker library itself is an injected capability obtained once from
//! the loader; see [`crate::broker_ws`] for the default websocket-backed
//! implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time;
use tracing::{info, warn};

use crate::error::{PrintError, PrintResult};

/// Bound on obtaining the broker library.
const LOAD_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on the connect handshake itself. The original design left this
/// to the library; a hung broker must not wedge the dispatcher.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a coalesced caller waits on an in-flight handshake.
const COALESCE_WAIT: Duration = Duration::from_secs(2);

/// Signature algorithm id supplied to the broker during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "SHA512")]
    Sha512,
}

impl SignatureAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha512 => "SHA512",
        }
    }
}

/// Trust material for the broker handshake.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub certificate_pem: String,
    pub signature_algorithm: SignatureAlgorithm,
}

/// Payload kind of a job entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Raw,
    Html,
}

/// Encoding of the job data. Only plain strings are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobFormat {
    Plain,
}

/// One entry of a print job as submitted to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntry {
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub format: JobFormat,
    pub data: String,
}

impl JobEntry {
    /// Raw ESC/POS payload entry.
    pub fn raw(data: String) -> Self {
        Self {
            kind: JobKind::Raw,
            format: JobFormat::Plain,
            data,
        }
    }

    /// Rendered HTML payload entry.
    pub fn html(data: String) -> Self {
        Self {
            kind: JobKind::Html,
            format: JobFormat::Plain,
            data,
        }
    }
}

/// Job configuration created against a resolved printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub printer: String,
    pub copies: u32,
}

/// The broker library capability. Obtained once from the loader and then
/// passed explicitly; implementations own the wire protocol.
#[async_trait]
pub trait BrokerLibrary: Send + Sync {
    /// Run the trust handshake and open the persistent connection.
    async fn connect(&self, trust: &TrustConfig) -> PrintResult<()>;

    /// Whether the underlying connection is currently usable.
    fn is_active(&self) -> bool;

    /// The OS default printer, if the broker knows one.
    async fn default_printer(&self) -> PrintResult<Option<String>>;

    /// Enumerate the printers visible to the broker.
    async fn find_printers(&self) -> PrintResult<Vec<String>>;

    /// Submit a job.
    async fn print(&self, config: &JobConfig, entries: &[JobEntry]) -> PrintResult<()>;
}

/// Obtains the broker library capability, e.g. by probing the local
/// broker process. Failure maps to [`PrintError::ScriptLoad`].
#[async_trait]
pub trait BrokerLoader: Send + Sync {
    async fn load(&self) -> PrintResult<Arc<dyn BrokerLibrary>>;
}

/// Resolves the trust certificate. The client fetches once and caches.
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    async fn fetch(&self) -> PrintResult<String>;
}

/// Fetches the certificate from a static text resource.
pub struct HttpCertificateProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpCertificateProvider {
    pub fn new(url: &str) -> PrintResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PrintError::ConnectionRejected(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl CertificateProvider for HttpCertificateProvider {
    async fn fetch(&self) -> PrintResult<String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PrintError::ConnectionRejected(format!("certificate fetch: {e}")))?;
        if !resp.status().is_success() {
            return Err(PrintError::ConnectionRejected(format!(
                "certificate fetch returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        resp.text()
            .await
            .map_err(|e| PrintError::ConnectionRejected(format!("certificate fetch: {e}")))
    }
}

/// Operator-facing connection snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BrokerStatus {
    pub loaded: bool,
    pub connected: bool,
}

struct Inner {
    library: Option<Arc<dyn BrokerLibrary>>,
    certificate: Option<String>,
    connected: bool,
    connecting: bool,
}

enum Plan {
    Ready(Arc<dyn BrokerLibrary>),
    Wait(watch::Receiver<u64>),
    Claim(Option<Arc<dyn BrokerLibrary>>),
}

/// The singleton broker client.
pub struct BrokerClient {
    loader: Box<dyn BrokerLoader>,
    certificates: Box<dyn CertificateProvider>,
    state: Mutex<Inner>,
    outcome_tx: watch::Sender<u64>,
}

impl BrokerClient {
    pub fn new(loader: Box<dyn BrokerLoader>, certificates: Box<dyn CertificateProvider>) -> Self {
        let (outcome_tx, _) = watch::channel(0u64);
        Self {
            loader,
            certificates,
            state: Mutex::new(Inner {
                library: None,
                certificate: None,
                connected: false,
                connecting: false,
            }),
            outcome_tx,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current connection snapshot for a status indicator.
    pub fn status(&self) -> BrokerStatus {
        let st = self.lock_state();
        BrokerStatus {
            loaded: st.library.is_some(),
            connected: st.connected
                && st.library.as_ref().map(|l| l.is_active()).unwrap_or(false),
        }
    }

    /// Tear the connection state down and re-run the full
    /// Disconnected→Connected path, regardless of the current state.
    pub async fn reconnect(&self) -> PrintResult<()> {
        {
            self.lock_state().connected = false;
        }
        self.ensure_connected().await.map(|_| ())
    }

    /// Return a connected library, loading and handshaking as needed.
    /// Concurrent callers coalesce onto a single in-flight handshake.
    pub async fn ensure_connected(&self) -> PrintResult<Arc<dyn BrokerLibrary>> {
        // All transitions happen synchronously under the lock, before any
        // await point.
        let plan = {
            let mut st = self.lock_state();
            match (&st.library, st.connected) {
                (Some(lib), true) if lib.is_active() => Plan::Ready(lib.clone()),
                _ => {
                    st.connected = false;
                    if st.connecting {
                        Plan::Wait(self.outcome_tx.subscribe())
                    } else {
                        st.connecting = true;
                        Plan::Claim(st.library.clone())
                    }
                }
            }
        };

        match plan {
            Plan::Ready(lib) => Ok(lib),
            Plan::Wait(mut rx) => {
                let _ = time::timeout(COALESCE_WAIT, rx.changed()).await;
                let st = self.lock_state();
                match (&st.library, st.connected) {
                    (Some(lib), true) if lib.is_active() => Ok(lib.clone()),
                    _ => Err(PrintError::ConnectionRejected(
                        "in-flight connect attempt did not succeed".to_string(),
                    )),
                }
            }
            Plan::Claim(existing) => {
                let result = self.handshake(existing).await;
                {
                    let mut st = self.lock_state();
                    st.connecting = false;
                    st.connected = result.is_ok();
                    if let Ok(lib) = &result {
                        st.library = Some(lib.clone());
                    }
                }
                self.outcome_tx.send_modify(|epoch| *epoch += 1);
                result
            }
        }
    }

    async fn handshake(
        &self,
        existing: Option<Arc<dyn BrokerLibrary>>,
    ) -> PrintResult<Arc<dyn BrokerLibrary>> {
        let library = match existing {
            Some(lib) => lib,
            None => {
                info!("loading broker client library");
                let lib = time::timeout(LOAD_TIMEOUT, self.loader.load())
                    .await
                    .map_err(|_| {
                        PrintError::ScriptLoad(format!(
                            "load timed out after {}s",
                            LOAD_TIMEOUT.as_secs()
                        ))
                    })??;
                // Library stays loaded even if the handshake below fails.
                self.lock_state().library = Some(lib.clone());
                lib
            }
        };

        let certificate = { self.lock_state().certificate.clone() };
        let certificate = match certificate {
            Some(pem) => pem,
            None => {
                let pem = self.certificates.fetch().await?;
                self.lock_state().certificate = Some(pem.clone());
                pem
            }
        };

        let trust = TrustConfig {
            certificate_pem: certificate,
            signature_algorithm: SignatureAlgorithm::Sha512,
        };
        time::timeout(CONNECT_TIMEOUT, library.connect(&trust))
            .await
            .map_err(|_| {
                PrintError::ConnectionRejected(format!(
                    "handshake timed out after {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })??;

        info!("broker connected");
        Ok(library)
    }

    /// Resolve the target printer: OS default first, then the first
    /// enumerated printer, otherwise [`PrintError::PrinterNotFound`].
    async fn resolve_printer(&self, library: &Arc<dyn BrokerLibrary>) -> PrintResult<String> {
        match library.default_printer().await {
            Ok(Some(name)) if !name.trim().is_empty() => return Ok(name),
            Ok(_) => {}
            Err(e) => warn!("default printer lookup failed: {e}"),
        }

        let printers = match library.find_printers().await {
            Ok(list) => list,
            Err(e) => {
                warn!("printer enumeration failed: {e}");
                Vec::new()
            }
        };
        printers
            .into_iter()
            .find(|p| !p.trim().is_empty())
            .ok_or_else(|| PrintError::PrinterNotFound("broker reported no printers".to_string()))
    }

    /// Connect if needed, resolve a printer, and hand the job over.
    pub async fn submit(&self, entries: &[JobEntry], copies: u32) -> PrintResult<()> {
        let library = self.ensure_connected().await?;
        let printer = self.resolve_printer(&library).await?;
        let config = JobConfig {
            printer: printer.clone(),
            copies: copies.max(1),
        };
        library.print(&config, entries).await?;
        info!(printer = %printer, entries = entries.len(), "print job handed to broker");
        Ok(())
    }
}

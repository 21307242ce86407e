//! Receipt generation and print dispatch for an online food-ordering
//! storefront.
//!
//! The subsystem covers the three parts of the storefront that are more
//! than a form over a database row: the ESC/POS wire protocol for thermal
//! receipt printers, the trust-gated persistent connection to the local
//! print broker, and the new-order watcher that must chime and print
//! exactly once per order despite overlapping polling.
//!
//! Typical wiring:
//!
//! ```rust,ignore
//! let db = Arc::new(db::init(&data_dir)?);
//! let settings = SettingsStore::new(db);
//! let client = Arc::new(BrokerClient::new(
//!     Box::new(WsBrokerLoader::default()),
//!     Box::new(HttpCertificateProvider::new(cert_url)?),
//! ));
//! let dispatcher = Arc::new(PrintDispatcher::new(
//!     client.clone(),
//!     settings.clone(),
//!     Arc::new(DialogFallback::new(&data_dir)),
//!     VatRates { reduced: 0.07, standard: 0.19 },
//! ));
//! let watcher = OrderWatcher::new(feed, dispatcher, alerts, WatcherConfig::default());
//! tokio::spawn(watcher.run(cancel_token));
//! ```

use std::path::Path;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod broker;
pub mod broker_ws;
pub mod db;
pub mod error;
pub mod escpos;
pub mod fallback;
pub mod feed;
pub mod formats;
pub mod order;
pub mod print;
pub mod receipt;
pub mod receipt_html;
pub mod settings;
pub mod watcher;

pub use broker::{BrokerClient, BrokerLibrary, BrokerLoader, BrokerStatus, HttpCertificateProvider};
pub use broker_ws::{WsBrokerLoader, DEFAULT_BROKER_URL};
pub use error::{PrintError, PrintResult};
pub use fallback::{DialogFallback, FallbackPrinter};
pub use feed::{FeedClient, OrderFeed};
pub use order::{DeliveryMethod, Order};
pub use print::{PrintDispatcher, PrintOutcome};
pub use receipt::{build_receipt, ReceiptDocument, VatRates};
pub use settings::{PrintSettings, PrinterType, SettingsStore};
pub use watcher::{LogAlerts, NewOrderAlerts, OrderWatcher, WatcherConfig};

/// Initialize structured logging: console always, plus a daily-rolling
/// file when `log_dir` is given. Call once at startup.
pub fn init_tracing(log_dir: Option<&Path>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,orderslip=debug"));

    let console_layer = fmt::layer().with_target(true);

    let file_layer = log_dir.map(|dir| {
        std::fs::create_dir_all(dir).ok();
        let appender = tracing_appender::rolling::daily(dir, "orderslip");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        // The guard flushes on drop; keep it for the process lifetime.
        std::mem::forget(guard);
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("orderslip v{} logging initialized", env!("CARGO_PKG_VERSION"));
}

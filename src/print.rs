//! Print dispatch orchestration.
//!
//! Ties the pipeline together: load settings (once per attempt), build
//! the receipt document, pick the encoder for the configured printer
//! type, hand the job to the broker client — and on any failure in that
//! path, open the fallback print dialog against the HTML renderer.
//! Every call ends in exactly one of those two outcomes; nothing is
//! silently dropped and nothing propagates as a panic.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::broker::{BrokerClient, JobEntry};
use crate::error::PrintResult;
use crate::escpos;
use crate::fallback::FallbackPrinter;
use crate::formats;
use crate::order::Order;
use crate::receipt::{build_receipt, ReceiptDocument, VatRates};
use crate::receipt_html::render_html;
use crate::settings::{PrintSettings, PrinterType, SettingsStore};

/// How a print attempt was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintOutcome {
    /// Handed to the broker.
    Broker,
    /// Broker path failed; the fallback dialog was invoked.
    Fallback,
}

/// Order print pipeline over the broker client and fallback printer.
pub struct PrintDispatcher {
    client: Arc<BrokerClient>,
    settings: SettingsStore,
    fallback: Arc<dyn FallbackPrinter>,
    rates: VatRates,
}

impl PrintDispatcher {
    pub fn new(
        client: Arc<BrokerClient>,
        settings: SettingsStore,
        fallback: Arc<dyn FallbackPrinter>,
        rates: VatRates,
    ) -> Self {
        Self {
            client,
            settings,
            fallback,
            rates,
        }
    }

    /// Whether the watcher should auto-print new orders, read from the
    /// settings store at dispatch time.
    pub fn auto_print_enabled(&self) -> bool {
        self.settings.load().auto_print
    }

    /// Print one order: broker first, fallback dialog on any failure.
    pub async fn print_order(&self, order: &Order) -> PrintOutcome {
        let settings = self.settings.load();
        let doc = build_receipt(order, &settings, self.rates);

        match self.submit_to_broker(&doc, &settings).await {
            Ok(()) => {
                info!(order_id = %order.id, "receipt dispatched via broker");
                PrintOutcome::Broker
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "broker path failed; opening print dialog");
                self.open_fallback(&doc, &settings);
                PrintOutcome::Fallback
            }
        }
    }

    /// Dispatch a small self-test ticket through the same pipeline.
    pub async fn test_print(&self) -> PrintOutcome {
        let settings = self.settings.load();
        let format = formats::lookup(&settings.paper_format);
        let entry = JobEntry::raw(escpos::test_ticket(format));
        match self.client.submit(&[entry], 1).await {
            Ok(()) => PrintOutcome::Broker,
            Err(e) => {
                warn!(error = %e, "test print via broker failed; opening print dialog");
                if let Err(e) = self
                    .fallback
                    .open_dialog("<!DOCTYPE html><html><body><h1>TEST PRINT</h1></body></html>")
                {
                    error!(error = %e, "fallback print dialog failed");
                }
                PrintOutcome::Fallback
            }
        }
    }

    async fn submit_to_broker(
        &self,
        doc: &ReceiptDocument,
        settings: &PrintSettings,
    ) -> PrintResult<()> {
        let format = formats::lookup(&settings.paper_format);
        let entry = match settings.printer_type {
            PrinterType::Thermal => {
                JobEntry::raw(escpos::encode_receipt(doc, format, settings.auto_cut))
            }
            PrinterType::Pixel => {
                JobEntry::html(render_html(doc, format, settings.font_size))
            }
        };
        self.client.submit(&[entry], settings.copies).await
    }

    fn open_fallback(&self, doc: &ReceiptDocument, settings: &PrintSettings) {
        let format = formats::lookup(&settings.paper_format);
        let html = render_html(doc, format, settings.font_size);
        if let Err(e) = self.fallback.open_dialog(&html) {
            error!(error = %e, "fallback print dialog failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::broker::{
        BrokerLibrary, BrokerLoader, CertificateProvider, JobConfig, JobKind, TrustConfig,
    };
    use crate::db;
    use crate::error::PrintError;
    use crate::receipt::tests::{sample_order, RATES};

    struct RecordingFallback {
        calls: AtomicUsize,
        last_html: Mutex<Option<String>>,
    }

    impl FallbackPrinter for RecordingFallback {
        fn open_dialog(&self, html: &str) -> PrintResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_html.lock().unwrap() = Some(html.to_string());
            Ok(())
        }
    }

    struct WorkingLibrary {
        printed: Mutex<Vec<(JobConfig, Vec<JobEntry>)>>,
    }

    #[async_trait]
    impl BrokerLibrary for WorkingLibrary {
        async fn connect(&self, _trust: &TrustConfig) -> PrintResult<()> {
            Ok(())
        }
        fn is_active(&self) -> bool {
            true
        }
        async fn default_printer(&self) -> PrintResult<Option<String>> {
            Ok(Some("Front Desk".to_string()))
        }
        async fn find_printers(&self) -> PrintResult<Vec<String>> {
            Ok(vec!["Front Desk".to_string()])
        }
        async fn print(&self, config: &JobConfig, entries: &[JobEntry]) -> PrintResult<()> {
            self.printed
                .lock()
                .unwrap()
                .push((config.clone(), entries.to_vec()));
            Ok(())
        }
    }

    struct WorkingLoader(Arc<WorkingLibrary>);

    #[async_trait]
    impl BrokerLoader for WorkingLoader {
        async fn load(&self) -> PrintResult<Arc<dyn BrokerLibrary>> {
            Ok(self.0.clone())
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl BrokerLoader for FailingLoader {
        async fn load(&self) -> PrintResult<Arc<dyn BrokerLibrary>> {
            Err(PrintError::ScriptLoad("library unavailable".into()))
        }
    }

    struct StaticCerts;

    #[async_trait]
    impl CertificateProvider for StaticCerts {
        async fn fetch(&self) -> PrintResult<String> {
            Ok("PEM".to_string())
        }
    }

    fn settings_store() -> SettingsStore {
        SettingsStore::new(Arc::new(db::init_in_memory().unwrap()))
    }

    fn dispatcher_with_working_broker() -> (PrintDispatcher, Arc<WorkingLibrary>, Arc<RecordingFallback>)
    {
        let library = Arc::new(WorkingLibrary {
            printed: Mutex::new(Vec::new()),
        });
        let client = Arc::new(BrokerClient::new(
            Box::new(WorkingLoader(library.clone())),
            Box::new(StaticCerts),
        ));
        let fallback = Arc::new(RecordingFallback {
            calls: AtomicUsize::new(0),
            last_html: Mutex::new(None),
        });
        let dispatcher =
            PrintDispatcher::new(client, settings_store(), fallback.clone(), RATES);
        (dispatcher, library, fallback)
    }

    fn dispatcher_with_failing_broker() -> (PrintDispatcher, Arc<RecordingFallback>) {
        let client = Arc::new(BrokerClient::new(
            Box::new(FailingLoader),
            Box::new(StaticCerts),
        ));
        let fallback = Arc::new(RecordingFallback {
            calls: AtomicUsize::new(0),
            last_html: Mutex::new(None),
        });
        let dispatcher =
            PrintDispatcher::new(client, settings_store(), fallback.clone(), RATES);
        (dispatcher, fallback)
    }

    #[tokio::test]
    async fn test_thermal_order_dispatches_raw_payload() {
        let (dispatcher, library, fallback) = dispatcher_with_working_broker();
        let outcome = dispatcher.print_order(&sample_order()).await;
        assert_eq!(outcome, PrintOutcome::Broker);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);

        let printed = library.printed.lock().unwrap();
        assert_eq!(printed.len(), 1);
        let entry = &printed[0].1[0];
        assert_eq!(entry.kind, JobKind::Raw);
        assert!(entry.data.starts_with("\u{1B}@"));
        assert!(entry.data.contains("TOTAL 255.00"));
    }

    #[tokio::test]
    async fn test_pixel_order_dispatches_html_payload() {
        let (dispatcher, library, _fallback) = dispatcher_with_working_broker();
        let mut settings = dispatcher.settings.load();
        settings.printer_type = PrinterType::Pixel;
        settings.paper_format = "A4".to_string();
        dispatcher.settings.save(&settings).unwrap();

        dispatcher.print_order(&sample_order()).await;
        let printed = library.printed.lock().unwrap();
        let entry = &printed[0].1[0];
        assert_eq!(entry.kind, JobKind::Html);
        assert!(entry.data.starts_with("<!DOCTYPE html>"));
        assert!(entry.data.contains("TOTAL 255.00"));
    }

    #[tokio::test]
    async fn test_broker_failure_invokes_fallback_exactly_once() {
        let (dispatcher, fallback) = dispatcher_with_failing_broker();
        let outcome = dispatcher.print_order(&sample_order()).await;
        assert_eq!(outcome, PrintOutcome::Fallback);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);

        let html = fallback.last_html.lock().unwrap().clone().unwrap();
        assert!(html.contains("TOTAL 255.00"));
    }

    #[tokio::test]
    async fn test_copies_forwarded_to_job_config() {
        let (dispatcher, library, _fallback) = dispatcher_with_working_broker();
        let mut settings = dispatcher.settings.load();
        settings.copies = 3;
        dispatcher.settings.save(&settings).unwrap();

        dispatcher.print_order(&sample_order()).await;
        let printed = library.printed.lock().unwrap();
        assert_eq!(printed[0].0.copies, 3);
    }

    #[tokio::test]
    async fn test_test_print_goes_through_broker() {
        let (dispatcher, library, _fallback) = dispatcher_with_working_broker();
        let outcome = dispatcher.test_print().await;
        assert_eq!(outcome, PrintOutcome::Broker);
        let printed = library.printed.lock().unwrap();
        assert!(printed[0].1[0].data.contains("TEST PRINT"));
    }

    #[tokio::test]
    async fn test_auto_print_enabled_follows_settings() {
        let (dispatcher, _library, _fallback) = dispatcher_with_working_broker();
        assert!(dispatcher.auto_print_enabled());

        let mut settings = dispatcher.settings.load();
        settings.auto_print = false;
        dispatcher.settings.save(&settings).unwrap();
        assert!(!dispatcher.auto_print_enabled());
    }
}

//! New-order watcher and auto-print orchestrator.
//!
//! Polls the order feed, diffs identifiers against the previously seen
//! set, and triggers the new-order side effects — chime and silent print
//! — exactly once per newly observed order. The seen set is replaced
//! wholesale *before* any side effect is dispatched; that ordering is
//! what prevents reprocessing an order on overlapping ticks. Print
//! submissions are detached tasks the poll loop never awaits.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::PrintResult;
use crate::feed::OrderFeed;
use crate::order::Order;
use crate::print::PrintDispatcher;

/// Ascending chime tones (Hz).
const CHIME_TONES_HZ: [u32; 3] = [784, 988, 1175];
/// Offset between tones within one repeat.
const TONE_SPACING_MS: u64 = 180;
/// Offset between repeats.
const REPEAT_SPACING_MS: u64 = 900;
/// Number of repeats.
const CHIME_REPEATS: usize = 3;

/// One tone of the notification chime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChimeNote {
    pub frequency_hz: u32,
    pub offset_ms: u64,
}

/// The fixed chime: three ascending tones, repeated three times at fixed
/// offsets.
pub fn chime_schedule() -> Vec<ChimeNote> {
    let mut notes = Vec::with_capacity(CHIME_REPEATS * CHIME_TONES_HZ.len());
    for repeat in 0..CHIME_REPEATS {
        for (i, &frequency_hz) in CHIME_TONES_HZ.iter().enumerate() {
            notes.push(ChimeNote {
                frequency_hz,
                offset_ms: repeat as u64 * REPEAT_SPACING_MS + i as u64 * TONE_SPACING_MS,
            });
        }
    }
    notes
}

/// Injected capability delivering operator-facing alerts. The hosting UI
/// owns the actual audio output.
pub trait NewOrderAlerts: Send + Sync {
    fn chime(&self, notes: &[ChimeNote]);
}

/// Alerts sink that only logs. Useful headless and in tests.
pub struct LogAlerts;

impl NewOrderAlerts for LogAlerts {
    fn chime(&self, notes: &[ChimeNote]) {
        debug!(notes = notes.len(), "new-order chime");
    }
}

/// Watcher tuning.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub sound_enabled: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            sound_enabled: true,
        }
    }
}

/// Polls the feed and fires the per-order side effects.
pub struct OrderWatcher {
    feed: Arc<dyn OrderFeed>,
    dispatcher: Arc<PrintDispatcher>,
    alerts: Arc<dyn NewOrderAlerts>,
    config: WatcherConfig,
    seen: HashSet<String>,
    first_poll: bool,
    tasks: TaskTracker,
}

impl OrderWatcher {
    pub fn new(
        feed: Arc<dyn OrderFeed>,
        dispatcher: Arc<PrintDispatcher>,
        alerts: Arc<dyn NewOrderAlerts>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            feed,
            dispatcher,
            alerts,
            config,
            seen: HashSet::new(),
            first_poll: true,
            tasks: TaskTracker::new(),
        }
    }

    /// One poll tick. Returns the number of newly observed orders.
    ///
    /// On a feed failure the previous seen set is retained and the error
    /// returned for the caller to log; the watcher state is unchanged.
    pub async fn poll_once(&mut self) -> PrintResult<usize> {
        let orders = self.feed.fetch_orders().await?;

        let new_orders: Vec<Order> = if self.first_poll || self.seen.is_empty() {
            Vec::new()
        } else {
            orders
                .iter()
                .filter(|o| !self.seen.contains(&o.id))
                .cloned()
                .collect()
        };

        // Replace the seen set before dispatching anything asynchronous,
        // so an overlapping tick can never re-observe these ids as new.
        self.seen = orders.iter().map(|o| o.id.clone()).collect();
        self.first_poll = false;

        for order in &new_orders {
            self.notify_and_print(order);
        }

        Ok(new_orders.len())
    }

    fn notify_and_print(&self, order: &Order) {
        info!(order_id = %order.id, "new order observed");

        if self.config.sound_enabled {
            self.alerts.chime(&chime_schedule());
        }

        if self.dispatcher.auto_print_enabled() {
            // Detached: the poll loop never awaits print completion, and
            // the dispatcher handles every failure internally.
            let dispatcher = self.dispatcher.clone();
            let order = order.clone();
            self.tasks.spawn(async move {
                let outcome = dispatcher.print_order(&order).await;
                debug!(order_id = %order.id, ?outcome, "auto-print finished");
            });
        }
    }

    /// Run the poll loop until the token is cancelled. Cancellation only
    /// stops future ticks; already dispatched print tasks run to
    /// completion or fallback on their own.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "order watcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep(self.config.poll_interval) => {}
            }

            match self.poll_once().await {
                Ok(new_count) if new_count > 0 => {
                    info!(new_count, "poll cycle dispatched new orders");
                }
                Ok(_) => {}
                Err(e) => warn!("order feed poll failed: {e}"),
            }
        }

        self.tasks.close();
        info!("order watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::broker::{
        BrokerClient, BrokerLibrary, BrokerLoader, CertificateProvider, JobConfig, JobEntry,
        TrustConfig,
    };
    use crate::db;
    use crate::error::PrintError;
    use crate::fallback::FallbackPrinter;
    use crate::receipt::tests::{sample_order, RATES};
    use crate::settings::SettingsStore;

    struct ScriptedFeed {
        responses: Mutex<Vec<PrintResult<Vec<Order>>>>,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<PrintResult<Vec<Order>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl OrderFeed for ScriptedFeed {
        async fn fetch_orders(&self) -> PrintResult<Vec<Order>> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(Vec::new());
            }
            responses.remove(0)
        }
    }

    struct CountingAlerts {
        chimes: AtomicUsize,
    }

    impl NewOrderAlerts for CountingAlerts {
        fn chime(&self, notes: &[ChimeNote]) {
            assert_eq!(notes.len(), 9);
            self.chimes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingLibrary {
        prints: AtomicUsize,
    }

    #[async_trait]
    impl BrokerLibrary for CountingLibrary {
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
        async fn print(&self, _config: &JobConfig, _entries: &[JobEntry]) -> PrintResult<()> {
            self.prints.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingLoader(Arc<CountingLibrary>);

    #[async_trait]
    impl BrokerLoader for CountingLoader {
        async fn load(&self) -> PrintResult<Arc<dyn BrokerLibrary>> {
            Ok(self.0.clone())
        }
    }

    struct StaticCerts;

    #[async_trait]
    impl CertificateProvider for StaticCerts {
        async fn fetch(&self) -> PrintResult<String> {
            Ok("PEM".to_string())
        }
    }

    struct NoFallback;

    impl FallbackPrinter for NoFallback {
        fn open_dialog(&self, _html: &str) -> PrintResult<()> {
            Ok(())
        }
    }

    fn order(id: &str) -> Order {
        let mut order = sample_order();
        order.id = id.to_string();
        order
    }

    struct Rig {
        watcher: OrderWatcher,
        alerts: Arc<CountingAlerts>,
        library: Arc<CountingLibrary>,
        settings: SettingsStore,
    }

    fn rig(feed: Arc<ScriptedFeed>, sound_enabled: bool) -> Rig {
        let library = Arc::new(CountingLibrary {
            prints: AtomicUsize::new(0),
        });
        let client = Arc::new(BrokerClient::new(
            Box::new(CountingLoader(library.clone())),
            Box::new(StaticCerts),
        ));
        let settings = SettingsStore::new(Arc::new(db::init_in_memory().unwrap()));
        let dispatcher = Arc::new(PrintDispatcher::new(
            client,
            settings.clone(),
            Arc::new(NoFallback),
            RATES,
        ));
        let alerts = Arc::new(CountingAlerts {
            chimes: AtomicUsize::new(0),
        });
        let watcher = OrderWatcher::new(
            feed,
            dispatcher,
            alerts.clone(),
            WatcherConfig {
                poll_interval: Duration::from_millis(10),
                sound_enabled,
            },
        );
        Rig {
            watcher,
            alerts,
            library,
            settings,
        }
    }

    async fn drain(watcher: &OrderWatcher) {
        watcher.tasks.close();
        watcher.tasks.wait().await;
    }

    #[test]
    fn test_chime_schedule_shape() {
        let notes = chime_schedule();
        assert_eq!(notes.len(), 9);
        // Three ascending tones within each repeat.
        for repeat in notes.chunks(3) {
            assert!(repeat[0].frequency_hz < repeat[1].frequency_hz);
            assert!(repeat[1].frequency_hz < repeat[2].frequency_hz);
        }
        // Offsets strictly increase across the schedule.
        for pair in notes.windows(2) {
            assert!(pair[0].offset_ms < pair[1].offset_ms);
        }
    }

    #[tokio::test]
    async fn test_first_poll_triggers_no_side_effects() {
        let feed = ScriptedFeed::new(vec![Ok(vec![order("a"), order("b")])]);
        let mut rig = rig(feed, true);
        let new_count = rig.watcher.poll_once().await.unwrap();
        assert_eq!(new_count, 0);
        drain(&rig.watcher).await;
        assert_eq!(rig.alerts.chimes.load(Ordering::SeqCst), 0);
        assert_eq!(rig.library.prints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unchanged_list_is_idempotent() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![order("a"), order("b")]),
            Ok(vec![order("a"), order("b")]),
            Ok(vec![order("a"), order("b")]),
        ]);
        let mut rig = rig(feed, true);
        for _ in 0..3 {
            rig.watcher.poll_once().await.unwrap();
        }
        drain(&rig.watcher).await;
        assert_eq!(rig.alerts.chimes.load(Ordering::SeqCst), 0);
        assert_eq!(rig.library.prints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_new_order_chimes_and_prints_exactly_once() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![order("a")]),
            Ok(vec![order("a"), order("b")]),
            Ok(vec![order("a"), order("b")]),
        ]);
        let mut rig = rig(feed, true);
        assert_eq!(rig.watcher.poll_once().await.unwrap(), 0);
        assert_eq!(rig.watcher.poll_once().await.unwrap(), 1);
        assert_eq!(rig.watcher.poll_once().await.unwrap(), 0);
        drain(&rig.watcher).await;
        assert_eq!(rig.alerts.chimes.load(Ordering::SeqCst), 1);
        assert_eq!(rig.library.prints.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_feed_failure_retains_seen_set() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![order("a")]),
            Err(PrintError::FeedFetch("boom".into())),
            Ok(vec![order("a"), order("b")]),
        ]);
        let mut rig = rig(feed, true);
        rig.watcher.poll_once().await.unwrap();
        assert!(rig.watcher.poll_once().await.is_err());
        // Only "b" is new — "a" survived the failed poll.
        assert_eq!(rig.watcher.poll_once().await.unwrap(), 1);
        drain(&rig.watcher).await;
        assert_eq!(rig.alerts.chimes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disappeared_order_counts_as_new_on_return() {
        // The seen set is replaced wholesale, never merged.
        let feed = ScriptedFeed::new(vec![
            Ok(vec![order("a"), order("b")]),
            Ok(vec![order("a")]),
            Ok(vec![order("a"), order("b")]),
        ]);
        let mut rig = rig(feed, true);
        rig.watcher.poll_once().await.unwrap();
        assert_eq!(rig.watcher.poll_once().await.unwrap(), 0);
        assert_eq!(rig.watcher.poll_once().await.unwrap(), 1);
        drain(&rig.watcher).await;
    }

    #[tokio::test]
    async fn test_sound_disabled_still_prints() {
        let feed = ScriptedFeed::new(vec![Ok(vec![order("a")]), Ok(vec![order("a"), order("b")])]);
        let mut rig = rig(feed, false);
        rig.watcher.poll_once().await.unwrap();
        rig.watcher.poll_once().await.unwrap();
        drain(&rig.watcher).await;
        assert_eq!(rig.alerts.chimes.load(Ordering::SeqCst), 0);
        assert_eq!(rig.library.prints.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_print_disabled_still_chimes() {
        let feed = ScriptedFeed::new(vec![Ok(vec![order("a")]), Ok(vec![order("a"), order("b")])]);
        let mut rig = rig(feed, true);
        let mut settings = rig.settings.load();
        settings.auto_print = false;
        rig.settings.save(&settings).unwrap();

        rig.watcher.poll_once().await.unwrap();
        rig.watcher.poll_once().await.unwrap();
        drain(&rig.watcher).await;
        assert_eq!(rig.alerts.chimes.load(Ordering::SeqCst), 1);
        assert_eq!(rig.library.prints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let feed = ScriptedFeed::new(vec![]);
        let rig = rig(feed, true);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(rig.watcher.run(cancel.clone()));
        time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}

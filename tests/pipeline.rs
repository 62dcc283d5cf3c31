//! End-to-end pipeline tests against a scripted relay, on paused tokio time
//! so debounce and fallback cadences are deterministic.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::sleep;

use feedguard::{
    document::Document,
    domain::{MediaVerdict, MessageVerdict},
    infrastructure::shutdown::Shutdown,
    pipeline::{Pipeline, PipelineConfig},
    relay::{ClassifyRelay, RelayError},
    settings::{AnalysisMode, MemoryBackend, SettingsStore},
};

#[derive(Default)]
struct FakeRelay {
    message_calls: Mutex<Vec<String>>,
    media_calls: Mutex<Vec<String>>,
    ad_probability: Mutex<f64>,
    nsfw: Mutex<bool>,
    delay: Mutex<Duration>,
    failures_remaining: AtomicUsize,
}

impl FakeRelay {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_ad_probability(&self, probability: f64) {
        *self.ad_probability.lock() = probability;
    }

    fn set_nsfw(&self, nsfw: bool) {
        *self.nsfw.lock() = nsfw;
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    fn fail_times(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    fn message_call_count(&self) -> usize {
        self.message_calls.lock().len()
    }

    fn media_call_count(&self) -> usize {
        self.media_calls.lock().len()
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl ClassifyRelay for FakeRelay {
    async fn classify_message(
        &self,
        text: &str,
        _media_src: Option<&str>,
        _mode: AnalysisMode,
    ) -> Result<MessageVerdict, RelayError> {
        self.message_calls.lock().push(text.to_string());
        self.simulate_latency().await;
        if self.take_failure() {
            return Err(RelayError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let probability = *self.ad_probability.lock();
        Ok(MessageVerdict {
            ad_probability: probability,
            is_ad: probability >= 0.5,
        })
    }

    async fn classify_media(&self, src: &str) -> Result<MediaVerdict, RelayError> {
        self.media_calls.lock().push(src.to_string());
        self.simulate_latency().await;
        if self.take_failure() {
            return Err(RelayError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        let nsfw = *self.nsfw.lock();
        Ok(MediaVerdict {
            nsfw_probability: if nsfw { 0.95 } else { 0.05 },
            is_nsfw: nsfw,
        })
    }
}

struct Harness {
    document: Document,
    backend: Arc<MemoryBackend>,
    store: SettingsStore,
    relay: Arc<FakeRelay>,
    pipeline: Pipeline,
    _shutdown: Shutdown,
}

/// Starts a pipeline and drains the immediate startup pass so call counts
/// only reflect what each test drives.
async fn start(relay: Arc<FakeRelay>, config: PipelineConfig) -> Harness {
    start_with_backend(relay, config, Arc::new(MemoryBackend::default())).await
}

async fn start_with_backend(
    relay: Arc<FakeRelay>,
    config: PipelineConfig,
    backend: Arc<MemoryBackend>,
) -> Harness {
    let store = SettingsStore::new(backend.clone());
    let document = Document::new();
    let pipeline = Pipeline::new(document.clone(), store.clone(), relay.clone(), config);
    let shutdown = Shutdown::new();
    pipeline.start(shutdown.subscribe());
    sleep(Duration::from_millis(10)).await;
    Harness {
        document,
        backend,
        store,
        relay,
        pipeline,
        _shutdown: shutdown,
    }
}

/// Long enough for one debounced pass and a prompt relay resolution, well
/// short of the fallback cadence.
async fn settle() {
    sleep(Duration::from_millis(400)).await;
}

#[tokio::test(start_paused = true)]
async fn rapid_signals_coalesce_into_one_pass() {
    for burst in [1usize, 2, 5, 13, 50] {
        let relay = FakeRelay::new();
        relay.set_ad_probability(0.9);
        let h = start(relay, PipelineConfig::default()).await;

        h.document
            .push_message(Some("m1".into()), "BUY NOW", None, false);
        for _ in 1..burst {
            sleep(Duration::from_millis(10)).await;
            h.pipeline.signal();
        }
        // No quiet interval has elapsed since the last signal, so no pass
        // may have run yet.
        assert_eq!(
            h.relay.message_call_count(),
            0,
            "burst of {burst} signals ran a pass early"
        );

        settle().await;
        assert_eq!(
            h.relay.message_call_count(),
            1,
            "burst of {burst} signals must coalesce into one pass"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn fallback_pass_runs_during_a_sustained_signal_storm() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.91);
    let h = start(relay, PipelineConfig::default()).await;

    let node = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    // Signals spaced well under the quiet interval: the debounced pass never
    // fires while the storm lasts, and only the fallback cadence can make
    // progress.
    for _ in 0..100 {
        sleep(Duration::from_millis(100)).await;
        h.pipeline.signal();
    }

    assert!(
        h.relay.message_call_count() >= 1,
        "fallback pass never ran during the signal storm"
    );
    assert!(node.has_class("ad-classified"));

    settle().await;
    assert_eq!(h.relay.message_call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn positive_message_is_labelled_and_highlighted() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.91);
    let h = start(relay, PipelineConfig::default()).await;

    let node = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    settle().await;

    let snap = node.snapshot();
    assert!(node.has_class("ad-classified"));
    assert_eq!(snap.labels.len(), 1);
    assert_eq!(snap.labels[0].text, "Ad: 91.0%");
    assert!(snap.labels[0].positive);
    assert!(snap.styles.contains_key("background-color"));
    assert!(snap.styles.contains_key("border-left"));
    assert_eq!(h.pipeline.stats().cached_verdicts, 1);
}

#[tokio::test(start_paused = true)]
async fn negative_message_gets_label_without_treatment() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.2);
    let h = start(relay, PipelineConfig::default()).await;

    let node = h
        .document
        .push_message(Some("m1".into()), "see you at lunch", None, false);
    settle().await;

    let snap = node.snapshot();
    assert_eq!(snap.labels.len(), 1);
    assert_eq!(snap.labels[0].text, "Ad: 20.0%");
    assert!(!snap.labels[0].positive);
    assert!(snap.styles.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cached_verdict_is_reapplied_without_relay_call() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.91);
    let h = start(relay, PipelineConfig::default()).await;

    h.document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    settle().await;
    assert_eq!(h.relay.message_call_count(), 1);

    // The node is replaced wholesale, as happens when the feed re-renders;
    // the cached verdict must be re-applied without touching the network.
    h.document.remove("m1");
    let replacement = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    settle().await;

    assert_eq!(h.relay.message_call_count(), 1);
    assert!(replacement.has_class("ad-classified"));
    assert_eq!(replacement.snapshot().labels.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn excluded_context_skips_classification_entirely() {
    let relay = FakeRelay::new();
    let backend = Arc::new(MemoryBackend::default());
    backend.set("excludedContexts", json!(["friends"]));
    let h = start_with_backend(relay, PipelineConfig::default(), backend).await;

    h.document.set_context(Some("Friends".into()));
    let node = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    settle().await;

    assert_eq!(h.relay.message_call_count(), 0);
    assert!(node.has_class("ad-excluded"));
    assert!(node.has_class("ad-classified"));
    assert_eq!(h.pipeline.stats().cached_verdicts, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_media_classification_is_retried_on_fallback_pass() {
    let relay = FakeRelay::new();
    relay.set_nsfw(true);
    relay.fail_times(1);
    let h = start(relay, PipelineConfig::default()).await;

    let node = h.document.push_media("https://cdn.example/pic.jpg", true);
    settle().await;

    assert_eq!(h.relay.media_call_count(), 1);
    assert!(!node.has_class("nsfw-processed"), "failed item must stay eligible");
    assert!(!node.has_class("nsfw-blur"));
    assert_eq!(h.pipeline.stats().cached_verdicts, 0);

    // No further mutation signals; the periodic fallback pass retries.
    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.relay.media_call_count(), 2);
    assert!(node.has_class("nsfw-processed"));
    assert!(node.has_class("nsfw-blur"));
}

#[tokio::test(start_paused = true)]
async fn settings_change_invalidates_and_reannotates() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.91);
    let h = start(relay, PipelineConfig::default()).await;

    let node = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    settle().await;
    assert_eq!(h.pipeline.stats().cached_verdicts, 1);

    h.backend.set("adDisplayMode", json!("partial"));
    assert!(h.store.reload());
    sleep(Duration::from_millis(10)).await;

    // Invalidation completes before the next pass begins.
    let stats = h.pipeline.stats();
    assert_eq!(stats.cached_verdicts, 0);
    assert_eq!(stats.generation, 1);
    assert!(!node.has_class("ad-classified"));
    assert!(node.snapshot().labels.is_empty());

    settle().await;
    assert_eq!(h.relay.message_call_count(), 2);
    assert_eq!(
        node.snapshot().styles.get("opacity").map(String::as_str),
        Some("0.4")
    );
}

#[tokio::test(start_paused = true)]
async fn overlapping_passes_dispatch_once_per_identity() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.91);
    relay.set_delay(Duration::from_secs(2));
    let h = start(relay, PipelineConfig::default()).await;

    let node = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    settle().await;
    assert_eq!(h.relay.message_call_count(), 1);
    assert_eq!(h.pipeline.stats().in_flight, 1);

    // A second pass observes the same cache miss while the call is still
    // outstanding.
    h.pipeline.signal();
    settle().await;
    assert_eq!(h.relay.message_call_count(), 1);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.relay.message_call_count(), 1);
    assert_eq!(h.pipeline.stats().in_flight, 0);
    assert!(node.has_class("ad-classified"));
}

#[tokio::test(start_paused = true)]
async fn stale_generation_verdict_is_discarded() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.91);
    relay.set_delay(Duration::from_secs(1));
    let h = start(relay, PipelineConfig::default()).await;

    let node = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    sleep(Duration::from_millis(350)).await;
    assert_eq!(h.relay.message_call_count(), 1);

    // Settings change while the call is outstanding.
    h.backend.set("adThreshold", json!(0.9));
    assert!(h.store.reload());
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.pipeline.stats().generation, 1);

    // Resolution arrives under the old generation and must not repopulate
    // the cleared cache or annotate the node.
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.pipeline.stats().cached_verdicts, 0);
    assert!(!node.has_class("ad-classified"));
    assert!(node.snapshot().labels.is_empty());
    assert_eq!(h.pipeline.stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn invalidation_right_after_resolution_leaves_no_residue() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.91);
    relay.set_delay(Duration::from_secs(1));
    let h = start(relay, PipelineConfig::default()).await;

    let node = h
        .document
        .push_message(Some("m1".into()), "BUY NOW", None, false);
    sleep(Duration::from_millis(1350)).await;
    assert!(node.has_class("ad-classified"));

    // Settings change lands immediately after the delayed resolution; the
    // reset must win over the just-committed annotation.
    h.backend.set("adThreshold", json!(0.95));
    assert!(h.store.reload());
    sleep(Duration::from_millis(10)).await;

    assert_eq!(h.pipeline.stats().cached_verdicts, 0);
    assert!(!node.has_class("ad-classified"));
    assert!(node.snapshot().labels.is_empty());
}

#[tokio::test(start_paused = true)]
async fn media_becomes_classifiable_once_rendered() {
    let relay = FakeRelay::new();
    relay.set_nsfw(true);
    let h = start(relay, PipelineConfig::default()).await;

    let node = h.document.push_media("https://cdn.example/pic.jpg", false);
    settle().await;
    assert_eq!(h.relay.media_call_count(), 0);

    h.document.set_rendered("https://cdn.example/pic.jpg", true);
    settle().await;
    assert_eq!(h.relay.media_call_count(), 1);
    assert!(node.has_class("nsfw-blur"));
}

#[tokio::test(start_paused = true)]
async fn cache_stays_within_its_cap() {
    let relay = FakeRelay::new();
    relay.set_ad_probability(0.3);
    let config = PipelineConfig {
        cache_cap: 2,
        ..PipelineConfig::default()
    };
    let h = start(relay, config).await;

    for i in 0..3 {
        h.document
            .push_message(Some(format!("m{i}")), format!("message {i}"), None, false);
        settle().await;
    }

    assert_eq!(h.relay.message_call_count(), 3);
    assert_eq!(h.pipeline.stats().cached_verdicts, 2);

    // The oldest identity was evicted; re-presenting it costs another relay
    // call while the newest stays served from cache.
    h.document.remove("m0");
    h.document.remove("m2");
    h.document
        .push_message(Some("m0".into()), "message 0", None, false);
    h.document
        .push_message(Some("m2".into()), "message 2", None, false);
    settle().await;
    assert_eq!(h.relay.message_call_count(), 4);
}

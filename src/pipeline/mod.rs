//! The detection-dedup-classify-annotate pipeline.
//!
//! A pass is synchronous: it scans the document, annotates cache hits
//! directly, and spawns one classification task per miss. Pass bodies and
//! settings invalidation are serialized by a single mutex over the shared
//! state, so no pass can observe a half-cleared cache; only the await points
//! inside dispatched relay calls run concurrently.

pub mod annotate;
pub mod cache;
mod dispatch;
pub mod extract;
mod scheduler;

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::Notify, task::JoinHandle};

use crate::{
    document::Document,
    domain::Verdict,
    infrastructure::shutdown::ShutdownListener,
    relay::ClassifyRelay,
    settings::SettingsStore,
};

use annotate::{EXCLUDED_CONTEXT_CLASS, PROCESSED_MEDIA_CLASS, PROCESSED_MESSAGE_CLASS};
use cache::VerdictCache;
use dispatch::InFlight;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Quiet interval for trailing-edge debounce of mutation signals.
    pub quiet_interval: Duration,
    /// Cadence of the fallback pass that recovers missed observations.
    pub fallback_interval: Duration,
    /// Verdict cache cap; oldest entries are evicted beyond this.
    pub cache_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quiet_interval: Duration::from_millis(300),
            fallback_interval: Duration::from_secs(3),
            cache_cap: 500,
        }
    }
}

/// Point-in-time counters, mostly for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub cached_verdicts: usize,
    pub in_flight: usize,
    pub generation: u64,
}

pub(crate) struct PassState {
    pub(crate) cache: VerdictCache,
    pub(crate) generation: u64,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<PassState>,
    pub(crate) in_flight: InFlight,
    pub(crate) relay: Arc<dyn ClassifyRelay>,
    pub(crate) store: SettingsStore,
    pub(crate) document: Document,
}

#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
    signal: Arc<Notify>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        document: Document,
        store: SettingsStore,
        relay: Arc<dyn ClassifyRelay>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PassState {
                    cache: VerdictCache::new(config.cache_cap),
                    generation: 0,
                }),
                in_flight: InFlight::default(),
                relay,
                store,
                document,
            }),
            signal: Arc::new(Notify::new()),
            config,
        }
    }

    /// Wires the mutation observer and spawns the scheduler loop plus the
    /// settings watcher. The pipeline keeps running on its own cadence until
    /// shutdown, regardless of any single pass's outcome.
    pub fn start(&self, shutdown: ShutdownListener) -> Vec<JoinHandle<()>> {
        let notify = self.signal.clone();
        self.shared
            .document
            .set_mutation_observer(Arc::new(move || notify.notify_one()));

        let scheduler = tokio::spawn(scheduler::run(
            self.clone(),
            self.signal.clone(),
            self.config.quiet_interval,
            self.config.fallback_interval,
            shutdown.clone(),
        ));
        let watcher = tokio::spawn(watch_settings(self.clone(), shutdown));
        vec![scheduler, watcher]
    }

    /// Queues a processing pass; bursts coalesce into one debounced pass.
    pub fn signal(&self) {
        self.signal.notify_one();
    }

    /// One extraction-plus-dispatch cycle. Synchronous; items are handled in
    /// document order, and a failure on one item never aborts its siblings.
    pub fn run_pass(&self) {
        let settings = self.shared.store.current();
        let state = self.shared.state.lock();
        let generation = state.generation;

        if settings.ad_enabled {
            let context_excluded = self
                .shared
                .document
                .context()
                .map(|context| settings.context_excluded(&context))
                .unwrap_or(false);

            for item in extract::scan_messages(&self.shared.document) {
                let Some(node) = item.node.upgrade() else {
                    continue;
                };
                if context_excluded {
                    node.add_class(EXCLUDED_CONTEXT_CLASS);
                    node.add_class(PROCESSED_MESSAGE_CLASS);
                    continue;
                }
                match state.cache.get(&item.identity) {
                    Some(Verdict::Message(verdict)) => {
                        let verdict = *verdict;
                        annotate::apply_message(&node, &verdict, &settings);
                        node.add_class(PROCESSED_MESSAGE_CLASS);
                    }
                    // A media verdict under a message identity is a key
                    // collision; reclassify and let the new verdict win.
                    Some(Verdict::Media(_)) | None => {
                        dispatch::spawn_message(
                            &self.shared,
                            item,
                            generation,
                            settings.analysis_mode,
                        );
                    }
                }
            }
        }

        if settings.media_enabled {
            for item in extract::scan_media(&self.shared.document) {
                let Some(node) = item.node.upgrade() else {
                    continue;
                };
                match state.cache.get(&item.identity()) {
                    Some(Verdict::Media(verdict)) => {
                        let verdict = *verdict;
                        annotate::apply_media(&node, &verdict, &settings);
                        node.add_class(PROCESSED_MEDIA_CLASS);
                    }
                    Some(Verdict::Message(_)) | None => {
                        dispatch::spawn_media(&self.shared, item, generation);
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let state = self.shared.state.lock();
        PipelineStats {
            cached_verdicts: state.cache.len(),
            in_flight: self.shared.in_flight.len(),
            generation: state.generation,
        }
    }

    /// Settings changed: advance the generation so outstanding relay calls
    /// discard their results, clear the cache, and strip every annotation in
    /// one step relative to pass bodies.
    fn invalidate(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        state.cache.clear();
        for node in self.shared.document.nodes() {
            annotate::reset(&node);
        }
        tracing::info!(
            target: "pipeline",
            generation = state.generation,
            "verdicts invalidated; document annotations reset"
        );
    }
}

async fn watch_settings(pipeline: Pipeline, mut shutdown: ShutdownListener) {
    let mut changes = pipeline.shared.store.subscribe();
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }
                pipeline.invalidate();
                pipeline.signal();
            }
            _ = shutdown.notified() => return,
        }
    }
}

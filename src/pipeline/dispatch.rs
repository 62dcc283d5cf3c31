//! Asynchronous classification dispatch. One spawned task per cache-missed
//! item; failures are logged and leave the item eligible for the next pass.

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;

use crate::{
    domain::{Identity, MediaItem, MessageItem, Verdict},
    settings::AnalysisMode,
};

use super::{
    annotate::{self, PROCESSED_MEDIA_CLASS, PROCESSED_MESSAGE_CLASS},
    Shared,
};

/// Identities with an outstanding relay call. Checked and inserted in one
/// step before dispatching, so two passes that both miss the cache for the
/// same identity issue a single call; removed on resolution, success or
/// failure alike.
#[derive(Default)]
pub(crate) struct InFlight {
    identities: Mutex<HashSet<Identity>>,
}

impl InFlight {
    fn begin(&self, identity: Identity) -> bool {
        self.identities.lock().insert(identity)
    }

    fn finish(&self, identity: &Identity) {
        self.identities.lock().remove(identity);
    }

    pub(crate) fn len(&self) -> usize {
        self.identities.lock().len()
    }
}

pub(crate) fn spawn_message(
    shared: &Arc<Shared>,
    item: MessageItem,
    generation: u64,
    mode: AnalysisMode,
) {
    if !shared.in_flight.begin(item.identity.clone()) {
        return;
    }
    let shared = shared.clone();
    tokio::spawn(async move {
        let identity = item.identity.clone();
        let outcome = shared
            .relay
            .classify_message(&item.text, item.media_src.as_deref(), mode)
            .await;
        match outcome {
            Ok(verdict) => {
                tracing::debug!(
                    target: "dispatch",
                    identity = %identity,
                    probability = verdict.ad_probability,
                    "message classified"
                );
                commit_verdict(
                    &shared,
                    generation,
                    identity.clone(),
                    Verdict::Message(verdict),
                    || {
                        if let Some(node) = item.node.upgrade() {
                            annotate::apply_message(&node, &verdict, &shared.store.current());
                            node.add_class(PROCESSED_MESSAGE_CLASS);
                        }
                    },
                );
            }
            Err(err) => {
                tracing::error!(
                    target: "dispatch",
                    identity = %identity,
                    error = %err,
                    "message classification failed; will retry next pass"
                );
            }
        }
        shared.in_flight.finish(&identity);
    });
}

pub(crate) fn spawn_media(shared: &Arc<Shared>, item: MediaItem, generation: u64) {
    let identity = item.identity();
    if !shared.in_flight.begin(identity.clone()) {
        return;
    }
    let shared = shared.clone();
    tokio::spawn(async move {
        let outcome = shared.relay.classify_media(&item.src).await;
        match outcome {
            Ok(verdict) => {
                tracing::debug!(
                    target: "dispatch",
                    src = %item.src,
                    probability = verdict.nsfw_probability,
                    "media classified"
                );
                commit_verdict(
                    &shared,
                    generation,
                    identity.clone(),
                    Verdict::Media(verdict),
                    || {
                        if let Some(node) = item.node.upgrade() {
                            annotate::apply_media(&node, &verdict, &shared.store.current());
                            node.add_class(PROCESSED_MEDIA_CLASS);
                        }
                    },
                );
            }
            Err(err) => {
                tracing::error!(
                    target: "dispatch",
                    src = %item.src,
                    error = %err,
                    "media classification failed; will retry next pass"
                );
            }
        }
        shared.in_flight.finish(&identity);
    });
}

/// Commits a fresh verdict unless the settings generation moved on while the
/// call was outstanding; stale results are discarded, not retried. The
/// annotation closure runs under the state lock, in one step with the cache
/// write relative to invalidation.
fn commit_verdict(
    shared: &Shared,
    generation: u64,
    identity: Identity,
    verdict: Verdict,
    annotate: impl FnOnce(),
) {
    let mut state = shared.state.lock();
    if state.generation != generation {
        tracing::debug!(
            target: "dispatch",
            identity = %identity,
            generation,
            current = state.generation,
            "discarding stale verdict"
        );
        return;
    }
    state.cache.put(identity, verdict);
    annotate();
}

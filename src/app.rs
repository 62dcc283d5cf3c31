use std::{sync::Arc, time::Duration};

use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
    time::timeout,
};

use crate::{
    config::AppConfig,
    document::Document,
    infrastructure::shutdown::Shutdown,
    pipeline::Pipeline,
    relay::HttpRelay,
    settings::{MemoryBackend, SettingsStore},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Feed event consumed by the harness, one JSON object per stdin line.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum FeedEvent {
    Message {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        media: Option<String>,
        #[serde(default)]
        own: bool,
    },
    Media {
        src: String,
        #[serde(default = "default_rendered")]
        rendered: bool,
    },
    Rendered {
        key: String,
        rendered: bool,
    },
    Context {
        #[serde(default)]
        name: Option<String>,
    },
    Remove {
        key: String,
    },
    Settings {
        values: Map<String, Value>,
    },
    Dump,
    Stats,
}

fn default_rendered() -> bool {
    true
}

/// Binary harness: drives the pipeline from a JSONL event stream on stdin,
/// classifying against the configured HTTP relay.
pub struct FeedGuardApp {
    document: Document,
    backend: Arc<MemoryBackend>,
    store: SettingsStore,
    pipeline: Pipeline,
    handles: Vec<JoinHandle<()>>,
    shutdown: Shutdown,
}

impl FeedGuardApp {
    pub fn initialize(config: AppConfig, shutdown: Shutdown) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("feedguard/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.relay.timeout)
            .build()?;
        let relay = Arc::new(HttpRelay::new(http, config.relay.clone()));

        let backend = Arc::new(MemoryBackend::default());
        let store = SettingsStore::new(backend.clone());
        let document = Document::new();

        let pipeline = Pipeline::new(
            document.clone(),
            store.clone(),
            relay,
            config.pipeline.clone(),
        );
        let handles = pipeline.start(shutdown.subscribe());

        Ok(Self {
            document,
            backend,
            store,
            pipeline,
            handles,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("feedguard started; reading feed events from stdin");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut shutdown_listener = self.shutdown.subscribe();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<FeedEvent>(line) {
                            Ok(event) => self.apply_event(event),
                            Err(err) => {
                                tracing::warn!(error = %err, "ignoring malformed feed event");
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!("feed stream ended");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to read feed stream");
                        break;
                    }
                },
                _ = shutdown_listener.notified() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown.trigger();
        for mut handle in self.handles {
            match timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if err.is_panic() {
                        tracing::error!("pipeline task panicked");
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        "pipeline task did not stop within {:?}; aborting",
                        SHUTDOWN_TIMEOUT
                    );
                    handle.abort();
                }
            }
        }
        tracing::info!("feedguard stopped");
        Ok(())
    }

    fn apply_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Message {
                id,
                text,
                media,
                own,
            } => {
                self.document.push_message(id, text, media, own);
            }
            FeedEvent::Media { src, rendered } => {
                self.document.push_media(src, rendered);
            }
            FeedEvent::Rendered { key, rendered } => {
                self.document.set_rendered(&key, rendered);
            }
            FeedEvent::Context { name } => {
                self.document.set_context(name);
            }
            FeedEvent::Remove { key } => {
                if !self.document.remove(&key) {
                    tracing::warn!(key = %key, "remove event matched no node");
                }
            }
            FeedEvent::Settings { values } => {
                self.backend.replace(values);
                if !self.store.reload() {
                    tracing::info!(target: "settings", "settings event produced no change");
                }
            }
            FeedEvent::Dump => match serde_json::to_string_pretty(&self.document.snapshot()) {
                Ok(dump) => println!("{dump}"),
                Err(err) => tracing::error!(error = %err, "failed to serialize document dump"),
            },
            FeedEvent::Stats => {
                let stats = self.pipeline.stats();
                tracing::info!(
                    cached = stats.cached_verdicts,
                    in_flight = stats.in_flight,
                    generation = stats.generation,
                    "pipeline stats"
                );
            }
        }
    }
}

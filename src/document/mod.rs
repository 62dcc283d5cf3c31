use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;
use serde::Serialize;

/// Callback invoked on every structural mutation of the document.
pub type MutationObserver = Arc<dyn Fn() + Send + Sync>;

/// Immutable content of a document node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Message {
        stable_id: Option<String>,
        own: bool,
        text: String,
        media_src: Option<String>,
    },
    Media {
        src: String,
    },
}

/// A small floating marker attached to a node (e.g. the probability label).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub css_class: String,
    pub text: String,
    pub positive: bool,
}

/// One entry of the observed feed. Content is immutable; visual state
/// (classes, inline styles, labels) is mutable and only ever written by the
/// annotator.
pub struct Node {
    kind: NodeKind,
    rendered: AtomicBool,
    classes: Mutex<BTreeSet<String>>,
    styles: Mutex<BTreeMap<String, String>>,
    labels: Mutex<Vec<Label>>,
}

impl Node {
    fn new(kind: NodeKind, rendered: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            rendered: AtomicBool::new(rendered),
            classes: Mutex::new(BTreeSet::new()),
            styles: Mutex::new(BTreeMap::new()),
            labels: Mutex::new(Vec::new()),
        })
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered.load(Ordering::Acquire)
    }

    /// The node's lookup key: stable id for messages (when present), source
    /// locator for media.
    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Message { stable_id, .. } => stable_id.as_deref(),
            NodeKind::Media { src } => Some(src),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.lock().contains(class)
    }

    pub fn add_class(&self, class: &str) {
        self.classes.lock().insert(class.to_string());
    }

    pub fn remove_class(&self, class: &str) {
        self.classes.lock().remove(class);
    }

    pub fn set_style(&self, property: &str, value: &str) {
        self.styles.lock().insert(property.to_string(), value.to_string());
    }

    pub fn remove_style(&self, property: &str) {
        self.styles.lock().remove(property);
    }

    pub fn clear_styles(&self) {
        self.styles.lock().clear();
    }

    pub fn push_label(&self, label: Label) {
        self.labels.lock().push(label);
    }

    pub fn remove_labels(&self, css_class: &str) {
        self.labels.lock().retain(|label| label.css_class != css_class);
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let (kind, key, text) = match &self.kind {
            NodeKind::Message { stable_id, text, .. } => {
                ("message", stable_id.clone(), Some(text.clone()))
            }
            NodeKind::Media { src } => ("media", Some(src.clone()), None),
        };
        NodeSnapshot {
            kind,
            key,
            text,
            classes: self.classes.lock().iter().cloned().collect(),
            styles: self.styles.lock().clone(),
            labels: self.labels.lock().clone(),
        }
    }
}

/// Weak handle to a node. The pipeline never owns document nodes; validity
/// is checked at use time and a vanished node is simply skipped.
#[derive(Debug, Clone)]
pub struct NodeHandle(Weak<Node>);

impl NodeHandle {
    pub fn of(node: &Arc<Node>) -> Self {
        Self(Arc::downgrade(node))
    }

    pub fn upgrade(&self) -> Option<Arc<Node>> {
        self.0.upgrade()
    }
}

/// Serializable view of a node, used by the harness dump and by tests to
/// compare visual state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub kind: &'static str,
    pub key: Option<String>,
    pub text: Option<String>,
    pub classes: Vec<String>,
    pub styles: BTreeMap<String, String>,
    pub labels: Vec<Label>,
}

#[derive(Default)]
struct DocumentInner {
    nodes: Mutex<Vec<Arc<Node>>>,
    context: Mutex<Option<String>>,
    observer: Mutex<Option<MutationObserver>>,
}

/// The observed feed: an ordered collection of nodes plus the current chat
/// context. Structural mutations fire the registered observer.
#[derive(Clone, Default)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mutation_observer(&self, observer: MutationObserver) {
        *self.inner.observer.lock() = Some(observer);
    }

    pub fn push_message(
        &self,
        stable_id: Option<String>,
        text: impl Into<String>,
        media_src: Option<String>,
        own: bool,
    ) -> Arc<Node> {
        let node = Node::new(
            NodeKind::Message {
                stable_id,
                own,
                text: text.into(),
                media_src,
            },
            true,
        );
        self.inner.nodes.lock().push(node.clone());
        self.notify();
        node
    }

    pub fn push_media(&self, src: impl Into<String>, rendered: bool) -> Arc<Node> {
        let node = Node::new(NodeKind::Media { src: src.into() }, rendered);
        self.inner.nodes.lock().push(node.clone());
        self.notify();
        node
    }

    /// Removes the first node whose key matches; dangling handles held by
    /// in-flight classifications are left to expire.
    pub fn remove(&self, key: &str) -> bool {
        let mut nodes = self.inner.nodes.lock();
        let before = nodes.len();
        if let Some(pos) = nodes.iter().position(|node| node.key() == Some(key)) {
            nodes.remove(pos);
        }
        let removed = nodes.len() != before;
        drop(nodes);
        if removed {
            self.notify();
        }
        removed
    }

    pub fn set_rendered(&self, key: &str, rendered: bool) {
        let mut changed = false;
        for node in self.inner.nodes.lock().iter() {
            if node.key() == Some(key) {
                node.rendered.store(rendered, Ordering::Release);
                changed = true;
            }
        }
        if changed {
            self.notify();
        }
    }

    pub fn set_context(&self, context: Option<String>) {
        *self.inner.context.lock() = context;
        self.notify();
    }

    pub fn context(&self) -> Option<String> {
        self.inner.context.lock().clone()
    }

    /// Ordered snapshot of the current nodes; cheap to discard, taken afresh
    /// on every scan.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.inner.nodes.lock().clone()
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes().iter().map(|node| node.snapshot()).collect()
    }

    fn notify(&self) {
        let observer = self.inner.observer.lock().clone();
        if let Some(observer) = observer {
            observer();
        }
    }
}

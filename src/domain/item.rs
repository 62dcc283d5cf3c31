use std::fmt;

use crate::document::NodeHandle;

/// Number of leading characters of message text that participate in the
/// synthesized identity of a message without a stable id.
const IDENTITY_TEXT_LEN: usize = 30;

/// Stable key used to dedupe and cache an item across scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the identity of a message node.
///
/// A node-provided stable id wins. Otherwise the identity is the truncated
/// text plus the media source; two distinct un-ided messages with equal
/// truncated text and no media can therefore collide (known limitation, the
/// later verdict supersedes the earlier one). A random salt is used only
/// when both text and media are absent.
pub fn message_identity(stable_id: Option<&str>, text: &str, media_src: Option<&str>) -> Identity {
    if let Some(id) = stable_id {
        if !id.is_empty() {
            return Identity(id.to_string());
        }
    }
    let prefix: String = text.chars().take(IDENTITY_TEXT_LEN).collect();
    match media_src {
        Some(src) => Identity(format!("{prefix}{src}")),
        None if !prefix.is_empty() => Identity(prefix),
        None => Identity(format!("anon:{:016x}", rand::random::<u64>())),
    }
}

/// A classifiable message discovered during a scan. Holds only a weak
/// handle to its node; if the node vanishes before the verdict arrives,
/// re-annotation is skipped.
#[derive(Debug, Clone)]
pub struct MessageItem {
    pub identity: Identity,
    pub text: String,
    pub media_src: Option<String>,
    pub node: NodeHandle,
}

/// A standalone media element discovered during a scan. Identity is the
/// source locator itself.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub src: String,
    pub node: NodeHandle,
}

impl MediaItem {
    pub fn identity(&self) -> Identity {
        Identity::new(self.src.clone())
    }
}

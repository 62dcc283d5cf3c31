//! Scans the live document for classifiable items. Scans are lazy,
//! restartable, and re-run from scratch on every scheduled pass; skip rules
//! keep already-handled nodes out of later passes.

use url::Url;

use crate::{
    document::{Document, NodeHandle, NodeKind},
    domain::{message_identity, MediaItem, MessageItem},
};

use super::annotate::{PROCESSED_MEDIA_CLASS, PROCESSED_MESSAGE_CLASS};

/// Messages not yet handled, in document order. Skips the viewer's own
/// messages, processed-marked nodes, and nodes with neither text nor media.
pub fn scan_messages(document: &Document) -> impl Iterator<Item = MessageItem> {
    document.nodes().into_iter().filter_map(|node| {
        let NodeKind::Message {
            stable_id,
            own,
            text,
            media_src,
        } = node.kind()
        else {
            return None;
        };
        if *own || node.has_class(PROCESSED_MESSAGE_CLASS) {
            return None;
        }
        let text = text.trim();
        if text.is_empty() && media_src.is_none() {
            return None;
        }
        Some(MessageItem {
            identity: message_identity(stable_id.as_deref(), text, media_src.as_deref()),
            text: text.to_string(),
            media_src: media_src.clone(),
            node: NodeHandle::of(&node),
        })
    })
}

/// Media elements not yet handled: rendered, fetchable source, no processed
/// marker.
pub fn scan_media(document: &Document) -> impl Iterator<Item = MediaItem> {
    document.nodes().into_iter().filter_map(|node| {
        let NodeKind::Media { src } = node.kind() else {
            return None;
        };
        if node.has_class(PROCESSED_MEDIA_CLASS) || !node.is_rendered() || !fetchable(src) {
            return None;
        }
        Some(MediaItem {
            src: src.clone(),
            node: NodeHandle::of(&node),
        })
    })
}

fn fetchable(src: &str) -> bool {
    if src.starts_with("blob:") {
        return true;
    }
    Url::parse(src)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_own_processed_and_empty_messages() {
        let doc = Document::new();
        doc.push_message(Some("m1".into()), "hello", None, false);
        doc.push_message(Some("m2".into()), "mine", None, true);
        doc.push_message(Some("m3".into()), "   ", None, false);
        let processed = doc.push_message(Some("m4".into()), "done", None, false);
        processed.add_class(PROCESSED_MESSAGE_CLASS);
        doc.push_message(Some("m5".into()), "", Some("https://x/a.png".into()), false);

        let ids: Vec<String> = scan_messages(&doc)
            .map(|item| item.identity.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["m1", "m5"]);
    }

    #[test]
    fn scan_is_restartable() {
        let doc = Document::new();
        doc.push_message(Some("m1".into()), "hello", None, false);
        assert_eq!(scan_messages(&doc).count(), 1);
        assert_eq!(scan_messages(&doc).count(), 1);
    }

    #[test]
    fn skips_unrendered_and_unfetchable_media() {
        let doc = Document::new();
        doc.push_media("https://x/a.png", true);
        doc.push_media("https://x/hidden.png", false);
        doc.push_media("data:image/png;base64,AAAA", true);
        doc.push_media("blob:session/0001", true);

        let srcs: Vec<String> = scan_media(&doc).map(|item| item.src).collect();
        assert_eq!(srcs, vec!["https://x/a.png", "blob:session/0001"]);
    }
}

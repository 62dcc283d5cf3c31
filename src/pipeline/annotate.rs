//! Idempotent application and removal of visual treatment. The annotator is
//! the only writer of node visual state; what it applies is a pure function
//! of the current settings and the cached verdict, so reapplying is always
//! safe.

use crate::{
    document::{Label, Node},
    domain::{MediaVerdict, MessageVerdict},
    settings::{AdDisplayMode, MediaDisplayMode, Settings},
};

/// Marker for message nodes that have been handled in the current
/// generation (classified, cache-hit, or context-excluded).
pub const PROCESSED_MESSAGE_CLASS: &str = "ad-classified";
/// Marker for message nodes skipped because their context is excluded.
pub const EXCLUDED_CONTEXT_CLASS: &str = "ad-excluded";
/// Marker for media nodes that have been handled in the current generation.
pub const PROCESSED_MEDIA_CLASS: &str = "nsfw-processed";
pub const PREDICTION_LABEL_CLASS: &str = "prediction-label";

const NSFW_BLUR_CLASS: &str = "nsfw-blur";
const NSFW_BORDER_CLASS: &str = "nsfw-border";
const NSFW_HIDDEN_CLASS: &str = "nsfw-hidden";

const HIGHLIGHT_BACKGROUND: &str = "rgba(255, 204, 203, 0.2)";
const HIGHLIGHT_BORDER: &str = "3px solid #ff7979";

pub fn apply_message(node: &Node, verdict: &MessageVerdict, settings: &Settings) {
    node.remove_labels(PREDICTION_LABEL_CLASS);
    node.clear_styles();

    let positive = verdict.ad_probability >= settings.ad_threshold;
    node.push_label(Label {
        css_class: PREDICTION_LABEL_CLASS.to_string(),
        text: format!("Ad: {:.1}%", verdict.ad_probability * 100.0),
        positive,
    });

    if positive {
        match settings.ad_display_mode {
            AdDisplayMode::Highlight => {
                node.set_style("background-color", HIGHLIGHT_BACKGROUND);
                node.set_style("border-left", HIGHLIGHT_BORDER);
            }
            AdDisplayMode::Hide => node.set_style("display", "none"),
            AdDisplayMode::Partial => node.set_style("opacity", "0.4"),
            AdDisplayMode::LabelOnly => {}
        }
    }
}

pub fn apply_media(node: &Node, verdict: &MediaVerdict, settings: &Settings) {
    node.remove_class(NSFW_BLUR_CLASS);
    node.remove_class(NSFW_BORDER_CLASS);
    node.remove_class(NSFW_HIDDEN_CLASS);
    node.remove_style("display");

    if verdict.is_nsfw {
        match settings.media_display_mode {
            MediaDisplayMode::Blur => node.add_class(NSFW_BLUR_CLASS),
            MediaDisplayMode::Hide => node.add_class(NSFW_HIDDEN_CLASS),
            MediaDisplayMode::Border => node.add_class(NSFW_BORDER_CLASS),
            MediaDisplayMode::None => {}
        }
    }
}

/// Restores a node to its pristine visual state. Removes only
/// annotator-owned markers, styles, and labels; callable on nodes that were
/// never annotated.
pub fn reset(node: &Node) {
    for class in [
        PROCESSED_MESSAGE_CLASS,
        EXCLUDED_CONTEXT_CLASS,
        PROCESSED_MEDIA_CLASS,
        NSFW_BLUR_CLASS,
        NSFW_BORDER_CLASS,
        NSFW_HIDDEN_CLASS,
    ] {
        node.remove_class(class);
    }
    node.clear_styles();
    node.remove_labels(PREDICTION_LABEL_CLASS);
}

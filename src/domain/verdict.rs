use serde::Deserialize;

/// Verdict for a message item, as returned by the classification relay.
/// The boolean is re-derived against the configured threshold at
/// annotation time; the relay's own flag is kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MessageVerdict {
    #[serde(rename = "prediction_prob_ad")]
    pub ad_probability: f64,
    #[serde(default, rename = "is_ad")]
    pub is_ad: bool,
}

/// Verdict for a standalone media item.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MediaVerdict {
    #[serde(rename = "prediction_prob_nsfw")]
    pub nsfw_probability: f64,
    #[serde(default, rename = "is_nsfw")]
    pub is_nsfw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Message(MessageVerdict),
    Media(MediaVerdict),
}

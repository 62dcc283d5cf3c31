mod http;

pub use http::HttpRelay;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    domain::{MediaVerdict, MessageVerdict},
    settings::AnalysisMode,
};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("text-only classification requires message text")]
    MissingText,
}

/// The remote classification relay. One call per item, single attempt; a
/// transport failure or a non-success status is reported distinctly from a
/// well-formed negative verdict. Retrying is the scheduler's business, not
/// the relay's.
#[async_trait]
pub trait ClassifyRelay: Send + Sync {
    async fn classify_message(
        &self,
        text: &str,
        media_src: Option<&str>,
        mode: AnalysisMode,
    ) -> Result<MessageVerdict, RelayError>;

    async fn classify_media(&self, src: &str) -> Result<MediaVerdict, RelayError>;
}

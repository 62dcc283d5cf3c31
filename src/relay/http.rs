use reqwest::{header::CONTENT_TYPE, multipart, Client, Response};

use crate::{
    config::RelayConfig,
    domain::{MediaVerdict, MessageVerdict},
    settings::AnalysisMode,
};

use super::{ClassifyRelay, RelayError};

/// HTTP implementation of the classification relay.
#[derive(Clone)]
pub struct HttpRelay {
    http: Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(http: Client, config: RelayConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn checked(response: Response) -> Result<Response, RelayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RelayError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Downloads the media bytes an endpoint expects as a form part.
    async fn fetch_source(&self, src: &str) -> Result<(Vec<u8>, Option<String>), RelayError> {
        let response = self.http.get(src).send().await?;
        let response = Self::checked(response).await?;
        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), mime))
    }
}

fn media_part(bytes: Vec<u8>, mime: Option<String>) -> Result<multipart::Part, RelayError> {
    let subtype = mime
        .as_deref()
        .and_then(|value| value.split('/').nth(1))
        .map(|value| value.split(';').next().unwrap_or("png").trim().to_string())
        .unwrap_or_else(|| "png".to_string());
    let part = multipart::Part::bytes(bytes).file_name(format!("image.{subtype}"));
    match mime {
        Some(mime) => Ok(part.mime_str(&mime)?),
        None => Ok(part),
    }
}

#[async_trait::async_trait]
impl ClassifyRelay for HttpRelay {
    async fn classify_message(
        &self,
        text: &str,
        media_src: Option<&str>,
        mode: AnalysisMode,
    ) -> Result<MessageVerdict, RelayError> {
        match mode {
            AnalysisMode::TextOnly => {
                if text.trim().is_empty() {
                    return Err(RelayError::MissingText);
                }
                let response = self
                    .http
                    .post(format!("{}/api/classify_text/", self.base_url))
                    .json(&serde_json::json!({ "text": text }))
                    .send()
                    .await?;
                let response = Self::checked(response).await?;
                Ok(response.json().await?)
            }
            AnalysisMode::Multimodal => {
                let mut form = multipart::Form::new().text("text", text.to_string());
                if let Some(src) = media_src {
                    // A failed media fetch degrades to text-only rather than
                    // losing the whole item.
                    match self.fetch_source(src).await {
                        Ok((bytes, mime)) => {
                            form = form.part("image", media_part(bytes, mime)?);
                        }
                        Err(err) => {
                            tracing::warn!(
                                target: "relay",
                                src,
                                error = %err,
                                "media fetch failed; classifying text only"
                            );
                        }
                    }
                }
                let response = self
                    .http
                    .post(format!("{}/api/classify_message/", self.base_url))
                    .multipart(form)
                    .send()
                    .await?;
                let response = Self::checked(response).await?;
                Ok(response.json().await?)
            }
        }
    }

    async fn classify_media(&self, src: &str) -> Result<MediaVerdict, RelayError> {
        let (bytes, mime) = self.fetch_source(src).await?;
        let form = multipart::Form::new().part("file", media_part(bytes, mime)?);
        let response = self
            .http
            .post(format!("{}/api/classify_nsfw_image/", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        Ok(response.json().await?)
    }
}

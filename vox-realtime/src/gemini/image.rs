//! Image generation through the Gemini `generateContent` REST call.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

use super::{DEFAULT_IMAGE_MODEL, GEMINI_API_BASE};
use crate::config::Credentials;
use crate::error::{RealtimeError, Result};
use crate::image::{GeneratedImage, ImageGenerator};

/// Generates images with a Gemini image model.
#[derive(Debug, Clone)]
pub struct GeminiImageGenerator {
    client: reqwest::Client,
    credentials: Credentials,
    model: String,
    base_url: String,
}

impl GeminiImageGenerator {
    /// Generator using [`DEFAULT_IMAGE_MODEL`].
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            model: DEFAULT_IMAGE_MODEL.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Use a different image model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Use a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The model in use.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    mime_type: Option<String>,
    data: String,
}

/// Pick the first inline image out of a `generateContent` response body.
fn first_image(response: GenerateContentResponse) -> Option<GeneratedImage> {
    response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.inline_data)
        .find(|inline| !inline.data.is_empty())
        .map(|inline| GeneratedImage {
            data_base64: inline.data,
            mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
        })
}

#[async_trait]
impl ImageGenerator for GeminiImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.credentials.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| RealtimeError::action(format!("Image request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RealtimeError::action(format!("Image API returned {status}: {detail}")));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| RealtimeError::action(format!("Invalid image response: {e}")))?;
        let image = first_image(parsed)
            .ok_or_else(|| RealtimeError::action("No image data in response"))?;
        tracing::info!(model = %self.model, mime_type = %image.mime_type, "Image generated");
        Ok(image)
    }
}

//! The `create_image` tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Instrument;

use crate::config::ToolDefinition;
use crate::error::{RealtimeError, Result};
use crate::observer::SessionObserver;
use crate::tools::ToolAction;

/// Name the model uses to request an image.
pub const CREATE_IMAGE_TOOL: &str = "create_image";

/// Message returned to the model after a successful generation.
pub const IMAGE_SUCCESS_MESSAGE: &str = "Image generated successfully and shown to the user.";

/// An image produced by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Base64-encoded image bytes.
    pub data_base64: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
}

/// A single request → single image call.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage>;
}

/// Tool action that generates an image and hands it to the observer.
pub struct CreateImageTool {
    generator: Arc<dyn ImageGenerator>,
    observer: Arc<dyn SessionObserver>,
}

impl CreateImageTool {
    /// Create the tool.
    pub fn new(generator: Arc<dyn ImageGenerator>, observer: Arc<dyn SessionObserver>) -> Self {
        Self { generator, observer }
    }

    /// The declaration advertised to the model.
    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(CREATE_IMAGE_TOOL)
            .with_description(
                "Generate an image from a text description and show it to the user. Use this \
                 whenever the user asks you to draw, paint, design or visualize something.",
            )
            .with_required_string("prompt", "A detailed description of the image to generate.")
    }
}

#[async_trait]
impl ToolAction for CreateImageTool {
    fn declaration(&self) -> ToolDefinition {
        Self::definition()
    }

    async fn invoke(&self, args: &Value) -> Result<String> {
        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RealtimeError::action("Missing required argument: prompt"))?;

        tracing::info!(prompt_len = prompt.len(), "Generating image");
        let image = self.generator.generate(prompt).await?;
        self.observer
            .on_image_generated(&image.data_base64)
            .instrument(vox_telemetry::callback_span("image"))
            .await;
        Ok(IMAGE_SUCCESS_MESSAGE.to_string())
    }
}

impl std::fmt::Debug for CreateImageTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateImageTool").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct FixedGenerator(Result<&'static str>);

    #[async_trait]
    impl ImageGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedImage> {
            match &self.0 {
                Ok(data) => Ok(GeneratedImage {
                    data_base64: data.to_string(),
                    mime_type: "image/png".to_string(),
                }),
                Err(e) => Err(RealtimeError::action(e.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct Images(Mutex<Vec<String>>);

    #[async_trait]
    impl SessionObserver for Images {
        async fn on_image_generated(&self, base64_data: &str) {
            self.0.lock().push(base64_data.to_string());
        }
    }

    #[tokio::test]
    async fn test_success_notifies_observer() {
        let images = Arc::new(Images::default());
        let tool = CreateImageTool::new(Arc::new(FixedGenerator(Ok("iVBOR"))), images.clone());

        let message = tool.invoke(&json!({"prompt": "a red fox"})).await.unwrap();
        assert_eq!(message, IMAGE_SUCCESS_MESSAGE);
        assert_eq!(*images.0.lock(), vec!["iVBOR".to_string()]);
    }

    #[derive(Default)]
    struct SpanRecorder(Mutex<Vec<Option<String>>>);

    #[async_trait]
    impl SessionObserver for SpanRecorder {
        async fn on_image_generated(&self, _base64_data: &str) {
            let span = tracing::Span::current();
            self.0.lock().push(span.metadata().map(|m| m.name().to_string()));
        }
    }

    #[tokio::test]
    async fn test_observer_runs_in_callback_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let recorder = Arc::new(SpanRecorder::default());
        let tool = CreateImageTool::new(Arc::new(FixedGenerator(Ok("iVBOR"))), recorder.clone());

        tool.invoke(&json!({"prompt": "a red fox"})).await.unwrap();
        assert_eq!(*recorder.0.lock(), vec![Some("callback".to_string())]);
    }

    #[tokio::test]
    async fn test_failure_does_not_notify() {
        let images = Arc::new(Images::default());
        let tool = CreateImageTool::new(
            Arc::new(FixedGenerator(Err(RealtimeError::action("quota")))),
            images.clone(),
        );

        assert!(tool.invoke(&json!({"prompt": "a red fox"})).await.is_err());
        assert!(images.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_prompt_rejected() {
        let images = Arc::new(Images::default());
        let tool = CreateImageTool::new(Arc::new(FixedGenerator(Ok("x"))), images.clone());

        for args in [json!({}), json!({"prompt": "   "}), json!({"prompt": 3})] {
            assert!(matches!(tool.invoke(&args).await, Err(RealtimeError::Action(_))));
        }
        assert!(images.0.lock().is_empty());
    }

    #[test]
    fn test_definition_requires_prompt() {
        let def = CreateImageTool::definition();
        assert_eq!(def.name, "create_image");
        assert_eq!(def.parameters.unwrap()["required"], json!(["prompt"]));
    }
}

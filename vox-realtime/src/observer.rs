//! Callbacks exposed to the caller (typically a UI).

use async_trait::async_trait;

/// Receives session updates.
///
/// Every method has a no-op default. Callbacks run on the session task, so
/// a slow callback delays processing of the next inbound event.
///
/// # Example
///
/// ```rust,ignore
/// struct Printer;
///
/// #[async_trait]
/// impl SessionObserver for Printer {
///     async fn on_transcript_update(&self, input: &str, output: &str, is_final: bool) {
///         if is_final {
///             println!("you: {input}\nmodel: {output}");
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Called when either transcript changes or a turn completes.
    async fn on_transcript_update(&self, _input: &str, _output: &str, _is_final: bool) {}

    /// Called with base64 image bytes when the image tool succeeds.
    async fn on_image_generated(&self, _base64_data: &str) {}

    /// Called when the session becomes active or stops being active.
    async fn on_status_change(&self, _is_active: bool) {}
}

/// Default no-op observer.
#[derive(Debug, Clone, Default)]
pub struct NoOpObserver;

#[async_trait]
impl SessionObserver for NoOpObserver {}

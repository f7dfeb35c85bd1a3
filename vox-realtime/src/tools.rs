//! Tool dispatch: run model-requested functions and answer on the same connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Instrument;

use crate::config::ToolDefinition;
use crate::error::Result;
use crate::events::{OutboundEvent, ToolCall, ToolResponse};
use crate::transport::TransportSink;

/// An external capability the model can invoke.
#[async_trait]
pub trait ToolAction: Send + Sync {
    /// Declaration advertised to the model. Its `name` is the registry key.
    fn declaration(&self) -> ToolDefinition;

    /// Run the action and return a success message for the model.
    async fn invoke(&self, args: &Value) -> Result<String>;
}

/// What happened to one dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCompletion {
    /// The call's ID.
    pub id: String,
    /// The response that was produced.
    pub response: ToolResponse,
    /// Whether the response reached the transport.
    pub delivered: bool,
}

/// Fixed registry of tool actions.
#[derive(Clone, Default)]
pub struct ToolDispatcher {
    tools: HashMap<String, Arc<dyn ToolAction>>,
}

impl ToolDispatcher {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under its declared name.
    pub fn register(mut self, action: impl ToolAction + 'static) -> Self {
        let name = action.declaration().name;
        self.tools.insert(name, Arc::new(action));
        self
    }

    /// Register a shared action.
    pub fn register_arc(mut self, action: Arc<dyn ToolAction>) -> Self {
        self.tools.insert(action.declaration().name, action);
        self
    }

    /// Declarations for every registered action, sorted by name.
    pub fn declarations(&self) -> Vec<ToolDefinition> {
        let mut decls: Vec<ToolDefinition> =
            self.tools.values().map(|action| action.declaration()).collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no actions are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run `call` and map the outcome to a response. Never fails.
    ///
    /// Unknown names get an error-shaped response so the model's turn is
    /// not left waiting.
    pub async fn respond(&self, call: &ToolCall) -> ToolResponse {
        let Some(action) = self.tools.get(&call.name).cloned() else {
            tracing::warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
            return ToolResponse::error(call, format!("Unknown tool: {}", call.name));
        };

        match action.invoke(&call.args).await {
            Ok(message) => ToolResponse::success(call, message),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool action failed");
                ToolResponse::error(call, e.detail())
            }
        }
    }

    /// Run `call` and send its response on `sink`.
    ///
    /// A response that cannot be sent (transport already gone) is dropped.
    pub async fn dispatch(&self, call: ToolCall, sink: Arc<dyn TransportSink>) -> ToolCompletion {
        let span = vox_telemetry::tool_dispatch_span(&call.name, &call.id);
        async move {
            let response = self.respond(&call).await;
            let delivered = if sink.is_open() {
                match sink.send(OutboundEvent::ToolResponse(response.clone())).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(error = %e, "Tool response dropped");
                        false
                    }
                }
            } else {
                tracing::debug!("Transport closed; tool response dropped");
                false
            };
            tracing::info!(delivered, is_error = response.is_error(), "Tool call finished");
            ToolCompletion { id: call.id, response, delivered }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolDispatcher").field("tools", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RealtimeError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Echo;

    #[async_trait]
    impl ToolAction for Echo {
        fn declaration(&self) -> ToolDefinition {
            ToolDefinition::new("echo")
        }

        async fn invoke(&self, args: &Value) -> Result<String> {
            match args.get("text").and_then(Value::as_str) {
                Some(text) => Ok(text.to_string()),
                None => Err(RealtimeError::action("text is required")),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<OutboundEvent>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl TransportSink for RecordingSink {
        async fn send(&self, event: OutboundEvent) -> Result<()> {
            self.sent.lock().push(event);
            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_response() {
        let dispatcher = ToolDispatcher::new().register(Echo);
        let call = ToolCall::new("1", "echo", json!({"text": "hi"}));
        let response = dispatcher.respond(&call).await;
        assert_eq!(response.response.result, "hi");
        assert_eq!(response.id, "1");
    }

    #[tokio::test]
    async fn test_action_failure_becomes_error_response() {
        let dispatcher = ToolDispatcher::new().register(Echo);
        let call = ToolCall::new("2", "echo", json!({}));
        let response = dispatcher.respond(&call).await;
        assert!(response.is_error());
        assert_eq!(response.response.result, "Error: text is required");
    }

    #[tokio::test]
    async fn test_unknown_tool_gets_error_response() {
        let dispatcher = ToolDispatcher::new().register(Echo);
        let sink = Arc::new(RecordingSink::default());
        let completion =
            dispatcher.dispatch(ToolCall::new("3", "launch_rocket", Value::Null), sink.clone()).await;

        assert!(completion.delivered);
        assert_eq!(completion.response.response.result, "Error: Unknown tool: launch_rocket");
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_response_dropped_after_transport_closed() {
        let dispatcher = ToolDispatcher::new().register(Echo);
        let sink = Arc::new(RecordingSink::default());
        sink.close().await.unwrap();

        let completion =
            dispatcher.dispatch(ToolCall::new("4", "echo", json!({"text": "x"})), sink.clone()).await;
        assert!(!completion.delivered);
        assert!(sink.sent.lock().is_empty());
    }

    #[test]
    fn test_declarations_sorted() {
        struct Named(&'static str);

        #[async_trait]
        impl ToolAction for Named {
            fn declaration(&self) -> ToolDefinition {
                ToolDefinition::new(self.0)
            }

            async fn invoke(&self, _args: &Value) -> Result<String> {
                Ok(String::new())
            }
        }

        let dispatcher = ToolDispatcher::new().register(Named("b")).register(Named("a"));
        let names: Vec<String> = dispatcher.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(dispatcher.contains("a"));
        assert_eq!(dispatcher.len(), 2);
    }
}

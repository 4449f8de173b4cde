//! The bounded tool-call loop.
//!
//! Streams one adapter pass, forwards normalized chunks to the subscriber,
//! and — when the model requests tool invocations — executes them through
//! the external [`ToolExecutor`], re-injects the results into the message
//! history, and re-enters the adapter. A shared counter across the whole
//! loop (not per round) bounds total invocations; hitting the ceiling is a
//! defined terminal state, not an error.

use chatloom_core::chunk::{PendingToolCall, ResponseChunk, ToolCallEvent, ToolCallPhase};
use chatloom_core::error::ProviderError;
use chatloom_core::message::{Message, MessageToolCall};
use chatloom_core::provider::{Provider, ProviderRequest};
use chatloom_core::tool::{ToolExecutor, ToolInvocation};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Sampling parameters for one generation.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// The tool-call loop controller for one generation.
pub struct ToolCallLoop {
    provider: Arc<dyn Provider>,
    executor: Arc<dyn ToolExecutor>,
    max_tool_calls: u32,
}

impl ToolCallLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<dyn ToolExecutor>,
        max_tool_calls: u32,
    ) -> Self {
        Self {
            provider,
            executor,
            max_tool_calls,
        }
    }

    /// Run the loop to completion, sending every outbound chunk through
    /// `tx`. Terminal conditions: the model finishes without tool calls,
    /// the invocation ceiling is reached, a provider error occurs, or the
    /// caller cancels. Cancellation is observed at chunk boundaries and
    /// between invocations; nothing is emitted afterwards.
    pub async fn run(
        &self,
        model: &str,
        mut messages: Vec<Message>,
        params: GenerationParams,
        tx: Sender<Result<ResponseChunk, ProviderError>>,
        cancel: CancellationToken,
    ) {
        let tools = match self.executor.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(error = %e, "Tool listing failed; continuing without tools");
                Vec::new()
            }
        };

        let mut executed: u32 = 0;

        loop {
            let request = ProviderRequest {
                model: model.to_string(),
                messages: messages.clone(),
                temperature: params.temperature,
                max_tokens: params.max_tokens,
                tools: tools.clone(),
            };

            let mut rx = match self.provider.stream(request).await {
                Ok(rx) => rx,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut assistant_text = String::new();
            let mut requested: Vec<MessageToolCall> = Vec::new();

            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => return,
                    received = rx.recv() => received,
                };

                let Some(result) = received else {
                    break;
                };

                let mut chunk = match result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        // Terminal: partial content already forwarded stands.
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                if let Some(ref content) = chunk.content {
                    assistant_text.push_str(content);
                }
                if chunk.done {
                    requested = std::mem::take(&mut chunk.tool_calls);
                    // The pass-level done flag is not the stream's end while
                    // the loop may re-enter the adapter.
                    chunk.done = false;
                }

                if !chunk.is_empty() && tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }

            if requested.is_empty() {
                let _ = tx.send(Ok(ResponseChunk::done())).await;
                return;
            }

            debug!(count = requested.len(), "Model requested tool calls");
            messages.push(Message::assistant_with_tool_calls(
                assistant_text,
                requested.clone(),
            ));

            // Sequential execution, in the backend's emission order: each
            // result feeds the next model turn's history.
            for call in &requested {
                if cancel.is_cancelled() {
                    return;
                }

                if executed >= self.max_tool_calls {
                    warn!(
                        limit = self.max_tool_calls,
                        tool = %call.name,
                        "Maximum tool calls reached; not executing pending call"
                    );
                    let _ = tx
                        .send(Ok(ResponseChunk {
                            tool_limit: Some(PendingToolCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            }),
                            done: true,
                            ..ResponseChunk::default()
                        }))
                        .await;
                    return;
                }
                executed += 1;

                let server = self.executor.server_info(&call.name);
                let start_event = ToolCallEvent {
                    phase: ToolCallPhase::Start,
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: None,
                    server: server.clone(),
                };
                if tx
                    .send(Ok(ResponseChunk::tool_event(start_event)))
                    .await
                    .is_err()
                {
                    return;
                }

                let invocation = ToolInvocation {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: serde_json::from_str(&call.arguments)
                        .unwrap_or(serde_json::json!({})),
                };

                let (event, history_entry) = match self.executor.invoke(&invocation).await {
                    Ok(result) if result.success => (
                        ToolCallEvent {
                            phase: ToolCallPhase::End,
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: Some(result.output.clone()),
                            server,
                        },
                        result.output,
                    ),
                    Ok(result) => (
                        ToolCallEvent {
                            phase: ToolCallPhase::Error,
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: Some(result.output.clone()),
                            server,
                        },
                        format!("Error: {}", result.output),
                    ),
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        (
                            ToolCallEvent {
                                phase: ToolCallPhase::Error,
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                                result: Some(e.to_string()),
                                server,
                            },
                            format!("Error: {e}"),
                        )
                    }
                };

                if tx.send(Ok(ResponseChunk::tool_event(event))).await.is_err() {
                    return;
                }

                // A failed invocation still feeds an error-describing
                // message back so the model can recover.
                messages.push(Message::tool_result(&call.id, &history_entry));
            }

            // Loop back — the model sees the tool results and continues.
        }
    }
}

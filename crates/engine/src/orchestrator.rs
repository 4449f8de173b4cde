//! The stream orchestrator — registry of in-flight generation sessions.
//!
//! Owns start/stop/cancel for every generation, enforces the concurrency
//! ceiling, and hands each caller a per-session chunk channel (no global
//! event bus). Sessions are isolated: they share nothing but the registry
//! and its ceiling. Registry access is mutex-guarded because sessions run
//! as independent tasks on a multi-threaded runtime.

use crate::tool_loop::{GenerationParams, ToolCallLoop};
use chatloom_core::error::{Error, OrchestratorError};
use chatloom_core::message::Message;
use chatloom_core::provider::{ChunkReceiver, Provider};
use chatloom_core::tool::ToolExecutor;
use chatloom_providers::ProviderRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Maps a provider id to a ready adapter. Implemented by
/// [`ProviderRegistry`]; tests substitute stubs.
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, provider_id: &str) -> Result<Arc<dyn Provider>, Error>;
}

impl ProviderResolver for ProviderRegistry {
    fn resolve(&self, provider_id: &str) -> Result<Arc<dyn Provider>, Error> {
        let client = self.get(provider_id).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        Ok(client)
    }
}

/// One live generation session.
struct SessionHandle {
    provider_id: String,
    model: String,
    cancel: CancellationToken,
    started_at: Instant,
}

/// Read-only view of a live session, for status surfaces.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub provider_id: String,
    pub model: String,
    pub elapsed: std::time::Duration,
}

/// Owns the session registry and dispatches generations.
pub struct StreamOrchestrator {
    resolver: Arc<dyn ProviderResolver>,
    executor: Arc<dyn ToolExecutor>,
    max_concurrent: usize,
    max_tool_calls: u32,
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl StreamOrchestrator {
    pub fn new(
        resolver: Arc<dyn ProviderResolver>,
        executor: Arc<dyn ToolExecutor>,
        max_concurrent: usize,
        max_tool_calls: u32,
    ) -> Self {
        Self {
            resolver,
            executor,
            max_concurrent,
            max_tool_calls,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build an orchestrator straight from loaded configuration: the
    /// provider registry plus the configured concurrency and tool-call
    /// ceilings.
    pub fn from_config(config: chatloom_config::LoomConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        let max_concurrent = config.max_concurrent_streams;
        let max_tool_calls = config.max_tool_calls;
        Self::new(
            Arc::new(ProviderRegistry::new(config)),
            executor,
            max_concurrent,
            max_tool_calls,
        )
    }

    /// Start a generation session.
    ///
    /// Fails synchronously — with no partial session registered — when the
    /// provider is unknown, the registry is full, or the session id is
    /// already live. On success the returned channel carries the session's
    /// normalized chunks; it closing is the terminal signal.
    pub fn start(
        &self,
        session_id: &str,
        provider_id: &str,
        model: &str,
        messages: Vec<Message>,
        params: GenerationParams,
    ) -> Result<ChunkReceiver, Error> {
        // Configuration errors fail before any session state is touched.
        let provider = self.resolver.resolve(provider_id)?;

        let cancel = CancellationToken::new();
        {
            let mut sessions = self.sessions.lock().expect("session registry poisoned");
            if sessions.len() >= self.max_concurrent {
                return Err(OrchestratorError::CapacityExceeded {
                    limit: self.max_concurrent,
                }
                .into());
            }
            if sessions.contains_key(session_id) {
                return Err(OrchestratorError::DuplicateSession(session_id.to_string()).into());
            }
            sessions.insert(
                session_id.to_string(),
                SessionHandle {
                    provider_id: provider_id.to_string(),
                    model: model.to_string(),
                    cancel: cancel.clone(),
                    started_at: Instant::now(),
                },
            );
        }

        info!(session_id, provider_id, model, "Starting generation session");

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let tool_loop =
            ToolCallLoop::new(provider, self.executor.clone(), self.max_tool_calls);
        let sessions = self.sessions.clone();
        let id = session_id.to_string();
        let model = model.to_string();

        tokio::spawn(async move {
            tool_loop.run(&model, messages, params, tx, cancel).await;
            // Deregister on any terminal path; `stop` may already have
            // removed the entry, removal is idempotent.
            let removed = sessions
                .lock()
                .expect("session registry poisoned")
                .remove(&id);
            if removed.is_some() {
                debug!(session_id = %id, "Session completed");
            }
        });

        Ok(rx)
    }

    /// Cancel a session and remove it from the registry. Returns whether a
    /// live session was found. The session task observes cancellation at
    /// its next chunk boundary and emits nothing further.
    pub fn stop(&self, session_id: &str) -> bool {
        let handle = self
            .sessions
            .lock()
            .expect("session registry poisoned")
            .remove(session_id);
        match handle {
            Some(handle) => {
                info!(session_id, "Stopping generation session");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every live session.
    pub fn stop_all(&self) {
        let drained: Vec<(String, SessionHandle)> = self
            .sessions
            .lock()
            .expect("session registry poisoned")
            .drain()
            .collect();
        info!(count = drained.len(), "Stopping all generation sessions");
        for (_, handle) in drained {
            handle.cancel.cancel();
        }
    }

    /// Whether a session id is currently live.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .contains_key(session_id)
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .len()
    }

    /// Snapshot of all live sessions.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .iter()
            .map(|(id, handle)| SessionInfo {
                session_id: id.clone(),
                provider_id: handle.provider_id.clone(),
                model: handle.model.clone(),
                elapsed: handle.started_at.elapsed(),
            })
            .collect()
    }
}

//! ChatSession: one assistant conversation.
//!
//! Owns the conversation log, the session's tool registry, the selected mode
//! and model variant, and the loading flag that keeps runs one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::ModelVariant;
use crate::inference::client::GenerativeModel;
use crate::tools::registry::{ManifestSource, ToolRegistry};
use crate::tools::rest_executor::RestBackend;

use super::conversation::ConversationLog;
use super::errors::AgentError;
use super::orchestrator::{Orchestrator, RunRequest};
use super::types::{AiMode, Message, RunEvent, RunOutcome};

/// Status shown in the chat when the manifest could not be loaded.
fn manifest_status(reason: &str) -> String {
    format!("Не удалось загрузить список инструментов: {reason}")
}

// ─── Cancel Handle ──────────────────────────────────────────────────────────

/// Cancels the session's in-flight run from another task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl CancelHandle {
    /// Cancel the run in flight. Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        match self.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock() = Some(token.clone());
        token
    }

    fn disarm(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // A poisoned slot only ever held a token; keep using it.
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the loading flag however the run ends.
struct LoadingGuard(Arc<AtomicBool>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ─── Tool State ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ToolState {
    NotLoaded,
    Loaded(Arc<ToolRegistry>),
    /// Load failed; no retry until reset.
    Failed(String),
}

// ─── ChatSession ────────────────────────────────────────────────────────────

pub struct ChatSession<M, B> {
    orchestrator: Orchestrator<M, B>,
    log: ConversationLog,
    manifest: ManifestSource,
    http: reqwest::Client,
    tools: ToolState,
    mode: AiMode,
    variant: ModelVariant,
    loading: Arc<AtomicBool>,
    cancel: CancelHandle,
}

impl<M: GenerativeModel, B: RestBackend> ChatSession<M, B> {
    pub fn new(
        orchestrator: Orchestrator<M, B>,
        manifest: ManifestSource,
        http: reqwest::Client,
        mode: AiMode,
        variant: ModelVariant,
    ) -> Self {
        Self {
            orchestrator,
            log: ConversationLog::new(),
            manifest,
            http,
            tools: ToolState::NotLoaded,
            mode,
            variant,
            loading: Arc::new(AtomicBool::new(false)),
            cancel: CancelHandle::default(),
        }
    }

    /// Load the tool manifest on first open.
    ///
    /// A failure leaves a status notice in the transcript and is remembered:
    /// later calls return the same error without fetching again.
    pub async fn open(&mut self) -> Result<Arc<ToolRegistry>, AgentError> {
        match &self.tools {
            ToolState::Loaded(registry) => return Ok(Arc::clone(registry)),
            ToolState::Failed(reason) => {
                return Err(AgentError::ToolsUnavailable {
                    reason: reason.clone(),
                })
            }
            ToolState::NotLoaded => {}
        }

        match ToolRegistry::load(&self.manifest, &self.http).await {
            Ok(registry) => {
                let registry = Arc::new(registry);
                self.tools = ToolState::Loaded(Arc::clone(&registry));
                Ok(registry)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(manifest = %self.manifest.location(), error = %reason, "tool manifest failed to load");
                self.log.push_notice(manifest_status(&reason));
                self.tools = ToolState::Failed(reason.clone());
                Err(AgentError::ToolsUnavailable { reason })
            }
        }
    }

    /// Send a user message and run the assistant to completion.
    ///
    /// Errors become one assistant notice in the transcript and are also
    /// returned. Without a loaded manifest the model is asked without tools.
    pub async fn send_message<F>(&mut self, text: &str, on_event: F) -> Result<RunOutcome, AgentError>
    where
        F: FnMut(RunEvent),
    {
        if self.loading.swap(true, Ordering::SeqCst) {
            return Err(AgentError::Busy);
        }
        let _loading = LoadingGuard(Arc::clone(&self.loading));

        let registry = match self.open().await {
            Ok(registry) => registry,
            Err(e) => {
                tracing::warn!(error = %e, "running without tools");
                Arc::new(ToolRegistry::default())
            }
        };

        self.log.push_user(text);
        let cancel = self.cancel.arm();
        let result = self
            .orchestrator
            .run(
                RunRequest {
                    history: self.log.model_contents(),
                    registry: registry.as_ref(),
                    mode: self.mode,
                    variant: &self.variant,
                    cancel,
                },
                on_event,
            )
            .await;
        self.cancel.disarm();

        match result {
            Ok(report) => {
                self.log.extend(report.turns);
                Ok(report.outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "assistant run failed");
                self.log.push_notice(format!("Ошибка: {e}"));
                Err(e)
            }
        }
    }

    /// Clear the transcript and forget the manifest; the next open reloads it.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.log.clear();
        self.tools = ToolState::NotLoaded;
        tracing::info!("chat session reset");
    }

    pub fn transcript(&self) -> Vec<Message> {
        self.log.transcript()
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn loading_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.loading)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> AiMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AiMode) {
        self.mode = mode;
    }

    pub fn variant(&self) -> &ModelVariant {
        &self.variant
    }

    pub fn set_variant(&mut self, variant: ModelVariant) {
        self.variant = variant;
    }

    /// Number of loaded tools, if the manifest is loaded.
    pub fn tool_count(&self) -> Option<usize> {
        match &self.tools {
            ToolState::Loaded(registry) => Some(registry.len()),
            _ => None,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<M, B> {
        &self.orchestrator
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

//! Live chat session: owner of at most one running agent execution per
//! conversation.
//!
//! A session owns the bounded output queue, the background driver task,
//! and the cancellation token. It stays in the registry after a run
//! finishes so late subscribers can observe terminal state, but drops the
//! completed task handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{AgentRunner, Part};
use crate::db::Database;
use crate::prompt::SystemPromptSource;

use super::driver::{ExecutionDriver, RunOutcome};
use super::events::WireEvent;
use super::queue::EventQueue;

/// Long-lived dependencies shared by every session.
pub struct ChatDeps {
    pub db: Database,
    pub runner: Arc<dyn AgentRunner>,
    pub prompts: Arc<dyn SystemPromptSource>,
}

/// Per-run options taken from the start request.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Model override for this conversation.
    pub model: Option<String>,
    /// Title for a conversation created by this request.
    pub title: Option<String>,
}

struct RunState {
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    started: bool,
    /// Set by the task wrapper once a terminal event (`done`/`error`) has
    /// been emitted, so a racing `stop()` never adds a second terminal.
    terminal_sent: Arc<AtomicBool>,
}

/// One conversation's live session.
pub struct ChatSession {
    conversation_id: Uuid,
    queue: Arc<EventQueue>,
    deps: Arc<ChatDeps>,
    run: tokio::sync::Mutex<RunState>,
}

impl ChatSession {
    pub(crate) fn new(conversation_id: Uuid, deps: Arc<ChatDeps>) -> Arc<Self> {
        Arc::new(Self {
            conversation_id,
            queue: Arc::new(EventQueue::new()),
            deps,
            run: tokio::sync::Mutex::new(RunState {
                handle: None,
                cancel: CancellationToken::new(),
                started: false,
                terminal_sent: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// The session's output queue, for transport forwarders.
    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    /// Non-blocking publish to the bounded output queue.
    pub fn emit(&self, event: WireEvent) {
        self.queue.push(event);
    }

    /// True iff a background task exists and has not completed.
    pub async fn is_running(&self) -> bool {
        let run = self.run.lock().await;
        run.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the execution driver for a new run. No-op (returning `false`)
    /// when a run is already in flight, guaranteeing at most one concurrent
    /// execution per conversation.
    pub async fn start(self: &Arc<Self>, user_id: &str, input: Vec<Part>, options: StartOptions) -> bool {
        let mut run = self.run.lock().await;
        if let Some(handle) = &run.handle {
            if !handle.is_finished() {
                debug!(
                    "conversation {} already has a run in flight, ignoring start",
                    self.conversation_id
                );
                return false;
            }
        }
        run.handle = None;

        let cancel = CancellationToken::new();
        run.cancel = cancel.clone();
        let terminal_sent = Arc::new(AtomicBool::new(false));
        run.terminal_sent = Arc::clone(&terminal_sent);

        let session = Arc::clone(self);
        let user_id = user_id.to_string();
        let handle = tokio::spawn(async move {
            let driver = ExecutionDriver::new(
                Arc::clone(&session.deps),
                session.queue(),
                session.conversation_id,
                user_id,
                options,
            );
            match driver.run(input, cancel).await {
                // The driver emits `done` itself before returning.
                Ok(RunOutcome::Completed) => {
                    terminal_sent.store(true, Ordering::SeqCst);
                }
                // `stop()` emits `stopped` after the task is awaited.
                Ok(RunOutcome::Cancelled) => {}
                Err(err) => {
                    error!(
                        "run failed for conversation {}: {err:#}",
                        session.conversation_id
                    );
                    session.emit(WireEvent::Error {
                        message: format!("{err:#}"),
                    });
                    terminal_sent.store(true, Ordering::SeqCst);
                }
            }
        });

        run.handle = Some(handle);
        run.started = true;
        true
    }

    /// Cancel a running driver task and await its termination, then emit
    /// the terminal `stopped` event. Returns `false` when nothing was
    /// running.
    pub async fn stop(&self) -> bool {
        let mut run = self.run.lock().await;
        let Some(handle) = run.handle.take() else {
            run.started = false;
            return false;
        };
        if handle.is_finished() {
            run.started = false;
            return false;
        }

        run.cancel.cancel();
        if let Err(err) = handle.await {
            warn!(
                "driver task for conversation {} ended abnormally: {err}",
                self.conversation_id
            );
        }
        run.started = false;
        // The run may have finished (done/error) in the instant before the
        // cancel landed; only one terminal event goes out either way.
        if !run.terminal_sent.load(Ordering::SeqCst) {
            self.emit(WireEvent::Stopped);
        }
        true
    }
}

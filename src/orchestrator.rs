//! Stream orchestration for one question.
//!
//! Sending a question is two steps:
//!
//! 1. [`Orchestrator::open`] claims the session and opens the answer stream.
//!    A busy session or a transport failure is returned as an error before
//!    any assistant message exists, so there is nothing partial to discard.
//! 2. [`PendingAnswer::run`] reads the stream to the end in a single task:
//!    decode frames, apply each to the message's [`AnswerStream`], render one
//!    update per frame, and on normal completion persist the sources.
//!
//! The read loop selects between the next chunk and a
//! [`CancellationToken`]. Cancelling stops consumption at once; the answer
//! is finalized as cancelled and nothing is persisted. Each wait for a chunk
//! is bounded by the client's idle timeout, so a stalled backend fails as a
//! transport error while a slow but live one streams for as long as it needs.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use kb_chat_core::citation::Citation;
use kb_chat_core::frame::{Frame, FrameDecoder};
use kb_chat_core::models::Message;
use kb_chat_core::reconcile::{ReconcilePolicy, Reconciler};
use kb_chat_core::store::{persist_sources, SourceStore};
use kb_chat_core::stream::{AnswerStream, Completion, StreamState};

use crate::client::{BackendClient, ByteStream};
use crate::error::ChatError;
use crate::render::RenderSink;

/// Sessions with a question currently streaming.
#[derive(Clone, Default)]
pub struct SessionGuard {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `session_id`, failing with [`ChatError::Busy`] if it is taken.
    pub fn try_acquire(&self, session_id: &str) -> Result<SessionPermit, ChatError> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(session_id.to_string()) {
            return Err(ChatError::Busy {
                session_id: session_id.to_string(),
            });
        }
        Ok(SessionPermit {
            active: Arc::clone(&self.active),
            session_id: session_id.to_string(),
        })
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.active.lock().unwrap().contains(session_id)
    }
}

/// Releases its session when dropped.
pub struct SessionPermit {
    active: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.session_id);
        }
    }
}

/// Result of a finished send.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub message: Message,
    pub completion: Completion,
    pub error: Option<String>,
    pub citations: Vec<Citation>,
    pub persisted: bool,
}

pub struct Orchestrator {
    client: Arc<BackendClient>,
    store: Arc<dyn SourceStore>,
    reconciler: Reconciler,
    guard: SessionGuard,
}

impl Orchestrator {
    pub fn new(
        client: Arc<BackendClient>,
        store: Arc<dyn SourceStore>,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            client,
            store,
            reconciler: Reconciler::new(policy),
            guard: SessionGuard::new(),
        }
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn store(&self) -> Arc<dyn SourceStore> {
        Arc::clone(&self.store)
    }

    /// Claim the session and open the answer stream.
    pub async fn open(
        &self,
        chat_id: &str,
        session_id: &str,
        question: &str,
    ) -> Result<PendingAnswer, ChatError> {
        if chat_id.trim().is_empty() || session_id.trim().is_empty() {
            return Err(ChatError::InvalidRequest(
                "chat id and session id must not be empty".to_string(),
            ));
        }
        if question.trim().is_empty() {
            return Err(ChatError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }

        let permit = self.guard.try_acquire(session_id)?;
        let stream = self.client.ask(chat_id, session_id, question).await?;

        Ok(PendingAnswer {
            chat_id: chat_id.to_string(),
            session_id: session_id.to_string(),
            stream,
            idle_timeout: self.client.idle_timeout(),
            answer: AnswerStream::new(self.reconciler),
            store: Arc::clone(&self.store),
            _permit: permit,
        })
    }

    /// Open and run in one call.
    pub async fn ask(
        &self,
        chat_id: &str,
        session_id: &str,
        question: &str,
        sink: &dyn RenderSink,
        cancel: CancellationToken,
    ) -> Result<AskOutcome, ChatError> {
        let pending = self.open(chat_id, session_id, question).await?;
        pending.run(sink, cancel).await
    }
}

/// An opened answer stream, holding its session claim until it is run.
pub struct PendingAnswer {
    chat_id: String,
    session_id: String,
    stream: ByteStream,
    idle_timeout: Duration,
    answer: AnswerStream,
    store: Arc<dyn SourceStore>,
    _permit: SessionPermit,
}

impl PendingAnswer {
    /// Consume the stream to the end, then persist sources if it completed
    /// normally. A connection drop mid-stream is a transport error and the
    /// partial answer is discarded.
    pub async fn run(
        mut self,
        sink: &dyn RenderSink,
        cancel: CancellationToken,
    ) -> Result<AskOutcome, ChatError> {
        drive_stream(
            self.stream,
            &mut self.answer,
            sink,
            &cancel,
            self.idle_timeout,
        )
        .await?;
        let persisted = finalize(
            &self.answer,
            self.store.as_ref(),
            &self.chat_id,
            &self.session_id,
        )
        .await;
        tracing::info!(
            chat_id = %self.chat_id,
            session_id = %self.session_id,
            frames = self.answer.frames_applied(),
            completion = ?self.answer.completion(),
            persisted,
            "answer stream finished"
        );
        Ok(outcome(&self.answer, persisted))
    }
}

/// The read loop. Pulls chunks in arrival order, feeds complete frames to
/// `answer`, and renders one update per changed frame. Returns once the
/// answer is finalized. Waiting longer than `idle` for a chunk is a
/// transport error.
pub async fn drive_stream<S, B, E>(
    mut stream: S,
    answer: &mut AnswerStream,
    sink: &dyn RenderSink,
    cancel: &CancellationToken,
    idle: Duration,
) -> Result<(), ChatError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut decoder = FrameDecoder::new();

    while answer.state() == StreamState::Accumulating {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("answer stream cancelled by consumer");
                if let Some(update) = answer.cancel() {
                    sink.render(&update);
                }
                return Ok(());
            }
            next = tokio::time::timeout(idle, stream.next()) => match next {
                Ok(next) => next,
                Err(_) => {
                    return Err(ChatError::Transport(format!(
                        "no data from backend for {}s",
                        idle.as_secs_f64()
                    )));
                }
            },
        };

        match next {
            Some(Ok(chunk)) => {
                for frame in decoder.push(chunk) {
                    apply_frame(frame, answer, sink);
                    if answer.state() == StreamState::Finalized {
                        break;
                    }
                }
            }
            Some(Err(e)) => return Err(ChatError::Transport(e.to_string())),
            None => {
                if let Some(frame) = decoder.finish() {
                    apply_frame(frame, answer, sink);
                }
                if let Some(update) = answer.finish() {
                    sink.render(&update);
                }
            }
        }
    }

    if decoder.dropped() > 0 {
        tracing::warn!(dropped = decoder.dropped(), "answer stream had corrupt frames");
    }
    Ok(())
}

fn apply_frame(frame: Frame, answer: &mut AnswerStream, sink: &dyn RenderSink) {
    let update = match frame {
        Frame::Event(event) => answer.apply(&event),
        Frame::Done => answer.finish(),
    };
    if let Some(update) = update {
        sink.render(&update);
    }
}

/// Persist the sources of a normally completed answer. Returns whether a
/// record was written.
pub async fn finalize(
    answer: &AnswerStream,
    store: &dyn SourceStore,
    chat_id: &str,
    session_id: &str,
) -> bool {
    if !answer.is_persistable() {
        return false;
    }
    persist_sources(
        store,
        chat_id,
        session_id,
        answer.visible_text(),
        answer.sources(),
    )
    .await
}

fn outcome(answer: &AnswerStream, persisted: bool) -> AskOutcome {
    AskOutcome {
        message: answer.message(),
        completion: answer.completion().unwrap_or(Completion::Completed),
        error: answer.error().map(str::to_string),
        citations: answer.citations().to_vec(),
        persisted,
    }
}

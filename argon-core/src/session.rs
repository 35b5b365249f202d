use chrono::{Local, NaiveDateTime};
use futures::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendFactory, ChatBackend, ChatError, ChunkStream, GeoPoint};
use crate::classifier::{ModelTable, QueryPlan, RetrievalMode};
use crate::context::contextualize;
use crate::conversation::Conversation;
use crate::failure::{FailureClass, INIT_FAILED, NOT_INITIALIZED};
use crate::message::{MessageId, StreamChunk};

/// When the chat backend is rebuilt from fresh credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Only after a stale-session failure, at most once per failure.
    #[default]
    OnStaleSession,
    /// Before every query, in addition to stale-session recovery.
    PerQuery,
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub models: ModelTable,
    pub refresh_policy: RefreshPolicy,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a response is still streaming")]
    Busy,
}

/// Result of handing a query to the session.
pub enum Dispatch {
    /// Blank input; nothing happened.
    Ignored,
    /// No backend is available; an error message was appended.
    Unavailable(MessageId),
    /// The reply is streaming; feed its items back through
    /// [`ChatSession::apply_event`].
    Streaming(ChunkStream),
}

/// One step of an outstanding reply stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    Finished,
    Failed(ChatError),
}

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Unavailable(MessageId),
    /// `reply` is `None` when the stream ended without producing chunks.
    Answered { reply: Option<MessageId> },
    Failed {
        /// Partial reply kept from before the failure.
        partial: Option<MessageId>,
        error: MessageId,
        class: FailureClass,
    },
}

/// Waits for the next item of `stream` as a session event.
pub async fn next_event(stream: &mut ChunkStream) -> StreamEvent {
    match stream.next().await {
        Some(Ok(chunk)) => StreamEvent::Chunk(chunk),
        Some(Err(err)) => StreamEvent::Failed(err),
        None => StreamEvent::Finished,
    }
}

/// Owns the conversation and the chat backend; the core entry point.
///
/// At most one query is outstanding at a time: [`start_query`] rejects new
/// input with [`SessionError::Busy`] until the current stream has finished or
/// failed.
///
/// [`start_query`]: ChatSession::start_query
pub struct ChatSession<F: BackendFactory> {
    conversation: Conversation,
    factory: F,
    backend: Option<F::Backend>,
    config: SessionConfig,
    location: Option<GeoPoint>,
    pending: Option<QueryPlan>,
    last_mode: Option<RetrievalMode>,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl<F: BackendFactory> ChatSession<F> {
    /// Creates a session and connects its backend.
    ///
    /// A failed connection is reported in the conversation, not returned.
    pub fn new(factory: F, config: SessionConfig) -> Self {
        let mut session = Self {
            conversation: Conversation::new(),
            factory,
            backend: None,
            config,
            location: None,
            pending: None,
            last_mode: None,
            clock: local_now,
        };
        let connected = session.factory.connect();
        session.install(connected, true);
        session
    }

    /// Replaces the wall clock used for the query header.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn location(&self) -> Option<GeoPoint> {
        self.location
    }

    pub fn set_location(&mut self, location: Option<GeoPoint>) {
        if let Some(point) = location {
            info!(
                latitude = point.latitude,
                longitude = point.longitude,
                "Location known"
            );
        }
        self.location = location;
    }

    /// Retrieval mode of the most recent query.
    pub fn last_mode(&self) -> Option<RetrievalMode> {
        self.last_mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stores the result of a (re)connection.
    ///
    /// The init-failure notice is appended when `announce` is set or a working
    /// backend was lost, so repeated failures while down are reported once.
    fn install(&mut self, connected: Result<F::Backend, ChatError>, announce: bool) {
        match connected {
            Ok(backend) => {
                debug!("Chat backend initialized");
                self.backend = Some(backend);
            }
            Err(e) => {
                warn!(error = %e, "Chat backend failed to initialize");
                let lost = self.backend.take().is_some();
                if announce || lost {
                    self.conversation.push_error(INIT_FAILED);
                }
            }
        }
    }

    /// Replaces the backend with a fresh one, dropping its chat state.
    fn reinitialize(&mut self) {
        let connected = self.factory.connect();
        self.install(connected, false);
    }

    /// Picks up rotated credentials while keeping the backend's chat state.
    fn refresh(&mut self) {
        let refreshed = match &self.backend {
            Some(backend) => self.factory.refresh(backend),
            None => self.factory.connect(),
        };
        self.install(refreshed, false);
    }

    /// Gives up on the outstanding query, if any, without an error message.
    ///
    /// Partial output is kept as a finalized message, which is returned. The
    /// session accepts new queries afterwards.
    pub fn abandon(&mut self) -> Option<MessageId> {
        self.pending.take()?;
        let partial = self.conversation.interrupt_stream();
        info!(?partial, "Abandoned outstanding query");
        partial
    }

    /// Appends the user message and starts streaming the reply.
    #[instrument(skip(self, text))]
    pub fn start_query(&mut self, text: &str) -> Result<Dispatch, SessionError> {
        if text.trim().is_empty() {
            return Ok(Dispatch::Ignored);
        }
        if self.pending.is_some() {
            return Err(SessionError::Busy);
        }

        self.conversation.push_user(text);

        if self.config.refresh_policy == RefreshPolicy::PerQuery {
            debug!("Refreshing chat backend before query");
            self.refresh();
        }

        let Some(backend) = self.backend.as_ref() else {
            let id = self.conversation.push_error(NOT_INITIALIZED);
            return Ok(Dispatch::Unavailable(id));
        };

        let plan = QueryPlan::for_query(text, self.location, &self.config.models);
        let query = contextualize(text, (self.clock)(), self.location);
        info!(mode = %plan.mode, model = %plan.options.model, "Sending query");

        let stream = backend.send_message_stream(&query, &plan.options);
        self.last_mode = Some(plan.mode);
        self.pending = Some(plan);
        Ok(Dispatch::Streaming(stream))
    }

    /// Applies one stream event to the conversation.
    ///
    /// Returns the outcome once the stream has ended, which also clears the
    /// busy state.
    pub fn apply_event(&mut self, event: StreamEvent) -> Option<Outcome> {
        if self.pending.is_none() {
            warn!(?event, "Dropping stream event with no query outstanding");
            return None;
        }

        match event {
            StreamEvent::Chunk(chunk) => {
                self.conversation.apply_chunk(&chunk);
                None
            }
            StreamEvent::Finished => {
                self.pending = None;
                let reply = self.conversation.finish_stream();
                debug!(?reply, "Reply finalized");
                Some(Outcome::Answered { reply })
            }
            StreamEvent::Failed(err) => {
                self.pending = None;
                let partial = self.conversation.interrupt_stream();
                let class = FailureClass::classify(err.message());
                warn!(error = %err, ?class, "Reply stream failed");

                if class == FailureClass::StaleSession {
                    info!("Re-initializing chat backend after stale session");
                    self.reinitialize();
                }

                let error = self
                    .conversation
                    .push_error(class.user_message(err.message()));
                Some(Outcome::Failed {
                    partial,
                    error,
                    class,
                })
            }
        }
    }

    /// Submits `text` and drives its reply stream to completion.
    ///
    /// Dropping the returned future before it resolves abandons the query, so
    /// the session is never left busy.
    pub async fn submit_query(&mut self, text: &str) -> Result<Outcome, SessionError> {
        let mut stream = match self.start_query(text)? {
            Dispatch::Ignored => return Ok(Outcome::Ignored),
            Dispatch::Unavailable(id) => return Ok(Outcome::Unavailable(id)),
            Dispatch::Streaming(stream) => stream,
        };

        let mut guard = Outstanding { session: self };
        loop {
            let event = next_event(&mut stream).await;
            if let Some(outcome) = guard.session.apply_event(event) {
                return Ok(outcome);
            }
        }
    }
}

/// Abandons a still-pending query when dropped.
struct Outstanding<'a, F: BackendFactory> {
    session: &'a mut ChatSession<F>,
}

impl<F: BackendFactory> Drop for Outstanding<'_, F> {
    fn drop(&mut self) {
        if self.session.is_busy() {
            self.session.abandon();
        }
    }
}

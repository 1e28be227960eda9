//! Per-session conversation controller
//!
//! A `Session` owns the chat history, the processing flag and the session's
//! `DocumentStore`. Each accepted question runs through
//! `Ingesting → Requesting → Streaming → Idle`, or ends in `Error`. Every mutation
//! publishes a `SessionState` snapshot on a watch channel for renderers.
//!
//! Two locks: `inner` guards state and is only held for short mutations, `store`
//! guards the document blobs and is held across their file I/O. When both are
//! needed, `store` is taken first.

mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use state::{ChatTurn, SessionState, TurnPhase, TurnStatus};

use crate::config::Config;
use crate::documents::{Document, DocumentStore, UploadFile};
use crate::error::{ChatError, ChatResult};
use crate::pdf::{self, ExtractedText};
use crate::prompt;
use crate::provider::{ChatProvider, Completion, Sampling};
use crate::reveal::{self, Reveal};
use crate::templates;

/// Per-session knobs
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub sampling: Sampling,
    pub reveal_delay: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.default_model.clone(),
            sampling: Sampling {
                temperature: config.temperature,
                top_p: config.top_p,
            },
            reveal_delay: config.reveal_delay,
        }
    }
}

/// Events a renderer can send to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Upload { files: Vec<UploadFile> },
    StageFiles { files: Vec<UploadFile> },
    CancelUpload,
    UploadStaged,
    SubmitQuestion { text: String },
    AskTemplate { name: String },
    SelectModel { id: String },
    ClearChat,
    ClearDocuments,
    CancelTurn,
}

struct SessionInner {
    state: SessionState,
    staged: Vec<UploadFile>,
    /// Present while a turn is in flight
    cancel: Option<CancellationToken>,
}

pub struct Session {
    id: Uuid,
    inner: Mutex<SessionInner>,
    store: Mutex<DocumentStore>,
    provider: Arc<dyn ChatProvider>,
    sampling: Sampling,
    reveal_delay: Duration,
    snapshots: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(
        id: Uuid,
        store: DocumentStore,
        provider: Arc<dyn ChatProvider>,
        options: SessionOptions,
    ) -> Self {
        let mut state = SessionState::new(id, options.model);
        state.documents = store.list();
        let (snapshots, _) = watch::channel(state.clone());

        Self {
            id,
            inner: Mutex::new(SessionInner {
                state,
                staged: Vec::new(),
                cancel: None,
            }),
            store: Mutex::new(store),
            provider,
            sampling: options.sampling,
            reveal_delay: options.reveal_delay,
            snapshots,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionState {
        self.snapshots.borrow().clone()
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.snapshots.subscribe()
    }

    fn publish(&self, inner: &SessionInner) {
        self.snapshots.send_replace(inner.state.clone());
    }

    /// Dispatch a renderer event
    pub async fn handle(&self, event: SessionEvent) -> ChatResult<()> {
        match event {
            SessionEvent::Upload { files } => self.upload(files).await.map(|_| ()),
            SessionEvent::StageFiles { files } => {
                self.stage_files(files).await;
                Ok(())
            }
            SessionEvent::CancelUpload => {
                self.cancel_upload().await;
                Ok(())
            }
            SessionEvent::UploadStaged => self.upload_staged().await.map(|_| ()),
            SessionEvent::SubmitQuestion { text } => self.submit_question(&text).await.map(|_| ()),
            SessionEvent::AskTemplate { name } => self.ask_template(&name).await.map(|_| ()),
            SessionEvent::SelectModel { id } => self.select_model(&id).await,
            SessionEvent::ClearChat => self.clear_chat().await,
            SessionEvent::ClearDocuments => self.clear_documents().await,
            SessionEvent::CancelTurn => {
                self.cancel_turn().await;
                Ok(())
            }
        }
    }

    // ---------------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------------

    /// Store files immediately
    pub async fn upload(&self, files: Vec<UploadFile>) -> ChatResult<Vec<String>> {
        let mut store = self.store.lock().await;
        let count = files.len();
        let result = store.upload(files).await;

        let mut inner = self.inner.lock().await;
        inner.state.documents = store.list();
        drop(store);

        match result {
            Ok(ids) => {
                info!(session_id = %self.id, count, "Uploaded documents");
                self.publish(&inner);
                Ok(ids)
            }
            Err(e) => {
                let err = ChatError::from(e);
                warn!(session_id = %self.id, error = %err, "Upload failed");
                inner.state.last_error = Some(err.to_info());
                self.publish(&inner);
                Err(err)
            }
        }
    }

    /// Select files for a later `upload_staged`
    pub async fn stage_files(&self, files: Vec<UploadFile>) {
        let mut inner = self.inner.lock().await;
        inner.staged.extend(files);
        inner.state.staged = inner.staged.iter().map(|f| f.filename.clone()).collect();
        self.publish(&inner);
    }

    /// Drop the staged selection. Stored documents are untouched.
    pub async fn cancel_upload(&self) {
        let mut inner = self.inner.lock().await;
        inner.staged.clear();
        inner.state.staged.clear();
        self.publish(&inner);
    }

    pub async fn upload_staged(&self) -> ChatResult<Vec<String>> {
        let files = {
            let mut inner = self.inner.lock().await;
            inner.state.staged.clear();
            std::mem::take(&mut inner.staged)
        };
        self.upload(files).await
    }

    /// Delete every stored document. Not allowed while a turn is reading them.
    pub async fn clear_documents(&self) -> ChatResult<()> {
        let mut store = self.store.lock().await;
        // A turn that starts after this check waits on `store` and sees the cleared set
        if self.inner.lock().await.state.processing {
            return Err(ChatError::Busy);
        }

        let result = store.clear().await;

        let mut inner = self.inner.lock().await;
        inner.state.documents = store.list();
        drop(store);

        if let Err(e) = result {
            let err = ChatError::from(e);
            warn!(session_id = %self.id, error = %err, "Clearing documents failed");
            inner.state.last_error = Some(err.to_info());
            self.publish(&inner);
            return Err(err);
        }

        self.publish(&inner);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Conversation
    // ---------------------------------------------------------------------

    /// Model used for the next question. A turn in flight keeps its own model.
    pub async fn select_model(&self, id: &str) -> ChatResult<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ChatError::InvalidModel(id.to_string()));
        }
        if crate::models::get_model(id).is_none() {
            debug!("Selected model '{}' is not in the catalog", id);
        }

        let mut inner = self.inner.lock().await;
        inner.state.selected_model = id.to_string();
        self.publish(&inner);
        Ok(())
    }

    /// Empty the chat history. Only valid when no turn is in flight.
    pub async fn clear_chat(&self) -> ChatResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state.processing {
            return Err(ChatError::Busy);
        }

        inner.state.chat_history.clear();
        inner.state.processing = false;
        inner.state.phase = TurnPhase::Idle;
        inner.state.last_error = None;
        self.publish(&inner);
        Ok(())
    }

    /// Cancel the turn in flight. Returns `false` if there was none.
    pub async fn cancel_turn(&self) -> bool {
        let inner = self.inner.lock().await;
        match &inner.cancel {
            Some(token) => {
                info!(session_id = %self.id, "Cancelling turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ask a canned prompt by template name
    pub async fn ask_template(&self, name: &str) -> ChatResult<ChatTurn> {
        let template = templates::get_template(name)
            .ok_or_else(|| ChatError::UnknownTemplate(name.to_string()))?;
        self.submit_question(template.prompt).await
    }

    /// Answer one question end to end and return the committed turn.
    ///
    /// Rejected with `Busy` if a turn is already in flight. On failure the turn stays
    /// in history marked failed and the error is returned.
    pub async fn submit_question(&self, question: &str) -> ChatResult<ChatTurn> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let (prior_turns, model, cancel) = {
            let mut inner = self.inner.lock().await;
            if inner.state.processing {
                return Err(ChatError::Busy);
            }

            let prior_turns = inner.state.chat_history.clone();
            let model = inner.state.selected_model.clone();
            let cancel = CancellationToken::new();

            inner
                .state
                .chat_history
                .push(ChatTurn::new(question.to_string(), model.clone()));
            inner.state.processing = true;
            inner.state.phase = TurnPhase::Ingesting;
            inner.state.last_error = None;
            inner.cancel = Some(cancel.clone());
            self.publish(&inner);

            (prior_turns, model, cancel)
        };

        let completion = match self
            .fetch_answer(&prior_turns, question, &model, &cancel)
            .await
        {
            Ok(completion) => completion,
            Err(e) => return Err(self.fail_turn(e).await),
        };

        Ok(self.reveal_and_commit(completion, &cancel).await)
    }

    /// Ingesting and Requesting phases
    async fn fetch_answer(
        &self,
        prior_turns: &[ChatTurn],
        question: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<Completion> {
        // An upload in progress holds the store until its files are written
        let documents: Vec<Document> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            store = self.store.lock() => store.documents().to_vec(),
        };

        info!(
            session_id = %self.id,
            model = %model,
            provider = self.provider.provider_name(),
            documents = documents.len(),
            "Answering question"
        );

        let mut extracted: Vec<ExtractedText> = Vec::with_capacity(documents.len());
        for document in &documents {
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                result = pdf::extract_document(document) => result?,
            };
            extracted.push(text);
        }

        self.set_phase(TurnPhase::Requesting).await;

        let request =
            prompt::build_request(&extracted, prior_turns, question, model, self.sampling);

        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            result = self.provider.complete(&request) => result?,
        };

        debug!(
            session_id = %self.id,
            chars = completion.content.chars().count(),
            "Provider returned answer"
        );
        Ok(completion)
    }

    /// Streaming phase, then commit. Cancelling here only skips the animation.
    async fn reveal_and_commit(&self, completion: Completion, cancel: &CancellationToken) -> ChatTurn {
        {
            let mut inner = self.inner.lock().await;
            inner.state.phase = TurnPhase::Streaming;
            if let Some(turn) = inner.state.chat_history.last_mut() {
                turn.status = TurnStatus::Streaming;
            }
            self.publish(&inner);
        }

        for frame in Reveal::new(&completion.content) {
            if !reveal::pause(self.reveal_delay, cancel).await {
                debug!(session_id = %self.id, "Reveal cut short");
                break;
            }
            let mut inner = self.inner.lock().await;
            if let Some(turn) = inner.state.chat_history.last_mut() {
                turn.answer = frame.to_string();
            }
            self.publish(&inner);
        }

        let mut inner = self.inner.lock().await;
        let mut committed = ChatTurn::new(String::new(), completion.model.clone());
        if let Some(turn) = inner.state.chat_history.last_mut() {
            turn.answer = completion.content;
            turn.model_id = completion.model;
            turn.input_tokens = completion.usage.prompt_tokens;
            turn.output_tokens = completion.usage.completion_tokens;
            turn.status = TurnStatus::Complete;
            committed = turn.clone();
        }
        inner.state.processing = false;
        inner.state.phase = TurnPhase::Idle;
        inner.cancel = None;
        self.publish(&inner);

        info!(
            session_id = %self.id,
            model = %committed.model_id,
            input_tokens = committed.input_tokens,
            output_tokens = committed.output_tokens,
            "Turn complete"
        );
        committed
    }

    async fn set_phase(&self, phase: TurnPhase) {
        let mut inner = self.inner.lock().await;
        inner.state.phase = phase;
        self.publish(&inner);
    }

    /// Mark the in-flight turn failed and hand the error back
    async fn fail_turn(&self, err: ChatError) -> ChatError {
        warn!(session_id = %self.id, code = err.code(), error = %err, "Turn failed");

        let info = err.to_info();
        let mut inner = self.inner.lock().await;
        if let Some(turn) = inner.state.chat_history.last_mut() {
            turn.answer.clear();
            turn.status = TurnStatus::Failed {
                error: info.clone(),
            };
        }
        inner.state.processing = false;
        inner.state.phase = TurnPhase::Error;
        inner.state.last_error = Some(info);
        inner.cancel = None;
        self.publish(&inner);
        err
    }

    /// Cancel any turn and delete the session's uploads
    pub async fn close(&self) -> ChatResult<()> {
        self.cancel_turn().await;

        let mut store = self.store.lock().await;
        debug!(session_id = %self.id, dir = ?store.dir(), "Purging uploads");
        store.purge().await?;

        let mut inner = self.inner.lock().await;
        drop(store);
        inner.staged.clear();
        inner.state.documents.clear();
        inner.state.staged.clear();
        self.publish(&inner);
        Ok(())
    }
}

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::*;
use crate::error::ProviderError;
use crate::pdf::extractor::test_pdf;
use crate::provider::{ChatRequest, Role, Usage};

const MODEL: &str = "test/model";

/// Lets a test hold the provider call open
#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

/// Provider that replays canned results and records every request
#[derive(Default)]
struct ScriptedProvider {
    responses: std::sync::Mutex<VecDeque<Result<Completion, ProviderError>>>,
    requests: std::sync::Mutex<Vec<ChatRequest>>,
    gate: Option<Arc<Gate>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<Completion, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: std::sync::Mutex::new(responses.into()),
            ..Default::default()
        })
    }

    fn gated(gate: Arc<Gate>, responses: Vec<Result<Completion, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: std::sync::Mutex::new(responses.into()),
            gate: Some(gate),
            ..Default::default()
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(completion("ok", &request.model, 1, 1)))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn completion(content: &str, model: &str, prompt_tokens: u32, completion_tokens: u32) -> Completion {
    Completion {
        content: content.to_string(),
        model: model.to_string(),
        usage: Usage {
            prompt_tokens,
            completion_tokens,
        },
    }
}

fn auth_error() -> ProviderError {
    ProviderError::Auth {
        status: 401,
        message: "No auth credentials found".to_string(),
    }
}

fn test_session(dir: &Path, provider: Arc<ScriptedProvider>) -> Session {
    test_session_with_delay(dir, provider, Duration::ZERO)
}

fn test_session_with_delay(
    dir: &Path,
    provider: Arc<ScriptedProvider>,
    reveal_delay: Duration,
) -> Session {
    Session::new(
        Uuid::new_v4(),
        DocumentStore::new(dir.join("uploads")),
        provider,
        SessionOptions {
            model: MODEL.to_string(),
            sampling: Sampling::default(),
            reveal_delay,
        },
    )
}

// ============================================================================
// Turn lifecycle
// ============================================================================

#[tokio::test]
async fn test_hello_without_documents() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![Ok(completion("Hi there", MODEL, 5, 2))]);
    let session = test_session(temp_dir.path(), provider.clone());

    let turn = session.submit_question("Hello").await.unwrap();

    assert_eq!(turn.question, "Hello");
    assert_eq!(turn.answer, "Hi there");
    assert_eq!(turn.model_id, MODEL);
    assert_eq!(turn.input_tokens, 5);
    assert_eq!(turn.output_tokens, 2);
    assert_eq!(turn.status, TurnStatus::Complete);

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    assert_eq!(messages.len(), 2);
    assert!(messages[0]
        .content
        .starts_with(&format!("{}:\n\n", prompt::CONTEXT_LABEL)));
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "Hello");

    let state = session.snapshot();
    assert_eq!(state.chat_history, vec![turn]);
    assert!(!state.processing);
    assert_eq!(state.phase, TurnPhase::Idle);
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn test_provider_auth_error_keeps_failed_turn() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Ok(completion("First answer", MODEL, 3, 2)),
        Err(auth_error()),
    ]);
    let session = test_session(temp_dir.path(), provider);

    session.submit_question("First").await.unwrap();
    let err = session.submit_question("Second").await.unwrap_err();

    assert!(matches!(err, ChatError::Provider(ProviderError::Auth { .. })));

    let state = session.snapshot();
    assert_eq!(state.chat_history.len(), 2);
    assert_eq!(state.chat_history[0].answer, "First answer");
    assert!(state.chat_history[0].is_complete());

    let failed = &state.chat_history[1];
    assert_eq!(failed.question, "Second");
    assert_eq!(failed.answer, "");
    assert!(failed.is_failed());

    assert!(!state.processing);
    assert_eq!(state.phase, TurnPhase::Error);
    assert_eq!(state.last_error.unwrap().code, "provider_auth");
}

#[tokio::test]
async fn test_new_turn_after_error_is_accepted() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![Err(auth_error()), Ok(completion("Back", MODEL, 1, 1))]);
    let session = test_session(temp_dir.path(), provider.clone());

    assert!(session.submit_question("Try").await.is_err());
    let turn = session.submit_question("Again").await.unwrap();

    assert_eq!(turn.answer, "Back");
    let state = session.snapshot();
    assert_eq!(state.chat_history.len(), 2);
    assert!(state.last_error.is_none());
    assert_eq!(state.phase, TurnPhase::Idle);

    // The failed turn is not replayed as history
    let second_request = &provider.requests()[1];
    assert!(!second_request.messages.iter().any(|m| m.content == "Try"));
}

#[tokio::test]
async fn test_context_includes_every_document() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![]);
    let session = test_session(temp_dir.path(), provider.clone());

    session
        .upload(vec![
            UploadFile::new("a.pdf", test_pdf::build(&["Alpha"])),
            UploadFile::new("b.pdf", test_pdf::build(&["Bravo"])),
        ])
        .await
        .unwrap();

    session.submit_question("Summarise").await.unwrap();

    let context = &provider.requests()[0].messages[0].content;
    assert!(context.contains("[document: a.pdf]"));
    assert!(context.contains("Alpha"));
    assert!(context.contains("[document: b.pdf]"));
    assert!(context.contains("Bravo"));
}

#[tokio::test]
async fn test_prior_turns_are_sent_as_history() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Ok(completion("Paris", MODEL, 1, 1)),
        Ok(completion("About 2 million", MODEL, 1, 1)),
    ]);
    let session = test_session(temp_dir.path(), provider.clone());

    session.submit_question("Capital of France?").await.unwrap();
    session.submit_question("Population?").await.unwrap();

    let messages = &provider.requests()[1].messages;
    let contents: Vec<&str> = messages.iter().skip(1).map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Capital of France?", "Paris", "Population?"]);
}

#[tokio::test]
async fn test_extraction_error_fails_turn_before_request() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![]);
    let session = test_session(temp_dir.path(), provider.clone());

    session
        .upload(vec![UploadFile::new("broken.pdf", b"not a pdf".to_vec())])
        .await
        .unwrap();

    let err = session.submit_question("What does it say?").await.unwrap_err();

    assert!(matches!(err, ChatError::Extraction(_)));
    assert!(provider.requests().is_empty());

    let state = session.snapshot();
    assert_eq!(state.chat_history.len(), 1);
    assert!(state.chat_history[0].is_failed());
    assert!(!state.processing);
    assert_eq!(state.last_error.unwrap().code, "extraction_error");
}

#[tokio::test]
async fn test_empty_question_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let session = test_session(temp_dir.path(), ScriptedProvider::new(vec![]));

    let err = session.submit_question("   ").await.unwrap_err();

    assert!(matches!(err, ChatError::EmptyQuestion));
    assert!(session.snapshot().chat_history.is_empty());
}

#[tokio::test]
async fn test_question_is_trimmed() {
    let temp_dir = tempfile::tempdir().unwrap();
    let session = test_session(temp_dir.path(), ScriptedProvider::new(vec![]));

    let turn = session.submit_question("  Hello \n").await.unwrap();
    assert_eq!(turn.question, "Hello");
}

// ============================================================================
// Single-flight and cancellation
// ============================================================================

#[tokio::test]
async fn test_submit_while_processing_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Gate::default());
    let provider = ScriptedProvider::gated(gate.clone(), vec![Ok(completion("done", MODEL, 1, 1))]);
    let session = Arc::new(test_session(temp_dir.path(), provider.clone()));

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.submit_question("one").await }
    });
    gate.entered.notified().await;

    let state = session.snapshot();
    assert!(state.processing);
    assert_eq!(state.phase, TurnPhase::Requesting);

    assert!(matches!(
        session.submit_question("two").await,
        Err(ChatError::Busy)
    ));
    assert!(matches!(session.clear_chat().await, Err(ChatError::Busy)));
    assert!(matches!(session.clear_documents().await, Err(ChatError::Busy)));
    assert_eq!(session.snapshot().chat_history.len(), 1);

    gate.release.notify_one();
    let turn = first.await.unwrap().unwrap();
    assert_eq!(turn.question, "one");

    let state = session.snapshot();
    assert_eq!(state.chat_history.len(), 1);
    assert!(!state.processing);
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_request_fails_turn() {
    let temp_dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Gate::default());
    let provider = ScriptedProvider::gated(gate.clone(), vec![]);
    let session = Arc::new(test_session(temp_dir.path(), provider));

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.submit_question("slow one").await }
    });
    gate.entered.notified().await;

    assert!(session.cancel_turn().await);
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Cancelled));

    let state = session.snapshot();
    assert!(!state.processing);
    assert_eq!(state.phase, TurnPhase::Error);
    assert_eq!(state.chat_history.len(), 1);
    match &state.chat_history[0].status {
        TurnStatus::Failed { error } => assert_eq!(error.code, "cancelled"),
        other => panic!("expected failed turn, got {:?}", other),
    }

    // Nothing left to cancel
    assert!(!session.cancel_turn().await);
}

#[tokio::test]
async fn test_cancel_during_reveal_commits_full_answer() {
    let temp_dir = tempfile::tempdir().unwrap();
    let answer = "x".repeat(200);
    let provider = ScriptedProvider::new(vec![Ok(completion(&answer, MODEL, 10, 200))]);
    let session = Arc::new(test_session_with_delay(
        temp_dir.path(),
        provider,
        Duration::from_millis(20),
    ));
    let mut rx = session.subscribe();

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.submit_question("long answer please").await }
    });

    rx.wait_for(|s| s.phase == TurnPhase::Streaming && !s.chat_history[0].answer.is_empty())
        .await
        .unwrap();

    let partial = rx.borrow().chat_history[0].answer.clone();
    assert!(answer.starts_with(&partial));
    assert!(partial.len() < answer.len());
    assert_eq!(rx.borrow().chat_history[0].status, TurnStatus::Streaming);

    assert!(session.cancel_turn().await);
    let turn = pending.await.unwrap().unwrap();

    assert_eq!(turn.answer, answer);
    assert_eq!(turn.output_tokens, 200);
    assert!(!session.snapshot().processing);
}

#[tokio::test]
async fn test_cancel_is_not_blocked_by_document_io() {
    let temp_dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Gate::default());
    let provider = ScriptedProvider::gated(gate.clone(), vec![]);
    let session = Arc::new(test_session(temp_dir.path(), provider));

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.submit_question("slow one").await }
    });
    gate.entered.notified().await;

    // Stands in for a long blob write: the store stays locked until the guard drops
    let store_guard = session.store.lock().await;
    let upload = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .upload(vec![UploadFile::new("big.pdf", vec![0u8; 1024])])
                .await
        }
    });

    let cancelled = tokio::time::timeout(Duration::from_secs(1), session.cancel_turn())
        .await
        .expect("cancel_turn waited on document I/O");
    assert!(cancelled);

    let err = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("turn did not finish while the store was busy")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ChatError::Cancelled));
    assert!(!session.snapshot().processing);

    drop(store_guard);
    upload.await.unwrap().unwrap();
    assert_eq!(session.snapshot().documents, vec!["big.pdf"]);
}

#[tokio::test]
async fn test_reveal_continues_while_store_is_busy() {
    let temp_dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Gate::default());
    let provider = ScriptedProvider::gated(gate.clone(), vec![Ok(completion("abc", MODEL, 1, 3))]);
    let session = Arc::new(test_session_with_delay(
        temp_dir.path(),
        provider,
        Duration::from_millis(1),
    ));

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.submit_question("q").await }
    });
    gate.entered.notified().await;

    let _store_guard = session.store.lock().await;
    gate.release.notify_one();

    let turn = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("reveal stalled on the document store")
        .unwrap()
        .unwrap();
    assert_eq!(turn.answer, "abc");
}

#[tokio::test]
async fn test_cancel_while_waiting_for_upload() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![]);
    let session = Arc::new(test_session(temp_dir.path(), provider.clone()));
    let mut rx = session.subscribe();

    let store_guard = session.store.lock().await;
    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.submit_question("q").await }
    });

    rx.wait_for(|s| s.phase == TurnPhase::Ingesting).await.unwrap();
    assert!(session.cancel_turn().await);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Cancelled));
    assert!(provider.requests().is_empty());
    drop(store_guard);
}

// ============================================================================
// Other events
// ============================================================================

#[tokio::test]
async fn test_clear_chat_is_idempotent() {
    let temp_dir = tempfile::tempdir().unwrap();
    let session = test_session(temp_dir.path(), ScriptedProvider::new(vec![]));

    session.submit_question("Hello").await.unwrap();
    session.clear_chat().await.unwrap();
    let after_first = session.snapshot();

    session.clear_chat().await.unwrap();
    let after_second = session.snapshot();

    assert!(after_first.chat_history.is_empty());
    assert_eq!(after_first, after_second);
    assert_eq!(after_second.phase, TurnPhase::Idle);
}

#[tokio::test]
async fn test_select_model_applies_to_next_turn() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![]);
    let session = test_session(temp_dir.path(), provider.clone());

    session.select_model("openai/gpt-3.5-turbo").await.unwrap();
    assert_eq!(session.snapshot().selected_model, "openai/gpt-3.5-turbo");

    let turn = session.submit_question("Hi").await.unwrap();
    assert_eq!(provider.requests()[0].model, "openai/gpt-3.5-turbo");
    assert_eq!(turn.model_id, "openai/gpt-3.5-turbo");

    assert!(matches!(
        session.select_model("  ").await,
        Err(ChatError::InvalidModel(_))
    ));
}

#[tokio::test]
async fn test_staged_upload_can_be_cancelled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let session = test_session(temp_dir.path(), ScriptedProvider::new(vec![]));

    session
        .stage_files(vec![UploadFile::new("a.pdf", b"a".to_vec())])
        .await;
    assert_eq!(session.snapshot().staged, vec!["a.pdf"]);

    session.cancel_upload().await;
    let state = session.snapshot();
    assert!(state.staged.is_empty());
    assert!(state.documents.is_empty());

    session
        .stage_files(vec![
            UploadFile::new("b.pdf", b"b".to_vec()),
            UploadFile::new("c.pdf", b"c".to_vec()),
        ])
        .await;
    let ids = session.upload_staged().await.unwrap();

    assert_eq!(ids.len(), 2);
    let state = session.snapshot();
    assert!(state.staged.is_empty());
    assert_eq!(state.documents, vec!["b.pdf", "c.pdf"]);
}

#[tokio::test]
async fn test_upload_and_clear_documents_update_snapshot() {
    let temp_dir = tempfile::tempdir().unwrap();
    let session = test_session(temp_dir.path(), ScriptedProvider::new(vec![]));

    session
        .upload(vec![UploadFile::new("a.pdf", b"a".to_vec())])
        .await
        .unwrap();
    assert_eq!(session.snapshot().documents, vec!["a.pdf"]);

    session.clear_documents().await.unwrap();
    assert!(session.snapshot().documents.is_empty());

    let err = session
        .upload(vec![UploadFile::new("", b"x".to_vec())])
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Storage(_)));
    assert_eq!(session.snapshot().last_error.unwrap().code, "storage_error");
}

#[tokio::test]
async fn test_ask_template() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![]);
    let session = test_session(temp_dir.path(), provider.clone());

    let turn = session.ask_template("jobs").await.unwrap();
    assert_eq!(turn.question, templates::get_template("jobs").unwrap().prompt);

    assert!(matches!(
        session.ask_template("weather").await,
        Err(ChatError::UnknownTemplate(_))
    ));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_handle_json_events() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![Ok(completion("Hi there", MODEL, 5, 2))]);
    let session = test_session(temp_dir.path(), provider);

    let events = [
        r#"{"type":"upload","files":[{"filename":"notes.pdf","data":[37,80,68,70]}]}"#,
        r#"{"type":"select_model","id":"deepseek/deepseek-r1-0528:free"}"#,
        r#"{"type":"clear_documents"}"#,
        r#"{"type":"submit_question","text":"Hello"}"#,
    ];
    for raw in events {
        let event: SessionEvent = serde_json::from_str(raw).unwrap();
        session.handle(event).await.unwrap();
    }

    let state = session.snapshot();
    assert!(state.documents.is_empty());
    assert_eq!(state.selected_model, "deepseek/deepseek-r1-0528:free");
    assert_eq!(state.chat_history[0].answer, "Hi there");
}

#[tokio::test]
async fn test_close_removes_uploads() {
    let temp_dir = tempfile::tempdir().unwrap();
    let session = test_session(temp_dir.path(), ScriptedProvider::new(vec![]));

    session
        .upload(vec![UploadFile::new("a.pdf", b"a".to_vec())])
        .await
        .unwrap();
    assert!(temp_dir.path().join("uploads").exists());

    session.close().await.unwrap();

    assert!(!temp_dir.path().join("uploads").exists());
    assert!(session.snapshot().documents.is_empty());
}

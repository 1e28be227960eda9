use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorInfo;

/// Where a turn is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnStatus {
    /// Submitted; documents are being read or the provider is being called
    Pending,
    /// The complete answer is being revealed
    Streaming,
    Complete,
    Failed { error: ErrorInfo },
}

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    /// Revealed part of the answer; the full answer once complete
    pub answer: String,
    pub model_id: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub status: TurnStatus,
    pub asked_at: String,
}

impl ChatTurn {
    pub fn new(question: String, model_id: String) -> Self {
        Self {
            question,
            answer: String::new(),
            model_id,
            input_tokens: 0,
            output_tokens: 0,
            status: TurnStatus::Pending,
            asked_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == TurnStatus::Complete
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TurnStatus::Failed { .. })
    }

    /// Complete and failed turns never change again
    pub fn is_final(&self) -> bool {
        self.is_complete() || self.is_failed()
    }
}

/// Controller phase, mirrored in snapshots for the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    Ingesting,
    Requesting,
    Streaming,
    /// The last turn failed; accepts the same events as Idle
    Error,
}

/// Everything a renderer needs to draw one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub chat_history: Vec<ChatTurn>,
    /// True iff the last turn is still in flight
    pub processing: bool,
    pub selected_model: String,
    pub phase: TurnPhase,
    /// Stored document filenames, upload order
    pub documents: Vec<String>,
    /// Files selected for upload but not yet stored
    pub staged: Vec<String>,
    pub last_error: Option<ErrorInfo>,
}

impl SessionState {
    pub fn new(session_id: Uuid, selected_model: String) -> Self {
        Self {
            session_id,
            chat_history: Vec::new(),
            processing: false,
            selected_model,
            phase: TurnPhase::Idle,
            documents: Vec::new(),
            staged: Vec::new(),
            last_error: None,
        }
    }

    pub fn last_turn(&self) -> Option<&ChatTurn> {
        self.chat_history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_lifecycle_flags() {
        let mut turn = ChatTurn::new("Hello".to_string(), "m".to_string());
        assert!(!turn.is_final());

        turn.status = TurnStatus::Streaming;
        assert!(!turn.is_final());

        turn.status = TurnStatus::Failed {
            error: ErrorInfo {
                code: "cancelled".to_string(),
                message: "Turn was cancelled".to_string(),
            },
        };
        assert!(turn.is_failed());
        assert!(turn.is_final());
    }

    #[test]
    fn test_last_turn_is_newest() {
        let mut state = SessionState::new(Uuid::new_v4(), "m".to_string());
        assert!(state.last_turn().is_none());

        state
            .chat_history
            .push(ChatTurn::new("first".to_string(), "m".to_string()));
        state
            .chat_history
            .push(ChatTurn::new("second".to_string(), "m".to_string()));
        assert_eq!(state.last_turn().unwrap().question, "second");
    }

    #[test]
    fn test_snapshot_serializes_for_renderer() {
        let state = SessionState::new(Uuid::nil(), "m".to_string());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["processing"], false);
        assert_eq!(json["session_id"], "00000000-0000-0000-0000-000000000000");
    }
}
